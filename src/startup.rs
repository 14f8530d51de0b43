use actix_web::{web, App, HttpServer};
use actix_files as fs;
use sqlx::PgPool;
use std::net::TcpListener;
use actix_web::dev::Server;

use crate::configuration::{ApplicationSettings, JwtSettings};
use crate::email_client::EmailClient;
use crate::middleware::{JwtMiddleware, RequestLogger};
use crate::routes::{
    create_center, forgot_password, get_center, get_current_user, get_states, health_check,
    issue_invitation, list_centers, login, lookup_invitation, register, reset_password,
    update_center,
};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
    app_config: ApplicationSettings,
    email_client: EmailClient,
) -> Result<Server, std::io::Error> {
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());
    let app_config_data = web::Data::new(app_config);
    let email_client_data = web::Data::new(email_client);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)

            // Shared state
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())
            .app_data(app_config_data.clone())
            .app_data(email_client_data.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/forgot-password", web::post().to(forgot_password))
            .route("/auth/reset-password", web::post().to(reset_password))
            // The sign-up page resolves invitations before any session exists
            .route("/invitations/lookup", web::get().to(lookup_invitation))

            // Protected routes (require a valid session token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/invitations", web::post().to(issue_invitation))
                    .route("/centers", web::get().to(list_centers))
                    .route("/centers", web::post().to(create_center))
                    .route("/centers/{id}", web::get().to(get_center))
                    .route("/centers/{id}", web::put().to(update_center))
                    .route("/states", web::get().to(get_states)),
            )

            // Static file serving (must be last to not override API routes)
            .service(fs::Files::new("/", "./public").index_file("index.html"))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
