use std::net::TcpListener;
use dialisis_admin::configuration::get_configuration;
use dialisis_admin::email_client::{EmailClient, Sender};
use dialisis_admin::startup::run;
use dialisis_admin::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error"
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error"
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let sender = Sender::parse(configuration.email.sender.clone()).map_err(|e| {
        tracing::error!("Invalid sender address in configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let email_client = EmailClient::new(
        configuration.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    );

    let address = format!("127.0.0.1:{}", configuration.application.port);
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(
        listener,
        pool,
        configuration.jwt.clone(),
        configuration.application.clone(),
        email_client,
    )?;
    tracing::info!("Server started successfully");

    let _ = server.await;

    Ok(())
}
