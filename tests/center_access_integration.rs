use std::net::TcpListener;
use dialisis_admin::auth::hash_password;
use dialisis_admin::configuration::{get_configuration, DatabaseSettings};
use dialisis_admin::email_client::{EmailClient, Sender};
use dialisis_admin::startup::run;
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let sender = Sender::parse(configuration.email.sender.clone())
        .expect("Invalid sender address in configuration");
    let email_client = EmailClient::new(
        configuration.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    );

    let server = run(
        listener,
        connection_pool.clone(),
        configuration.jwt.clone(),
        configuration.application.clone(),
        email_client,
    )
    .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn create_user(pool: &PgPool, email: &str, password: &str, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    let password_hash = hash_password(password).expect("Failed to hash password");
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, now(), now())
        "#,
    )
    .bind(id)
    .bind(email)
    .bind("Test User")
    .bind(password_hash)
    .bind(role)
    .execute(pool)
    .await
    .expect("Failed to insert user");
    id
}

async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let response: Value = reqwest::Client::new()
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": email, "password": password}))
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse login response");

    response["access_token"]
        .as_str()
        .expect("login response carries an access token")
        .to_string()
}

async fn seed_center(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO dialysis_centers (id, name, featured, created_at, updated_at)
        VALUES ($1, $2, FALSE, now(), now())
        "#,
    )
    .bind(id)
    .bind(name)
    .execute(pool)
    .await
    .expect("Failed to insert center");
    id
}

async fn grant_access(pool: &PgPool, user_id: Uuid, center_id: Uuid) {
    sqlx::query(
        "INSERT INTO center_access (user_id, center_id, granted_at) VALUES ($1, $2, now())",
    )
    .bind(user_id)
    .bind(center_id)
    .execute(pool)
    .await
    .expect("Failed to insert grant");
}

#[tokio::test]
async fn superadmin_lists_every_center() {
    let app = spawn_app().await;
    seed_center(&app.db_pool, "Alpha Center").await;
    seed_center(&app.db_pool, "Beta Center").await;
    create_user(&app.db_pool, "admin@example.com", "admin-password-1", "superadmin").await;
    let token = login(&app, "admin@example.com", "admin-password-1").await;

    let centers: Value = reqwest::Client::new()
        .get(&format!("{}/api/centers", &app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse centers");

    let centers = centers.as_array().unwrap();
    assert_eq!(centers.len(), 2);
    assert_eq!(centers[0]["name"], "Alpha Center");
    assert_eq!(centers[1]["name"], "Beta Center");
}

#[tokio::test]
async fn pic_lists_only_granted_centers() {
    let app = spawn_app().await;
    let granted = seed_center(&app.db_pool, "Alpha Center").await;
    seed_center(&app.db_pool, "Beta Center").await;

    let pic = create_user(&app.db_pool, "pic@example.com", "pic-password-1", "pic").await;
    grant_access(&app.db_pool, pic, granted).await;
    let token = login(&app, "pic@example.com", "pic-password-1").await;

    let centers: Value = reqwest::Client::new()
        .get(&format!("{}/api/centers", &app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse centers");

    let centers = centers.as_array().unwrap();
    assert_eq!(centers.len(), 1);
    assert_eq!(centers[0]["id"], granted.to_string());
}

#[tokio::test]
async fn pic_cannot_view_an_ungranted_center() {
    let app = spawn_app().await;
    let center = seed_center(&app.db_pool, "Alpha Center").await;
    create_user(&app.db_pool, "pic@example.com", "pic-password-1", "pic").await;
    let token = login(&app, "pic@example.com", "pic-password-1").await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/centers/{}", &app.address, center))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn missing_center_returns_404() {
    let app = spawn_app().await;
    create_user(&app.db_pool, "admin@example.com", "admin-password-1", "superadmin").await;
    let token = login(&app, "admin@example.com", "admin-password-1").await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/centers/{}", &app.address, Uuid::new_v4()))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn pic_update_cannot_change_featured_flag() {
    let app = spawn_app().await;
    let center = seed_center(&app.db_pool, "Alpha Center").await;
    let pic = create_user(&app.db_pool, "pic@example.com", "pic-password-1", "pic").await;
    grant_access(&app.db_pool, pic, center).await;
    let token = login(&app, "pic@example.com", "pic-password-1").await;

    let response = reqwest::Client::new()
        .put(&format!("{}/api/centers/{}", &app.address, center))
        .bearer_auth(&token)
        .json(&json!({"tel": "03-1234-5678", "featured": true}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let row = sqlx::query("SELECT tel, featured FROM dialysis_centers WHERE id = $1")
        .bind(center)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch center");

    // The ordinary field was updated; the featured flag was stripped
    assert_eq!(row.get::<Option<String>, _>("tel").as_deref(), Some("03-1234-5678"));
    assert!(!row.get::<bool, _>("featured"));
}

#[tokio::test]
async fn superadmin_update_can_change_featured_flag() {
    let app = spawn_app().await;
    let center = seed_center(&app.db_pool, "Alpha Center").await;
    create_user(&app.db_pool, "admin@example.com", "admin-password-1", "superadmin").await;
    let token = login(&app, "admin@example.com", "admin-password-1").await;

    let response = reqwest::Client::new()
        .put(&format!("{}/api/centers/{}", &app.address, center))
        .bearer_auth(&token)
        .json(&json!({"featured": true}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let row = sqlx::query("SELECT featured FROM dialysis_centers WHERE id = $1")
        .bind(center)
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch center");
    assert!(row.get::<bool, _>("featured"));
}

#[tokio::test]
async fn create_center_requires_superadmin() {
    let app = spawn_app().await;
    create_user(&app.db_pool, "pic@example.com", "pic-password-1", "pic").await;
    let token = login(&app, "pic@example.com", "pic-password-1").await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/centers", &app.address))
        .bearer_auth(&token)
        .json(&json!({"name": "New Center"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(403, response.status().as_u16());
}

#[tokio::test]
async fn superadmin_creates_a_center() {
    let app = spawn_app().await;
    create_user(&app.db_pool, "admin@example.com", "admin-password-1", "superadmin").await;
    let token = login(&app, "admin@example.com", "admin-password-1").await;

    let response = reqwest::Client::new()
        .post(&format!("{}/api/centers", &app.address))
        .bearer_auth(&token)
        .json(&json!({"name": "New Center", "town": "Petaling Jaya"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(201, response.status().as_u16());

    let row = sqlx::query("SELECT name, town FROM dialysis_centers")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to fetch center");
    assert_eq!(row.get::<String, _>("name"), "New Center");
    assert_eq!(row.get::<Option<String>, _>("town").as_deref(), Some("Petaling Jaya"));
}
