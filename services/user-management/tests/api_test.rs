use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use tutorlink_common::{DatabaseConfig, JwtConfig, ServerConfig};
use tutorlink_database::MigrationRunner;
use tutorlink_user_management::{build_app, config::AppConfig, AppState};

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            username: "tutorlink_user".to_string(),
            password: "tutorlink_password".to_string(),
            database: "tutorlink_test".to_string(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "user-api-secret".to_string(),
            expiration_hours: 1,
            issuer: "tutorlink".to_string(),
        },
    }
}

// Lazily connected: these requests must be answered before any query runs.
fn create_test_server() -> TestServer {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.connection_string())
        .expect("lazy pool");
    TestServer::new(build_app(AppState::new(pool, config))).expect("test server")
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let server = create_test_server();

    let response = server.get("/auth/me").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .get("/auth/me")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer not.a.token"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_registration_is_rejected_before_storage() {
    let server = create_test_server();

    let response = server
        .post("/auth/register")
        .json(&json!({
            "username": "ab",
            "email": "not-an-email",
            "password": "short",
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_admin_self_registration_is_refused() {
    let server = create_test_server();

    let response = server
        .post("/auth/register")
        .json(&json!({
            "username": "sneaky",
            "email": "sneaky@example.com",
            "password": "clases2024",
            "role": "admin",
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_course_creation_promotes_student() {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("Skipping database test - DATABASE_URL not set");
            return;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    let runner = MigrationRunner::new(pool.clone());
    runner.run_all_migrations().await.expect("Failed to run migrations");
    runner.seed_initial_data().await.expect("Failed to seed");

    let server = TestServer::new(build_app(AppState::new(pool.clone(), test_config())))
        .expect("test server");

    let suffix = Uuid::new_v4().simple().to_string();
    let email = format!("student_{}@example.com", suffix);
    let registered = server
        .post("/auth/register")
        .json(&json!({
            "username": format!("student_{}", &suffix[..12]),
            "email": email,
            "password": "clases2024",
        }))
        .await;
    assert_eq!(registered.status_code(), StatusCode::CREATED);

    let login = server
        .post("/auth/login")
        .json(&json!({ "email": email, "password": "clases2024" }))
        .await;
    assert_eq!(login.status_code(), StatusCode::OK);
    let body: Value = login.json();
    assert_eq!(body["data"]["user"]["role"], "student");
    let token = body["data"]["token"].as_str().unwrap().to_string();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token)).unwrap();

    let wrong_password = server
        .post("/auth/login")
        .json(&json!({ "email": email, "password": "clases2025" }))
        .await;
    assert_eq!(wrong_password.status_code(), StatusCode::UNAUTHORIZED);

    let categories: Value = server
        .get("/categories?q=math")
        .add_header(AUTHORIZATION, bearer.clone())
        .await
        .json();
    let category_id = categories["data"]["items"][0]["category_id"]
        .as_str()
        .unwrap()
        .to_string();

    let forbidden = server
        .post("/categories")
        .add_header(AUTHORIZATION, bearer.clone())
        .json(&json!({ "name": "Chess" }))
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

    let course = server
        .post("/courses")
        .add_header(AUTHORIZATION, bearer.clone())
        .json(&json!({
            "category": category_id,
            "name": "Algebra basics",
            "modality": "virtual",
            "price": 15,
        }))
        .await;
    assert_eq!(course.status_code(), StatusCode::CREATED);

    // Same token, but the stored role has moved on.
    let me: Value = server
        .get("/auth/me")
        .add_header(AUTHORIZATION, bearer)
        .await
        .json();
    assert_eq!(me["data"]["role"], "tutor");
}
