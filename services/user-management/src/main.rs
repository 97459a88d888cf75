use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorlink_database::{create_pool, run_migrations};
use tutorlink_user_management::{build_app, config::AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorlink_user_management=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    let db_pool = create_pool(&config.database).await?;
    run_migrations(&db_pool).await?;

    let bind_address = config.server.bind_address();
    let app = build_app(AppState::new(db_pool, config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("User Management Service listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
