use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorlink_database::{create_pool, run_migrations};
use tutorlink_tutoring::{build_app, config::AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorlink_tutoring=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    let db_pool = create_pool(&config.database).await?;
    run_migrations(&db_pool).await?;

    let bind_address = config.server.bind_address();
    if config.booking.enforce_availability {
        tracing::info!("Booking acceptance checks tutor availability");
    }

    let app = build_app(AppState::new(db_pool, config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Tutoring Service listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
