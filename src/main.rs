use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voicecart::api::{create_api_router, AppState};
use voicecart::config::AppConfig;
use voicecart::core::gateway::SimulatedGateway;
use voicecart::database;
use voicecart::entities::{primary_setup, setup_schema};
use voicecart::errors::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voicecart=debug,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let db = database::connect(&config.database_url).await?;
    setup_schema(&db).await?;
    if config.seed_demo_data {
        primary_setup(&db).await?;
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    let app = create_api_router(AppState {
        db: Arc::new(db),
        gateway: Arc::new(SimulatedGateway),
        config: Arc::new(config),
    });

    axum::serve(listener, app).await?;
    Ok(())
}
