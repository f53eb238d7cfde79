// ============================
// crates/backend-bin/src/main.rs
// ============================
use anyhow::Result;
use rendezvous_backend_lib::{config::Settings, storage::MemoryStorage, ws_router, AppState};
use rendezvous_directions::{DirectionsProvider, HttpDirections, NullDirections};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let directions: Arc<dyn DirectionsProvider> = if settings.directions.api_key.is_empty() {
        warn!("no directions API key configured; ETAs will be unknown");
        Arc::new(NullDirections)
    } else {
        Arc::new(HttpDirections::new(
            &settings.directions.base_url,
            &settings.directions.api_key,
            Duration::from_secs(settings.directions.timeout_secs),
        )?)
    };

    let storage = MemoryStorage::new();
    let bind_addr = settings.bind_addr;
    let state = Arc::new(AppState::new(storage, directions, settings));
    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
