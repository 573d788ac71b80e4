mod exec;
mod routes;
mod slot;
mod state;

use std::sync::Arc;

use evalctl_bus::connect as connect_bus;
use evalctl_config::Config;
use evalctl_sandbox::{ProcessSandbox, Sandbox};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use state::AppState;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn slot_count_from_env() -> usize {
    std::env::var("RUNNER_SLOTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4)
}

fn runner_id_from_env() -> String {
    std::env::var("RUNNER_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cfg = Config::from_env()?;
    let bus = Arc::from(connect_bus(&cfg.bus_url).await?);
    let sandbox: Arc<dyn Sandbox> = Arc::new(ProcessSandbox::new());

    let state = Arc::new(AppState::new(
        runner_id_from_env(),
        sandbox,
        bus,
        cfg.runner_heartbeat(),
        slot_count_from_env(),
    ));

    let app = routes::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "runner listening");
    axum::serve(listener, app).await?;
    Ok(())
}
