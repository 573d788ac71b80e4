//! evalctl-gateway entry point. Thin by design: wires the four narrow
//! service interfaces from `Config`, builds the router, attaches
//! middleware, and serves. All handlers live in `routes.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use evalctl_bus::connect as connect_bus;
use evalctl_config::Config;
use evalctl_gateway::{routes, state::AppState};
use evalctl_index::connect as connect_index;
use evalctl_queue::connect as connect_queue;
use evalctl_store::connect as connect_store;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cfg = Config::from_env()?;
    let queue = Arc::from(connect_queue(&cfg.queue_url).await?);
    let store = Arc::from(connect_store(&cfg.store_url).await?);
    let index = Arc::from(connect_index(&cfg.index_url).await?);
    let bus = Arc::from(connect_bus(&cfg.bus_url).await?);

    let state = Arc::new(AppState::new(
        queue,
        store,
        index,
        bus,
        cfg.max_source_bytes,
        cfg.max_request_bytes,
        cfg.min_timeout_s,
        cfg.max_timeout_s,
        cfg.output_inline_max_bytes,
        cfg.queue_high_watermark,
    ));

    let max_request_bytes = cfg.max_request_bytes as usize;
    let app = routes::build_router(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .context("BIND_ADDR must be a valid socket address")?;
    info!(%addr, "evalctl-gateway listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("gateway server crashed")?;

    Ok(())
}
