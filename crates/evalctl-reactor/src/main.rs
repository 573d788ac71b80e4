//! evalctl-reactor entry point: subscribes to every topic in the dispatch
//! table, one task per topic, and runs the stuck-evaluation reconciler on
//! its own tick. No HTTP surface of its own — everything it does is driven
//! off the Bus and the periodic sweep.

use std::path::Path;
use std::sync::Arc;

use evalctl_bus::connect as connect_bus;
use evalctl_config::Config;
use evalctl_index::connect as connect_index;
use evalctl_reactor::audit::AuditWriter;
use evalctl_reactor::handlers::{build_dispatch_table, ReactorCtx};
use evalctl_reactor::reconcile::reconcile_once;
use evalctl_store::connect as connect_store;
use futures_util::StreamExt;
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
    let bus = Arc::from(connect_bus(&cfg.bus_url).await?);
    let store = Arc::from(connect_store(&cfg.store_url).await?);
    let index = Arc::from(connect_index(&cfg.index_url).await?);

    let audit_path = Path::new(&cfg.audit_log_dir).join("reactor.jsonl");
    let audit = AuditWriter::new(&audit_path)?;

    let ctx = Arc::new(ReactorCtx::new(
        Arc::clone(&store),
        Arc::clone(&index),
        Arc::clone(&bus),
        audit,
        cfg.output_inline_max_bytes,
        cfg.audit_log_dir.clone(),
        cfg.index_grace(),
    ));

    let table = Arc::new(build_dispatch_table());
    let topics: Vec<_> = table.keys().copied().collect();
    tracing::info!(topics = ?topics, "reactor subscribing");

    for topic in topics {
        let table = Arc::clone(&table);
        let ctx = Arc::clone(&ctx);
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            let mut stream = match bus.subscribe(topic).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "failed to subscribe to topic");
                    return;
                }
            };
            while let Some(envelope) = stream.next().await {
                let handler = table.get(&topic).expect("every subscribed topic is registered");
                handler(Arc::clone(&ctx), envelope).await;
            }
        });
    }

    let reconcile_store = Arc::clone(&store);
    let reconcile_index = Arc::clone(&index);
    let sweep_interval = cfg.reconcile_sweep();
    let reconcile_grace = cfg.runner_liveness();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = reconcile_once(&reconcile_store, &reconcile_index, reconcile_grace).await {
                tracing::warn!(error = %e, "reconcile sweep failed");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("reactor shutting down");
    Ok(())
}
