use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::connect as connect_bus;
use evalctl_config::Config;
use evalctl_dispatcher::dispatch::dispatch_one;
use evalctl_dispatcher::liveness::{self, RunnerPools};
use evalctl_queue::connect as connect_queue;
use evalctl_store::connect as connect_store;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const CLAIM_BATCH: u32 = 4;
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(500);

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
    let queue = Arc::from(connect_queue(&cfg.queue_url).await?);
    let store = Arc::from(connect_store(&cfg.store_url).await?);
    let http = reqwest::Client::new();

    let pools = Arc::new(RunnerPools::new(
        cfg.runner_pools.clone(),
        cfg.runner_liveness(),
    ));
    liveness::spawn_liveness_poller(pools.clone(), http.clone(), cfg.runner_heartbeat());

    let dispatcher_id = format!("dispatcher-{}", uuid::Uuid::new_v4());
    tracing::info!(id = %dispatcher_id, classes = ?pools.classes(), "dispatcher starting");

    let mut set = JoinSet::new();
    let mut ticker = tokio::time::interval(CLAIM_POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for class in pools.classes() {
                    let items = match queue.claim(&class, CLAIM_BATCH, &dispatcher_id).await {
                        Ok(items) => items,
                        Err(e) => {
                            tracing::warn!(class = %class, error = %e, "claim failed");
                            continue;
                        }
                    };
                    for item in items {
                        let http = http.clone();
                        let store = store.clone();
                        let queue = queue.clone();
                        let bus = bus.clone();
                        let pools = pools.clone();
                        let retry_max = cfg.retry_max;
                        let retry_base_s = cfg.retry_base_s;
                        let dispatch_deadline = cfg.dispatch_deadline();
                        set.spawn(async move {
                            dispatch_one(
                                &http,
                                &store,
                                &queue,
                                &bus,
                                &pools,
                                retry_max,
                                retry_base_s,
                                dispatch_deadline,
                                item,
                            )
                            .await
                        });
                    }
                }
            }
            Some(res) = set.join_next(), if !set.is_empty() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "dispatch task panicked");
                }
            }
        }
    }
}
