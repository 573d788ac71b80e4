//! Resource-class pool membership is static, read once from `RUNNER_POOLS`
//! at startup; which members are currently reachable is the only thing
//! that changes, tracked here from a background `/health` poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub struct RunnerPools {
    pools: HashMap<String, Vec<String>>,
    last_seen: RwLock<HashMap<String, Instant>>,
    cursors: HashMap<String, AtomicUsize>,
    liveness_window: Duration,
}

impl RunnerPools {
    pub fn new(pools: HashMap<String, Vec<String>>, liveness_window: Duration) -> Self {
        let cursors = pools
            .keys()
            .map(|class| (class.clone(), AtomicUsize::new(0)))
            .collect();
        RunnerPools {
            pools,
            last_seen: RwLock::new(HashMap::new()),
            cursors,
            liveness_window,
        }
    }

    pub fn classes(&self) -> Vec<String> {
        self.pools.keys().cloned().collect()
    }

    pub fn all_urls(&self) -> Vec<String> {
        self.pools.values().flatten().cloned().collect()
    }

    pub fn mark_seen(&self, url: &str) {
        self.last_seen
            .write()
            .expect("liveness map poisoned")
            .insert(url.to_string(), Instant::now());
    }

    fn is_live(&self, url: &str) -> bool {
        self.last_seen
            .read()
            .expect("liveness map poisoned")
            .get(url)
            .map(|seen| seen.elapsed() < self.liveness_window)
            .unwrap_or(false)
    }

    /// Live Runner URLs for `class`, rotated by a per-class cursor so
    /// consecutive calls spread load round-robin instead of always
    /// preferring the first pool entry.
    pub fn live_runners_round_robin(&self, class: &str) -> Vec<String> {
        let Some(urls) = self.pools.get(class) else {
            return Vec::new();
        };
        if urls.is_empty() {
            return Vec::new();
        }
        let cursor = self
            .cursors
            .get(class)
            .map(|c| c.fetch_add(1, Ordering::Relaxed))
            .unwrap_or(0);
        let start = cursor % urls.len();
        let mut rotated: Vec<String> = urls[start..]
            .iter()
            .chain(urls[..start].iter())
            .cloned()
            .collect();
        rotated.retain(|url| self.is_live(url));
        rotated
    }
}

/// Polls every configured Runner's `/health` endpoint on `interval`,
/// marking it live on any 2xx response. A Runner that never answers
/// simply ages out of `live_runners_round_robin` once its last-seen
/// timestamp falls outside the liveness window — no explicit eviction
/// needed.
pub fn spawn_liveness_poller(
    pools: std::sync::Arc<RunnerPools>,
    http: reqwest::Client,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for url in pools.all_urls() {
                let http = http.clone();
                let pools = pools.clone();
                tokio::spawn(async move {
                    let probe = http
                        .get(format!("{url}/health"))
                        .timeout(Duration::from_secs(2))
                        .send()
                        .await;
                    if matches!(probe, Ok(resp) if resp.status().is_success()) {
                        pools.mark_seen(&url);
                    }
                });
            }
        }
    });
}
