//! Shared runtime state for evalctl-gateway, mirroring the grounding
//! daemon's `Arc`-wrapped `AppState` pattern but closing over the four
//! narrow service interfaces instead of an in-process broker connection.

use std::sync::Arc;
use std::time::Duration;

use evalctl_bus::Bus;
use evalctl_index::Index;
use evalctl_queue::Queue;
use evalctl_store::Store;

/// Deadline the Gateway waits for a proxied Runner call before surfacing
/// `RunnerUnavailable` to the client (spec §4.1: `logs` bounded deadline).
pub const RUNNER_CALL_DEADLINE: Duration = Duration::from_secs(2);

pub struct AppState {
    pub queue: Arc<dyn Queue>,
    pub store: Arc<dyn Store>,
    pub index: Arc<dyn Index>,
    pub bus: Arc<dyn Bus>,
    pub http: reqwest::Client,
    pub max_source_bytes: u64,
    pub max_request_bytes: u64,
    pub min_timeout_s: u32,
    pub max_timeout_s: u32,
    pub default_output_bytes: u64,
    pub queue_high_watermark: u64,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn Queue>,
        store: Arc<dyn Store>,
        index: Arc<dyn Index>,
        bus: Arc<dyn Bus>,
        max_source_bytes: u64,
        max_request_bytes: u64,
        min_timeout_s: u32,
        max_timeout_s: u32,
        default_output_bytes: u64,
        queue_high_watermark: u64,
    ) -> Self {
        AppState {
            queue,
            store,
            index,
            bus,
            http: reqwest::Client::new(),
            max_source_bytes,
            max_request_bytes,
            min_timeout_s,
            max_timeout_s,
            default_output_bytes,
            queue_high_watermark,
        }
    }
}
