use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The Routing Index's record of which Runner currently owns an
/// evaluation's slot, written by the Dispatcher at claim time and refreshed
/// by the Runner's heartbeat. Stored with a TTL; its expiry (not an
/// explicit delete) is what lets the Reactor's reconciler detect a Runner
/// that vanished without publishing a terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingIndexEntry {
    pub eval_id: Uuid,
    pub runner_url: String,
    pub slot: u32,
    pub last_heartbeat: DateTime<Utc>,
}
