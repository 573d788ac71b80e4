use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bus topics. Kept as an explicit enum, not a free-form string, so every
/// publisher/subscriber pair is checked by the compiler rather than by a
/// string match scattered across services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    EvalQueued,
    EvalDispatched,
    EvalStarted,
    EvalHeartbeat,
    EvalCompleted,
    EvalFailed,
    EvalCancelled,
    StoreCreated,
    StoreUpdated,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::EvalQueued => "eval.queued",
            Topic::EvalDispatched => "eval.dispatched",
            Topic::EvalStarted => "eval.started",
            Topic::EvalHeartbeat => "eval.heartbeat",
            Topic::EvalCompleted => "eval.completed",
            Topic::EvalFailed => "eval.failed",
            Topic::EvalCancelled => "eval.cancelled",
            Topic::StoreCreated => "store.created",
            Topic::StoreUpdated => "store.updated",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic envelope every event carries across the Bus, independent of its
/// payload type. `correlation_id` is the evaluation id for all `eval.*`
/// topics; `causation_id` points at the event that caused this one so a
/// full lifecycle can be reconstructed from the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub eval_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub topic: Topic,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(eval_id: Uuid, topic: Topic, causation_id: Option<Uuid>, payload: T) -> Self {
        EventEnvelope {
            event_id: Uuid::new_v4(),
            eval_id,
            ts_utc: Utc::now(),
            correlation_id: eval_id,
            causation_id,
            topic,
            payload,
        }
    }
}
