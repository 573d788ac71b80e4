use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::Status;

/// Which Runner pool an evaluation should be dispatched to. Most workloads
/// use `default`; heavier interpreters/runtimes can be routed to a
/// dedicated pool by name (see `RUNNER_POOLS` in `evalctl-config`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClass(pub String);

impl Default for ResourceClass {
    fn default() -> Self {
        ResourceClass("default".to_string())
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied request to submit a new evaluation, before an `id` and
/// `created_at` have been assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub language_tag: String,
    pub source_text: String,
    pub timeout_s: u32,
    pub max_output_bytes: u64,
    #[serde(default)]
    pub resource_class: Option<String>,
}

/// The durable record of one code evaluation, as held by the Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub language_tag: String,
    pub source_text: String,
    pub timeout_s: u32,
    pub max_output_bytes: u64,
    pub resource_class: ResourceClass,
    pub status: Status,
    pub exit_code: Option<i32>,
    pub error_reason: Option<String>,
    pub output_preview: Option<String>,
    pub output_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    pub fn new(id: Uuid, req: NewEvaluation, created_at: DateTime<Utc>) -> Self {
        Evaluation {
            id,
            language_tag: req.language_tag,
            source_text: req.source_text,
            timeout_s: req.timeout_s,
            max_output_bytes: req.max_output_bytes,
            resource_class: req
                .resource_class
                .map(ResourceClass)
                .unwrap_or_default(),
            status: Status::Queued,
            exit_code: None,
            error_reason: None,
            output_preview: None,
            output_ref: None,
            created_at,
            started_at: None,
            finished_at: None,
        }
    }
}
