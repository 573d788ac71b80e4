//! Request and response bodies for every `evalctl-gateway` HTTP endpoint.
//! Kept separate from `routes.rs` so the wire shapes can be referenced from
//! tests without pulling in axum's extractor machinery.

use evalctl_schemas::Evaluation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub source_text: String,
    pub language_tag: String,
    pub timeout_s: u32,
    #[serde(default)]
    pub resource_class: Option<String>,
    #[serde(default)]
    pub max_output_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub id: Uuid,
    pub status: &'static str,
}

/// Wire shape of one evaluation record, matching `GET /eval/{id}` and the
/// rows inside `GET /eval`'s page. A thin projection of `Evaluation` rather
/// than the struct itself, so Store-internal fields never leak verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResponse {
    pub id: Uuid,
    pub language_tag: String,
    pub timeout_s: u32,
    pub resource_class: String,
    pub status: String,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub output_preview: Option<String>,
    pub output_ref: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(e: Evaluation) -> Self {
        EvaluationResponse {
            id: e.id,
            language_tag: e.language_tag,
            timeout_s: e.timeout_s,
            resource_class: e.resource_class.0,
            status: e.status.as_str().to_string(),
            exit_code: e.exit_code,
            error_message: e.error_reason,
            output_preview: e.output_preview,
            output_ref: e.output_ref,
            created_at: e.created_at,
            started_at: e.started_at,
            completed_at: e.finished_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub items: Vec<EvaluationResponse>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub is_running: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillResponse {
    pub killed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}
