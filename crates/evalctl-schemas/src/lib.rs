//! Wire and storage types shared by every `evalctl-*` service: the
//! `Evaluation` record, its status DAG, the Bus event envelope and topic
//! payloads, exit-code classification, and the Routing Index entry shape.

mod envelope;
mod evaluation;
mod exit;
mod routing;
mod status;

pub use envelope::{EventEnvelope, Topic};
pub use evaluation::{Evaluation, NewEvaluation, ResourceClass};
pub use exit::{classify_exit, ExitClass};
pub use routing::RoutingIndexEntry;
pub use status::{EvalEvent, Status, TransitionError};

/// Closed set of `language_tag` values the platform currently accepts.
/// Matches `evalctl_sandbox::ProcessSandbox`'s interpreter table — kept
/// here so the Gateway can reject an unsupported tag before anything is
/// enqueued, without depending on the sandbox crate itself.
pub const SUPPORTED_LANGUAGE_TAGS: &[&str] = &["python3"];
