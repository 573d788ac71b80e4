use serde::{Deserialize, Serialize};
use std::fmt;

/// A node in the evaluation status DAG. Every transition is enforced by
/// [`Status::apply`] rather than left to callers to construct by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Queued | Status::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => Status::Queued,
            "running" => Status::Running,
            "completed" => Status::Completed,
            "failed" => Status::Failed,
            "cancelled" => Status::Cancelled,
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of lifecycle events the Reactor applies against an evaluation's
/// current [`Status`]. Mirrors the order-fill/cancel/replace event shape of
/// an order-management state machine, generalized to an evaluation's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalEvent {
    Dispatched,
    Started,
    Completed { exit_code: i32 },
    Failed { reason: String, exit_code: Option<i32> },
    Cancelled { exit_code: Option<i32> },
}

impl EvalEvent {
    fn name(&self) -> &'static str {
        match self {
            EvalEvent::Dispatched => "dispatched",
            EvalEvent::Started => "started",
            EvalEvent::Completed { .. } => "completed",
            EvalEvent::Failed { .. } => "failed",
            EvalEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// The exit code to surface to clients, if this event carries one.
    /// Informative only (per the exit-code classification table) — never
    /// consulted by [`Status::apply`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EvalEvent::Completed { exit_code } => Some(*exit_code),
            EvalEvent::Failed { exit_code, .. } => *exit_code,
            EvalEvent::Cancelled { exit_code } => *exit_code,
            EvalEvent::Dispatched | EvalEvent::Started => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition: {event} cannot apply to an evaluation in {from} state")]
pub struct TransitionError {
    pub from: Status,
    pub event: String,
}

impl TransitionError {
    fn new(from: Status, event: &EvalEvent) -> Self {
        TransitionError {
            from,
            event: event.name().to_string(),
        }
    }
}

impl Status {
    /// Applies `event` to `self`, returning the resulting status or a
    /// [`TransitionError`] if the event is not legal from the current
    /// status. Does not mutate `self` on error.
    pub fn apply(self, event: &EvalEvent) -> Result<Status, TransitionError> {
        use EvalEvent::*;
        use Status::*;

        match (self, event) {
            (Queued, Dispatched) => Ok(Queued),
            (Queued, Started) => Ok(Running),
            (Queued, Cancelled { .. }) => Ok(Cancelled),
            (Running, Completed { .. }) => Ok(Completed),
            (Running, Failed { .. }) => Ok(Failed),
            (Running, Cancelled { .. }) => Ok(Cancelled),
            // idempotent replay: re-delivering the event that already
            // produced the current terminal status is a no-op, not an error.
            (Completed, Completed { .. }) => Ok(Completed),
            (Failed, Failed { .. }) => Ok(Failed),
            (Cancelled, Cancelled { .. }) => Ok(Cancelled),
            (from, event) => Err(TransitionError::new(from, event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_completed() {
        let s = Status::Queued.apply(&EvalEvent::Started).unwrap();
        assert_eq!(s, Status::Running);
        let s = s.apply(&EvalEvent::Completed { exit_code: 0 }).unwrap();
        assert_eq!(s, Status::Completed);
        assert!(s.is_terminal());
    }

    #[test]
    fn cancel_from_queued_is_legal() {
        let s = Status::Queued
            .apply(&EvalEvent::Cancelled { exit_code: None })
            .unwrap();
        assert_eq!(s, Status::Cancelled);
    }

    #[test]
    fn cancel_from_running_is_legal() {
        let s = Status::Running
            .apply(&EvalEvent::Cancelled { exit_code: Some(137) })
            .unwrap();
        assert_eq!(s, Status::Cancelled);
    }

    #[test]
    fn completed_to_completed_is_idempotent_noop() {
        let s = Status::Completed
            .apply(&EvalEvent::Completed { exit_code: 0 })
            .unwrap();
        assert_eq!(s, Status::Completed);
    }

    #[test]
    fn completed_cannot_be_reopened_by_start() {
        let err = Status::Completed.apply(&EvalEvent::Started).unwrap_err();
        assert_eq!(err.from, Status::Completed);
        assert_eq!(err.event, "started");
    }

    #[test]
    fn queued_cannot_complete_directly() {
        let err = Status::Queued
            .apply(&EvalEvent::Completed { exit_code: 0 })
            .unwrap_err();
        assert_eq!(err.from, Status::Queued);
    }

    #[test]
    fn status_string_round_trips() {
        for s in [
            Status::Queued,
            Status::Running,
            Status::Completed,
            Status::Failed,
            Status::Cancelled,
        ] {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
        assert_eq!(Status::parse("bogus"), None);
    }
}
