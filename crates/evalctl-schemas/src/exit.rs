use crate::status::EvalEvent;

/// Classification of a sandbox process's exit, used to pick the
/// [`EvalEvent`] the Runner publishes once a slot's process returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    NonZeroExit(i32),
    Signalled(i32),
    TimedOut,
    OutOfMemory,
}

/// Maps a raw process exit outcome to an [`ExitClass`], and from there to
/// the lifecycle event the Runner should emit.
///
/// `timed_out` and `oom_killed` are supplied by the caller because neither
/// is always recoverable from the exit code alone (e.g. a cgroup OOM kill
/// and a `SIGKILL` sent for a wall-timeout both surface as signal 9).
pub fn classify_exit(
    exit_code: Option<i32>,
    signal: Option<i32>,
    timed_out: bool,
    oom_killed: bool,
) -> ExitClass {
    if timed_out {
        return ExitClass::TimedOut;
    }
    if oom_killed {
        return ExitClass::OutOfMemory;
    }
    match (exit_code, signal) {
        (Some(0), _) => ExitClass::Success,
        (Some(code), _) => ExitClass::NonZeroExit(code),
        (None, Some(sig)) => ExitClass::Signalled(sig),
        (None, None) => ExitClass::NonZeroExit(-1),
    }
}

impl ExitClass {
    /// Maps to one of the platform's three legal terminal events. A
    /// nonzero exit is a program failure, not completion; a wall-timeout
    /// or OOM kill is also a failure, carrying the conventional exit code
    /// for its cause; a signalled exit is what the Runner's kill-switch
    /// produces, so it surfaces as a cancellation rather than a failure.
    pub fn into_event(self) -> EvalEvent {
        match self {
            ExitClass::Success => EvalEvent::Completed { exit_code: 0 },
            ExitClass::NonZeroExit(code) => EvalEvent::Failed {
                reason: format!("program exited with status {code}"),
                exit_code: Some(code),
            },
            ExitClass::Signalled(sig) => EvalEvent::Cancelled {
                exit_code: Some(128 + sig),
            },
            ExitClass::TimedOut => EvalEvent::Failed {
                reason: "timeout".to_string(),
                exit_code: Some(124),
            },
            ExitClass::OutOfMemory => EvalEvent::Failed {
                reason: "oom".to_string(),
                exit_code: Some(137),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_success() {
        assert_eq!(
            classify_exit(Some(0), None, false, false),
            ExitClass::Success
        );
    }

    #[test]
    fn nonzero_exit_is_completed_with_code() {
        assert_eq!(
            classify_exit(Some(1), None, false, false),
            ExitClass::NonZeroExit(1)
        );
    }

    #[test]
    fn timeout_takes_priority_over_signal() {
        assert_eq!(
            classify_exit(None, Some(9), true, false),
            ExitClass::TimedOut
        );
    }

    #[test]
    fn oom_takes_priority_over_plain_signal() {
        assert_eq!(
            classify_exit(None, Some(9), false, true),
            ExitClass::OutOfMemory
        );
    }

    #[test]
    fn signal_without_timeout_or_oom_is_signalled() {
        assert_eq!(
            classify_exit(None, Some(11), false, false),
            ExitClass::Signalled(11)
        );
    }
}
