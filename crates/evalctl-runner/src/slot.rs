use std::fmt;

/// A Runner slot's own lifecycle, independent of the Store's `Status` DAG
/// for the evaluation it is currently executing — the Runner never writes
/// to the Store directly, only publishes events the Reactor applies.
/// Mirrors the idempotent, illegal-transition-rejecting shape of an order
/// state machine, narrowed to a single execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    Spawning,
    Running,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEvent {
    Claim,
    Spawned,
    Finished,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTransitionError {
    pub from: SlotStatus,
    pub event: SlotEvent,
}

impl fmt::Display for SlotTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal slot transition: {:?} cannot apply to a slot in {:?} state",
            self.event, self.from
        )
    }
}

impl std::error::Error for SlotTransitionError {}

impl SlotStatus {
    pub fn apply(self, event: SlotEvent) -> Result<SlotStatus, SlotTransitionError> {
        use SlotEvent::*;
        use SlotStatus::*;
        match (self, event) {
            (Idle, Claim) => Ok(Spawning),
            (Spawning, Spawned) => Ok(Running),
            (Running, Finished) => Ok(Draining),
            (Draining, Reset) => Ok(Idle),
            // a kill request arriving while still spawning collapses
            // straight to draining without ever reaching Running.
            (Spawning, Finished) => Ok(Draining),
            (from, event) => Err(SlotTransitionError { from, event }),
        }
    }
}
