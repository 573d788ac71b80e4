use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use evalctl_sandbox::{
    CapturedOutput, KillSwitch, ResourceCaps, Sandbox, SandboxError, SandboxExit, SandboxHandle,
};
use evalctl_schemas::ExitClass;
use tokio::sync::Notify;

/// Deterministic, in-process double for [`Sandbox`]: looks up the outcome
/// for a given `source_text` from a fixed table instead of ever spawning a
/// process, exactly as `PaperBroker` resolves deterministic fills from an
/// in-memory book instead of calling a real broker.
pub struct FakeSandbox {
    outcomes: Mutex<BTreeMap<String, Outcome>>,
    default_outcome: Outcome,
}

#[derive(Clone)]
struct Outcome {
    exit_class: ExitClass,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    hang: bool,
}

impl FakeSandbox {
    pub fn new() -> Self {
        FakeSandbox {
            outcomes: Mutex::new(BTreeMap::new()),
            default_outcome: Outcome {
                exit_class: ExitClass::Success,
                stdout: Vec::new(),
                stderr: Vec::new(),
                hang: false,
            },
        }
    }

    pub fn with_success(self, source_text: &str, stdout: &str) -> Self {
        self.outcomes.lock().unwrap().insert(
            source_text.to_string(),
            Outcome {
                exit_class: ExitClass::Success,
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                hang: false,
            },
        );
        self
    }

    pub fn with_nonzero_exit(self, source_text: &str, code: i32, stderr: &str) -> Self {
        self.outcomes.lock().unwrap().insert(
            source_text.to_string(),
            Outcome {
                exit_class: ExitClass::NonZeroExit(code),
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
                hang: false,
            },
        );
        self
    }

    /// Registers a source that never returns on its own — `wait` will only
    /// resolve via its timeout or an explicit kill, exercising the
    /// timeout and kill-in-flight scenarios.
    pub fn with_hang(self, source_text: &str) -> Self {
        self.outcomes.lock().unwrap().insert(
            source_text.to_string(),
            Outcome {
                exit_class: ExitClass::TimedOut,
                stdout: Vec::new(),
                stderr: Vec::new(),
                hang: true,
            },
        );
        self
    }

    pub fn with_oom(self, source_text: &str) -> Self {
        self.outcomes.lock().unwrap().insert(
            source_text.to_string(),
            Outcome {
                exit_class: ExitClass::OutOfMemory,
                stdout: Vec::new(),
                stderr: Vec::new(),
                hang: false,
            },
        );
        self
    }
}

impl Default for FakeSandbox {
    fn default() -> Self {
        Self::new()
    }
}

struct FakeHandle {
    outcome: Outcome,
    killed: Arc<Notify>,
    was_killed: Arc<std::sync::atomic::AtomicBool>,
}

struct FakeKillSwitch {
    notify: Arc<Notify>,
    was_killed: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl KillSwitch for FakeKillSwitch {
    async fn kill(&self) -> Result<(), SandboxError> {
        self.was_killed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn spawn(
        &self,
        _language_tag: &str,
        source_text: &str,
        _caps: ResourceCaps,
    ) -> Result<(Box<dyn SandboxHandle>, Arc<dyn KillSwitch>), SandboxError> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(source_text)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone());

        let notify = Arc::new(Notify::new());
        let was_killed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let killer = Arc::new(FakeKillSwitch {
            notify: notify.clone(),
            was_killed: was_killed.clone(),
        });
        Ok((
            Box::new(FakeHandle {
                outcome,
                killed: notify,
                was_killed,
            }),
            killer,
        ))
    }
}

#[async_trait]
impl SandboxHandle for FakeHandle {
    async fn wait(&mut self, timeout: Duration) -> SandboxExit {
        if self.outcome.hang {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = self.killed.notified() => {}
            }
        }

        let exit_class = if self.was_killed.load(std::sync::atomic::Ordering::SeqCst) {
            ExitClass::Signalled(9)
        } else {
            self.outcome.exit_class
        };

        SandboxExit {
            exit_class,
            output: CapturedOutput {
                stdout: self.outcome.stdout.clone(),
                stderr: self.outcome.stderr.clone(),
                truncated: false,
            },
        }
    }
}
