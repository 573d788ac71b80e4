//! The Sandbox contract a Runner holds its slots through. This crate does
//! NOT implement a production-grade sandbox (no seccomp, no user
//! namespacing, no network isolation) — [`ProcessSandbox`] exists so the
//! Runner's slot lifecycle, output capture and exit classification can be
//! exercised end-to-end. A deployment swaps in a container-backed
//! implementation of the same trait without touching `evalctl-runner`.

mod process;

pub use process::ProcessSandbox;

use async_trait::async_trait;
use evalctl_schemas::ExitClass;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unsupported language tag {0:?}")]
    UnsupportedLanguage(String),
    #[error("failed to spawn sandbox process: {0}")]
    Spawn(String),
    #[error("sandbox process error: {0}")]
    Process(String),
}

#[derive(Debug, Clone)]
pub struct ResourceCaps {
    pub max_memory_bytes: Option<u64>,
    pub max_output_bytes: u64,
}

/// Captured process output, truncated to `max_output_bytes`.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct SandboxExit {
    pub exit_class: ExitClass,
    pub output: CapturedOutput,
}

/// Exclusive handle to a running sandbox process. Owned by whichever task
/// is waiting on the evaluation's result; never shared, since `wait` needs
/// `&mut self` to read output into its own buffers.
#[async_trait]
pub trait SandboxHandle: Send {
    /// Waits for the process to exit on its own, or for `timeout` to
    /// elapse, or for the paired [`KillSwitch`] to fire — whichever comes
    /// first.
    async fn wait(&mut self, timeout: Duration) -> SandboxExit;
}

/// Shareable, `&self` kill signal paired with a [`SandboxHandle`] at spawn
/// time. Split out from `SandboxHandle` itself so an operator-initiated
/// kill request never has to contend with the exclusive lock the `wait`
/// caller is sitting inside for up to the evaluation's full timeout.
#[async_trait]
pub trait KillSwitch: Send + Sync {
    async fn kill(&self) -> Result<(), SandboxError>;
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn spawn(
        &self,
        language_tag: &str,
        source_text: &str,
        caps: ResourceCaps,
    ) -> Result<(Box<dyn SandboxHandle>, std::sync::Arc<dyn KillSwitch>), SandboxError>;
}
