use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evalctl_schemas::classify_exit;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;

use crate::{
    CapturedOutput, KillSwitch, ResourceCaps, Sandbox, SandboxError, SandboxExit, SandboxHandle,
};

/// Best-effort process-level sandbox for a single supported interpreter.
/// Isolation is limited to what a plain child process plus a dedicated
/// process group and an `RLIMIT_AS` cap can provide — adequate for
/// exercising the Runner's lifecycle, not for running untrusted code in
/// production.
pub struct ProcessSandbox;

impl ProcessSandbox {
    pub fn new() -> Self {
        ProcessSandbox
    }

    fn interpreter_for(language_tag: &str) -> Result<&'static str, SandboxError> {
        match language_tag {
            "python3" => Ok("python3"),
            other => Err(SandboxError::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn spawn(
        &self,
        language_tag: &str,
        source_text: &str,
        caps: ResourceCaps,
    ) -> Result<(Box<dyn SandboxHandle>, Arc<dyn KillSwitch>), SandboxError> {
        let interpreter = Self::interpreter_for(language_tag)?;

        let mut cmd = Command::new(interpreter);
        cmd.arg("-I")
            .arg("-c")
            .arg(source_text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        apply_unix_isolation(&mut cmd, caps.max_memory_bytes);

        let child = cmd.spawn().map_err(|e| SandboxError::Spawn(e.to_string()))?;
        let pid = child.id();

        let notify = Arc::new(Notify::new());
        let killer = Arc::new(ProcessKillSwitch {
            pid,
            notify: notify.clone(),
        });

        Ok((
            Box::new(ProcessHandle {
                child: Some(child),
                max_output_bytes: caps.max_output_bytes,
                killed: notify,
            }),
            killer,
        ))
    }
}

#[cfg(unix)]
fn apply_unix_isolation(cmd: &mut Command, max_memory_bytes: Option<u64>) {
    use nix::sys::resource::{setrlimit, Resource};
    use nix::unistd::setsid;
    use std::os::unix::process::CommandExt;

    unsafe {
        cmd.pre_exec(move || {
            // dedicated process group so `kill` can signal every
            // descendant the interpreter spawns, not just the interpreter
            // itself.
            setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            if let Some(limit) = max_memory_bytes {
                setrlimit(Resource::RLIMIT_AS, limit, limit)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            }
            Ok(())
        });
    }
}

struct ProcessKillSwitch {
    pid: Option<u32>,
    notify: Arc<Notify>,
}

#[async_trait]
impl KillSwitch for ProcessKillSwitch {
    async fn kill(&self) -> Result<(), SandboxError> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

struct ProcessHandle {
    child: Option<Child>,
    max_output_bytes: u64,
    killed: Arc<Notify>,
}

#[async_trait]
impl SandboxHandle for ProcessHandle {
    async fn wait(&mut self, timeout: Duration) -> SandboxExit {
        let Some(mut child) = self.child.take() else {
            return SandboxExit {
                exit_class: classify_exit(None, None, false, false),
                output: CapturedOutput::default(),
            };
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let cap = self.max_output_bytes as usize;

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stdout_pipe.take() {
                let mut limited = (&mut pipe).take(cap as u64);
                let _ = limited.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut pipe) = stderr_pipe.take() {
                let mut limited = (&mut pipe).take(cap as u64);
                let _ = limited.read_to_end(&mut buf).await;
            }
            buf
        });

        let (timed_out, killed, status) = tokio::select! {
            res = child.wait() => (false, false, res.ok()),
            _ = tokio::time::sleep(timeout) => {
                #[cfg(unix)]
                if let Some(pid) = child.id() {
                    use nix::sys::signal::{killpg, Signal};
                    use nix::unistd::Pid;
                    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
                let status = child.wait().await.ok();
                (true, false, status)
            }
            _ = self.killed.notified() => {
                let status = child.wait().await.ok();
                (false, true, status)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let truncated = stdout.len() as u64 >= self.max_output_bytes
            || stderr.len() as u64 >= self.max_output_bytes;

        let exit_code = status.and_then(|s| s.code());
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.and_then(|s| s.signal())
        };
        #[cfg(not(unix))]
        let signal = None;

        let exit_class = if killed {
            evalctl_schemas::ExitClass::Signalled(signal.unwrap_or(9))
        } else {
            classify_exit(exit_code, signal, timed_out, false)
        };

        SandboxExit {
            exit_class,
            output: CapturedOutput {
                stdout,
                stderr,
                truncated,
            },
        }
    }
}
