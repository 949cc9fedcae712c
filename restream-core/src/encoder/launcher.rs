use std::{ffi::OsString, io, process::Stdio, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use tokio::{io::AsyncRead, process::Command};
use tokio_util::sync::CancellationToken;

/// Platform-specific control over one running encoder.
///
/// Waiting for exit is not part of this trait: it is handed out once, as the
/// `exit` future of [`LaunchedEncoder`], to the task that watches the process.
pub trait ProcessControl: Send + Sync {
    /// Ask the process to finish on its own (SIGINT on unix).
    fn request_graceful_stop(&self) -> io::Result<()>;
    /// Terminate the process without waiting for it to cooperate.
    fn force_kill(&self) -> io::Result<()>;
}

/// How an encoder process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitReport {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl From<std::process::ExitStatus> for ExitReport {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

pub type DiagnosticStream = Box<dyn AsyncRead + Send + Unpin>;

pub struct LaunchedEncoder {
    pub control: Arc<dyn ProcessControl>,
    /// Readable diagnostic output (stderr for the real encoder).
    pub diagnostics: DiagnosticStream,
    /// Resolves once the process has exited.
    pub exit: BoxFuture<'static, io::Result<ExitReport>>,
}

/// Spawns encoder processes from an argument vector.
pub trait EncoderLauncher: Send + Sync {
    fn launch(&self, args: &[String]) -> io::Result<LaunchedEncoder>;
}

/// Launches the encoder binary as an OS child process.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    program: OsString,
}

impl CommandLauncher {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderLauncher for CommandLauncher {
    fn launch(&self, args: &[String]) -> io::Result<LaunchedEncoder> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("encoder stderr not captured"))?;

        let pid = child.id();
        let kill = CancellationToken::new();
        let reaped = CancellationToken::new();

        // The child is owned by this task so a kill request is served even
        // while nobody is polling the exit future.
        let kill_clone = kill.clone();
        let reaped_clone = reaped.clone();
        let waiter = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_clone.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        log::warn!("Encoder: kill pid {:?} failed: {}", pid, e);
                    }
                    child.wait().await
                }
            };
            reaped_clone.cancel();
            status
        });

        let exit = waiter
            .map(|joined| match joined {
                Ok(status) => status.map(ExitReport::from),
                Err(e) => Err(io::Error::other(e)),
            })
            .boxed();

        Ok(LaunchedEncoder {
            control: Arc::new(ChildControl { pid, kill, reaped }),
            diagnostics: Box::new(stderr),
            exit,
        })
    }
}

struct ChildControl {
    pid: Option<u32>,
    kill: CancellationToken,
    /// Set once the child has been waited on; its pid may be reused after.
    reaped: CancellationToken,
}

impl ProcessControl for ChildControl {
    #[cfg(unix)]
    fn request_graceful_stop(&self) -> io::Result<()> {
        let pid = self
            .pid
            .filter(|_| !self.reaped.is_cancelled())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process already exited"))?;
        let pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, libc::SIGINT) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn request_graceful_stop(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "graceful interrupt not supported on this platform",
        ))
    }

    fn force_kill(&self) -> io::Result<()> {
        self.kill.cancel();
        Ok(())
    }
}
