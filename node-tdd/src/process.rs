//! The test subprocess.
//!
//! [`TestProcess::spawn`] starts a [`TestInvocation`] in the workspace root with
//! both output streams piped. Everything the process produces is delivered on a
//! single channel of [`ProcessEvent`]s:
//!
//! - zero or more [`ProcessEvent::Output`] chunks, in order per stream
//! - exactly one [`ProcessEvent::Exited`], always last
//!
//! The exit event is only sent after both output pumps have drained their
//! pipes, so a consumer never sees output arrive after the exit.
//!
//! On Unix the child is started in its own process group and [`TestProcess::stop`]
//! signals the whole group with `SIGTERM`. Package managers run the actual test
//! command as a grandchild, and signalling only the direct child would leave it
//! running with the pipes still open.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::manifest::TestInvocation;

/// Errors that can occur while starting or signalling the test process.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The package manager could not be started (not installed, not executable).
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A piece of process output, normally one line including its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
}

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one (Unix only).
    pub signal: Option<i32>,
    /// Whether a stop request reached the process before it exited.
    pub stopped: bool,
}

impl ProcessExit {
    /// Returns `true` for a normal exit with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns `true` if the process ended because of a delivered stop
    /// request, rather than by exiting on its own.
    ///
    /// A process that traps the signal and exits with a code is judged by
    /// that code.
    #[must_use]
    pub fn ended_by_stop(&self) -> bool {
        if cfg!(unix) {
            self.stopped && self.signal.is_some()
        } else {
            self.stopped && !self.success()
        }
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            stopped: false,
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Events produced by a running test process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of output.
    Output(OutputChunk),
    /// The process has exited and all output has been delivered.
    Exited(ProcessExit),
}

/// Handle to a running test process.
///
/// The child itself is owned by a supervisor task; this handle only carries
/// the stop request. Dropping the handle requests a stop as well.
#[derive(Debug)]
pub struct TestProcess {
    pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<()>>,
    stop_sent: bool,
}

impl TestProcess {
    /// Spawns `invocation` in `cwd` and starts streaming its events to `events`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] if the program cannot be started. No
    /// event is sent in that case.
    pub fn spawn(
        invocation: &TestInvocation,
        cwd: &Path,
        events: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self, ProcessError> {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // The child's PID becomes the PGID
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: invocation.display(),
            source,
        })?;

        let pid = child.id();
        info!(pid, command = %invocation.display(), cwd = %cwd.display(), "Started test process");

        let stdout = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(pump(pipe, OutputStream::Stdout, events.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(pump(pipe, OutputStream::Stderr, events.clone())));

        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(async move {
            let exit = supervise(&mut child, stop_rx).await;

            for pump in [stdout, stderr].into_iter().flatten() {
                if let Err(e) = pump.await {
                    warn!(error = %e, "Output pump task failed");
                }
            }

            debug!(pid, %exit, "Test process exited");
            if events.send(ProcessEvent::Exited(exit)).await.is_err() {
                trace!("Process event receiver dropped before exit");
            }
        });

        Ok(Self {
            pid,
            stop_tx: Some(stop_tx),
            stop_sent: false,
        })
    }

    /// OS process id of the child, if it was available at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Requests termination. Later calls are no-ops.
    ///
    /// The exit still arrives as a regular [`ProcessEvent::Exited`], with
    /// [`ProcessExit::stopped`] set if the request got there in time.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!(pid = self.pid, "Requesting test process stop");
            // Fails once the supervisor has seen the exit
            self.stop_sent = tx.send(()).is_ok();
            if !self.stop_sent {
                debug!(pid = self.pid, "Test process already exited");
            }
        }
    }

    /// Returns `true` if a stop request was handed to a live supervisor.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_sent
    }
}

impl Drop for TestProcess {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Waits for the child, terminating it if a stop arrives first.
///
/// The returned exit is marked `stopped` only when the signal was actually
/// delivered to a process that had not exited yet.
async fn supervise(child: &mut Child, mut stop_rx: oneshot::Receiver<()>) -> ProcessExit {
    let (status, stopped) = tokio::select! {
        biased;
        status = child.wait() => (status, false),
        Ok(()) = &mut stop_rx => {
            let stopped = match child.try_wait() {
                Ok(Some(_)) => false,
                _ => match terminate(child) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Failed to signal test process");
                        false
                    }
                },
            };
            (child.wait().await, stopped)
        }
    };

    match status {
        Ok(status) => ProcessExit {
            stopped,
            ..ProcessExit::from(status)
        },
        Err(e) => {
            warn!(error = %e, "Failed to wait for test process");
            ProcessExit {
                stopped,
                ..ProcessExit::default()
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    // Already reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return child.start_kill();
    };

    // SAFETY: killpg has no memory-safety preconditions.
    if unsafe { libc::killpg(pgid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

/// Forwards one pipe to the event channel, a line at a time.
async fn pump<R>(pipe: R, stream: OutputStream, events: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = OutputChunk {
                    stream,
                    text: String::from_utf8_lossy(&buf).into_owned(),
                };
                if events.send(ProcessEvent::Output(chunk)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(?stream, error = %e, "Failed to read test output");
                break;
            }
        }
    }
}
