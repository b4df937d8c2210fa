//! Bounded shell command execution for the `cmd()` template helper.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::error::PreprocessError;

/// Default timeout for a single `cmd()` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures of a single shell invocation.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The shell could not be started.
    #[error("failed to spawn shell: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command exited unsuccessfully.
    #[error("exited with {status}{}", stderr_suffix(.stderr))]
    Failed {
        /// Exit status of the shell.
        status: ExitStatus,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The command did not finish in time and was killed.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Standard output was not valid UTF-8.
    #[error("output was not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Runs `command` through the host shell and returns its trimmed stdout.
///
/// Stdout and stderr are drained on background threads so a chatty command
/// cannot block on a full pipe while we wait on it. The timeout is a single
/// deadline measured from spawn; it also bounds reading the pipes, which a
/// backgrounded grandchild may keep open after the shell exits.
///
/// # Errors
///
/// Returns an error if the shell cannot be spawned, the command exits
/// non-zero, the timeout elapses, or stdout is not UTF-8.
pub fn run_command(command: &str, timeout: Duration) -> Result<String, ShellError> {
    debug!("Executing shell command: {command}");

    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = cmd.spawn()?;

    let (tx, rx) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, tx.clone());
    drain(child.stderr.take(), Stream::Stderr, tx);

    let Some(status) = child.wait_timeout(timeout)? else {
        kill(&mut child);
        return Err(ShellError::TimedOut(timeout));
    };

    let Some(output) = collect(&rx, started, timeout) else {
        debug!("Output pipes still open at the deadline, leaving readers detached");
        return Err(ShellError::TimedOut(timeout));
    };

    if !status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ShellError::Failed { status, stderr });
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

impl ShellError {
    /// Converts this failure into the preprocessor error for `command`.
    #[must_use]
    pub fn into_preprocess(self, command: &str) -> PreprocessError {
        match self {
            Self::TimedOut(timeout) => PreprocessError::shell_timed_out(command, timeout),
            other => PreprocessError::shell_failed(command, other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            // A read error only truncates what we report.
            let _ = pipe.read_to_end(&mut buffer);
            // The receiver is gone once the deadline has passed.
            let _ = tx.send((stream, buffer));
        });
    }
}

/// Waits for both readers until `timeout` after `started`; `None` if it
/// passes first.
fn collect(rx: &Receiver<(Stream, Vec<u8>)>, started: Instant, timeout: Duration) -> Option<Output> {
    let mut output = Output::default();
    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, buffer)) => output.stdout = buffer,
            Ok((Stream::Stderr, buffer)) => output.stderr = buffer,
            Err(RecvTimeoutError::Disconnected) => return Some(output),
            Err(RecvTimeoutError::Timeout) => return None,
        }
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill timed out command: {e}");
    }
    // Reap the process; reader threads are left to finish on their own since
    // grandchildren may still hold the pipes open.
    let _ = child.wait();
}
