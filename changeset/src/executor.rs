//! Command executor contract and the stock shell implementation.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::ExecutorError;

/// How often a running command is checked for cancellation and timeout.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes kept per stream. Anything past it is drained and dropped.
const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How long the pipes are drained once the shell has exited. A background
/// job started with `&` keeps them open for as long as it lives.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

const TRUNCATED_MARKER: &str = "\n[truncated]";

/// Captured result of a completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code; `-1` when terminated by a signal.
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs opaque command strings on behalf of the sequencer.
///
/// Implementations block until the command finishes. They should return
/// [`ExecutorError::Cancelled`] promptly once `cancel` fires.
pub trait CommandExecutor {
    fn run(&self, command_line: &str, cancel: &CancellationToken) -> Result<CommandOutput, ExecutorError>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    fn run(&self, command_line: &str, cancel: &CancellationToken) -> Result<CommandOutput, ExecutorError> {
        (**self).run(command_line, cancel)
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Box<E> {
    fn run(&self, command_line: &str, cancel: &CancellationToken) -> Result<CommandOutput, ExecutorError> {
        (**self).run(command_line, cancel)
    }
}

/// Runs `<shell> -c <command>` inside the workspace root.
///
/// On Unix the shell leads its own process group, so a timeout or a
/// cancellation kills everything it started. Jobs it leaves running in the
/// background after a normal exit are left alone; their output is collected
/// for a short grace period only.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
    poll_interval: Duration,
    max_output_bytes: usize,
}

impl ShellExecutor {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: working_dir.to_path_buf(),
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Wait for the reader threads to hit EOF, bounded by the drain grace and
    /// the remaining timeout. Cancellation interrupts the wait.
    fn drain(
        &self,
        done: &mpsc::Receiver<()>,
        mut open: usize,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        let mut until = Instant::now() + DRAIN_GRACE;
        if let Some(deadline) = deadline {
            until = until.min(deadline);
        }
        while open > 0 {
            if cancel.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }
            let now = Instant::now();
            if now >= until {
                debug!(open_pipes = open, "Output pipes still held open, likely by a background job");
                break;
            }
            match done.recv_timeout((until - now).min(self.poll_interval)) {
                Ok(()) => open -= 1,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }
}

impl CommandExecutor for ShellExecutor {
    fn run(&self, command_line: &str, cancel: &CancellationToken) -> Result<CommandOutput, ExecutorError> {
        if cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(command_line)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| ExecutorError::Unavailable(format!("failed to launch {}: {e}", self.shell)))?;

        debug!(shell = %self.shell, pid = child.id(), command = command_line, "Command started");

        let (done_tx, done_rx) = mpsc::channel();
        let stdout = Capture::spawn(child.stdout.take(), self.max_output_bytes, done_tx.clone());
        let stderr = Capture::spawn(child.stderr.take(), self.max_output_bytes, done_tx);
        let open = usize::from(stdout.is_some()) + usize::from(stderr.is_some());
        let started = Instant::now();
        let deadline = self.timeout.map(|limit| started + limit);

        let status = loop {
            if cancel.is_cancelled() {
                kill_tree(&mut child);
                warn!(command = command_line, "Command cancelled");
                return Err(ExecutorError::Cancelled);
            }
            if let (Some(limit), Some(deadline)) = (self.timeout, deadline) {
                if Instant::now() >= deadline {
                    kill_tree(&mut child);
                    warn!(command = command_line, timeout = ?limit, "Command timed out");
                    return Err(ExecutorError::Timeout { timeout: limit });
                }
            }
            match child.wait_timeout(self.poll_interval) {
                Ok(Some(status)) => break status,
                Ok(None) => continue,
                Err(e) => {
                    kill_tree(&mut child);
                    return Err(ExecutorError::Io(e));
                }
            }
        };

        if let Err(e) = self.drain(&done_rx, open, deadline, cancel) {
            kill_group(child.id());
            warn!(command = command_line, "Command cancelled while draining output");
            return Err(e);
        }

        let output = CommandOutput {
            exit_status: status.code().unwrap_or(-1),
            stdout: Capture::text(stdout.as_ref()),
            stderr: Capture::text(stderr.as_ref()),
        };
        debug!(
            command = command_line,
            exit_status = output.exit_status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        Ok(output)
    }
}

/// Bytes read so far from one pipe, shared with its reader thread.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

struct Capture;

impl Capture {
    fn spawn<R: Read + Send + 'static>(
        pipe: Option<R>,
        limit: usize,
        done: Sender<()>,
    ) -> Option<Arc<Mutex<Captured>>> {
        let mut pipe = pipe?;
        let shared = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&shared);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                let n = match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                };
                let Ok(mut captured) = sink.lock() else { break };
                let room = limit.saturating_sub(captured.bytes.len());
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
                captured.truncated |= n > room;
            }
            let _ = done.send(());
        });
        Some(shared)
    }

    fn text(shared: Option<&Arc<Mutex<Captured>>>) -> String {
        let Some(Ok(captured)) = shared.map(|shared| shared.lock()) else {
            return String::new();
        };
        let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
        if captured.truncated {
            text.push_str(TRUNCATED_MARKER);
        }
        text
    }
}

/// Kill the shell's whole process group, then reap the shell.
fn kill_tree(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    if let Ok(pgid) = libc::pid_t::try_from(pid) {
        // SAFETY: killpg takes no pointers; the group was created for this child.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
