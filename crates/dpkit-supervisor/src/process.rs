//! Process actor: one Tokio task that owns a running server process.
//!
//! The actor owns the `Child` and its stdin. Handles talk to it through an
//! mpsc channel and observe its lifecycle through a `watch` channel.

use std::io;
use std::process::Stdio;

use dpkit_source::{ChannelSource, LogSource, RawLine, ReaderSource};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{ExitReason, LaunchConfig, ProcessState, SupervisorError};

const COMMAND_BUFFER: usize = 32;
const OUTPUT_BUFFER: usize = 1024;

/// Commands sent to a process actor through its channel.
enum ProcessCommand {
    /// Write one console line to stdin.
    Input {
        line: String,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },

    /// Send `quit`, wait out the grace period, then kill.
    Stop,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Entry point for starting managed servers.
pub struct Supervisor;

impl Supervisor {
    /// Writes the startup config and spawns the server.
    ///
    /// Returns a handle for console input and shutdown, plus a
    /// [`ChannelSource`] carrying the process's stdout and stderr lines.
    /// The source ends once both streams close. If nobody drains it, the
    /// server eventually blocks on a full pipe.
    pub async fn launch(config: LaunchConfig) -> Result<(SupervisorHandle, ChannelSource), SupervisorError> {
        tokio::fs::write(config.config_path(), config.startup_config()).await?;

        let mut child = Command::new(&config.binary)
            .arg("+exec")
            .arg(config.config_file_name())
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                binary: config.binary.clone(),
                source,
            })?;

        let (state_tx, state_rx) = watch::channel(ProcessState::NotStarted);
        let (line_tx, source) = ChannelSource::pair(OUTPUT_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(ReaderSource::new(stdout), line_tx.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(ReaderSource::new(stderr), line_tx, "stderr"));
        }

        let pid = child.id();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = ProcessActor {
            server_id: config.server_id.clone(),
            stdin: child.stdin.take(),
            stop_grace: config.stop_grace,
            state: state_tx,
        };
        actor.state.send_replace(ProcessState::Running);
        tracing::info!(
            server_id = %config.server_id,
            pid = ?pid,
            command = ?config.command_line(),
            "server process started"
        );
        tokio::spawn(actor.run(child, rx));

        let handle = SupervisorHandle {
            server_id: config.server_id,
            pid,
            sender: tx,
            state: state_rx,
        };
        Ok((handle, source))
    }
}

/// Copies one output stream into the shared line channel until EOF or
/// until the receiving side goes away.
async fn forward_output<S: LogSource>(mut source: S, tx: mpsc::Sender<RawLine>, stream: &'static str) {
    loop {
        match source.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(stream, error = %e, "server output read failed");
                break;
            }
        }
    }
    tracing::debug!(stream, "server output closed");
}

// ---------------------------------------------------------------------------
// SupervisorHandle
// ---------------------------------------------------------------------------

/// Handle to a supervised server. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    server_id: String,
    pid: Option<u32>,
    sender: mpsc::Sender<ProcessCommand>,
    state: watch::Receiver<ProcessState>,
}

impl SupervisorHandle {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// OS process id, if the platform reported one at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<ProcessState> {
        self.state.clone()
    }

    fn not_running(&self) -> SupervisorError {
        match self.state() {
            ProcessState::Exited(reason) => SupervisorError::ProcessExited(reason),
            _ => SupervisorError::NotRunning,
        }
    }

    /// Writes one line to the server console.
    ///
    /// # Errors
    /// [`SupervisorError::ProcessExited`] once the process has exited,
    /// [`SupervisorError::NotRunning`] while it is stopping.
    pub async fn send_input(&self, line: &str) -> Result<(), SupervisorError> {
        if line.contains(['\n', '\r']) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "console input must be a single line").into());
        }
        if !self.state().is_running() {
            return Err(self.not_running());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(ProcessCommand::Input {
                line: line.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.not_running())?;
        reply_rx.await.map_err(|_| self.not_running())?
    }

    /// Asks the server to quit, kills it after the grace period, and waits
    /// for it to exit.
    ///
    /// Returns the exit reason: [`ExitReason::Graceful`] for a process that
    /// was still running, or the earlier reason if it had already exited.
    pub async fn stop(&self) -> Result<ExitReason, SupervisorError> {
        if let ProcessState::Exited(reason) = self.state() {
            return Ok(reason);
        }
        // A closed channel means the actor is already finishing.
        let _ = self.sender.send(ProcessCommand::Stop).await;
        self.wait_exit().await
    }

    /// Waits until the process has exited.
    pub async fn wait_exit(&self) -> Result<ExitReason, SupervisorError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| state.exit_reason().is_some())
            .await
            .map_err(|_| SupervisorError::NotRunning)?;
        state.exit_reason().ok_or(SupervisorError::NotRunning)
    }
}

// ---------------------------------------------------------------------------
// ProcessActor
// ---------------------------------------------------------------------------

struct ProcessActor {
    server_id: String,
    stdin: Option<ChildStdin>,
    stop_grace: std::time::Duration,
    state: watch::Sender<ProcessState>,
}

impl ProcessActor {
    /// Runs until the process exits, then publishes the exit reason.
    async fn run(mut self, mut child: Child, mut receiver: mpsc::Receiver<ProcessCommand>) {
        let reason = loop {
            tokio::select! {
                status = child.wait() => break self.exited(status),
                cmd = receiver.recv() => match cmd {
                    Some(ProcessCommand::Input { line, reply }) => {
                        let _ = reply.send(self.write_line(&line).await);
                    }
                    Some(ProcessCommand::Stop) => break self.shutdown(&mut child).await,
                    None => {
                        tracing::info!(server_id = %self.server_id, "all handles dropped");
                        break self.shutdown(&mut child).await;
                    }
                },
            }
        };

        self.state.send_replace(ProcessState::Exited(reason));
        tracing::info!(server_id = %self.server_id, %reason, "server process exited");
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SupervisorError> {
        let stdin = self.stdin.as_mut().ok_or(SupervisorError::NotRunning)?;
        stdin.write_all(format!("{line}\n").as_bytes()).await?;
        stdin.flush().await?;
        tracing::debug!(server_id = %self.server_id, line, "console input");
        Ok(())
    }

    async fn shutdown(&mut self, child: &mut Child) -> ExitReason {
        self.state.send_replace(ProcessState::Stopping);
        tracing::info!(server_id = %self.server_id, "stopping server");

        if let Err(e) = self.write_line("quit").await {
            tracing::debug!(server_id = %self.server_id, error = %e, "could not send quit");
        }
        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(server_id = %self.server_id, error = %e, "wait failed"),
            Err(_) => {
                tracing::warn!(
                    server_id = %self.server_id,
                    grace = ?self.stop_grace,
                    "server ignored quit, killing"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(server_id = %self.server_id, error = %e, "kill failed");
                }
            }
        }
        self.stdin = None;
        ExitReason::Graceful
    }

    fn exited(&mut self, status: io::Result<std::process::ExitStatus>) -> ExitReason {
        self.stdin = None;
        match status {
            Ok(status) => {
                tracing::warn!(server_id = %self.server_id, %status, "server exited unexpectedly");
                ExitReason::abnormal(status)
            }
            Err(e) => {
                tracing::warn!(server_id = %self.server_id, error = %e, "lost track of server process");
                ExitReason::Abnormal {
                    code: None,
                    signal: None,
                }
            }
        }
    }
}
