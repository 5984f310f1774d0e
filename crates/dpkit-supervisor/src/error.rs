use std::path::PathBuf;

use crate::ExitReason;

/// Errors that can occur while launching or driving a server process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The process has already exited.
    #[error("server process exited ({0})")]
    ProcessExited(ExitReason),

    /// The binary could not be started.
    #[error("failed to spawn {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the startup config or the console failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The process is not accepting input (stopping, or never started).
    #[error("server process is not running")]
    NotRunning,
}
