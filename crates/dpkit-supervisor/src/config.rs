//! Launch configuration and the process state machine.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LaunchConfig
// ---------------------------------------------------------------------------

/// How to start one managed dedicated server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Names the generated `<server_id>.cfg` startup file.
    pub server_id: String,

    /// Path to the dedicated server binary.
    pub binary: PathBuf,

    /// Directory the server runs in; must be writable.
    pub working_dir: PathBuf,

    /// UDP port the server listens on.
    pub port: u16,

    /// The rcon password written into the startup config.
    pub rcon_secret: String,

    /// Extra console commands appended to the startup config, in order.
    pub console_commands: Vec<String>,

    /// How long `stop` waits after `quit` before killing the process.
    pub stop_grace: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            server_id: "dpkit".to_string(),
            binary: PathBuf::from("paintball2"),
            working_dir: PathBuf::from("."),
            port: 27910,
            rcon_secret: String::new(),
            console_commands: Vec::new(),
            stop_grace: Duration::from_secs(2),
        }
    }
}

impl LaunchConfig {
    pub fn config_file_name(&self) -> String {
        format!("{}.cfg", self.server_id)
    }

    pub fn config_path(&self) -> PathBuf {
        self.working_dir.join(self.config_file_name())
    }

    /// Contents of the generated startup config.
    pub fn startup_config(&self) -> String {
        let mut out = format!(
            "set dedicated 1\nset port {}\nset rcon_password \"{}\"\n",
            self.port, self.rcon_secret
        );
        for command in &self.console_commands {
            out.push_str(command);
            out.push('\n');
        }
        out
    }

    /// The full command line, binary first, for logging and inspection.
    pub fn command_line(&self) -> Vec<String> {
        vec![
            self.binary.display().to_string(),
            "+exec".to_string(),
            self.config_file_name(),
        ]
    }
}

/// Generates a random alphanumeric rcon secret for a managed server.
pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// ProcessState
// ---------------------------------------------------------------------------

/// Why a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Ended through [`crate::SupervisorHandle::stop`].
    Graceful,
    /// Ended on its own: crashed, was killed externally, or quit by itself.
    Abnormal {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl ExitReason {
    pub(crate) fn abnormal(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self::Abnormal {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graceful => write!(f, "graceful"),
            Self::Abnormal {
                code: Some(code), ..
            } => write!(f, "exit code {code}"),
            Self::Abnormal {
                signal: Some(signal),
                ..
            } => write!(f, "signal {signal}"),
            Self::Abnormal { .. } => write!(f, "unknown exit"),
        }
    }
}

/// Lifecycle of a supervised process.
///
/// ```text
/// NotStarted → Running → Stopping → Exited
///                  └──────────────────↗
/// ```
///
/// There is no automatic restart: `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopping,
    Exited(ExitReason),
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self {
            Self::Exited(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Exited(reason) => write!(f, "Exited({reason})"),
        }
    }
}
