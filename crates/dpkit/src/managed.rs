//! Entry points that wire a session to a log file or a managed process.

use std::path::Path;

use dpkit_session::{Session, SessionConfig};
use dpkit_source::{FileTail, TailConfig};
use dpkit_supervisor::{ExitReason, LaunchConfig, Supervisor, SupervisorHandle};

use crate::DpkitError;

/// Attaches to an already running server: tails its console log and talks
/// to its rcon endpoint.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), dpkit::DpkitError> {
/// use dpkit::prelude::*;
///
/// let config = SessionConfig {
///     addr: "127.0.0.1:27910".into(),
///     rcon_secret: "hello".into(),
///     ..SessionConfig::default()
/// };
/// let session = dpkit::attach(config, "pball/qconsole27910.log", TailConfig::default()).await?;
/// session.say("{C}Ahello").await?;
/// # Ok(())
/// # }
/// ```
pub async fn attach(
    config: SessionConfig,
    log_path: impl AsRef<Path>,
    tail: TailConfig,
) -> Result<Session, DpkitError> {
    let source = FileTail::open(log_path, tail).await?;
    Ok(Session::start(config, source).await?)
}

/// A server process started by dpkit, with a session on its output.
pub struct ManagedServer {
    session: Session,
    process: SupervisorHandle,
}

impl ManagedServer {
    /// Launches the server and attaches a session to its stdout/stderr.
    ///
    /// The session's address and secret come from `launch` (loopback on
    /// the configured port); the rest of `session` is used as given.
    pub async fn launch(launch: LaunchConfig, session: SessionConfig) -> Result<Self, DpkitError> {
        let session = SessionConfig {
            addr: format!("127.0.0.1:{}", launch.port),
            rcon_secret: launch.rcon_secret.clone(),
            ..session
        };
        let (process, output) = Supervisor::launch(launch).await?;
        let session = match Session::start(session, output).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(stop_err) = process.stop().await {
                    tracing::warn!(error = %stop_err, "could not stop server after failed attach");
                }
                return Err(e.into());
            }
        };
        Ok(Self { session, process })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn process(&self) -> &SupervisorHandle {
        &self.process
    }

    /// Stops the session, then the process.
    pub async fn stop(&self) -> Result<ExitReason, DpkitError> {
        self.session.stop().await?;
        Ok(self.process.stop().await?)
    }
}
