//! Error types for the session layer.

use dpkit_dispatch::DispatchError;
use dpkit_transport::TransportError;

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The rcon command could not be delivered or was rejected.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Waiting for an event timed out.
    #[error(transparent)]
    Dispatch(DispatchError),

    /// The server does not know this cvar.
    #[error("cvar {0:?} does not exist")]
    CvarNotFound(String),

    /// No player with this nick is on the server.
    #[error("no player named {0:?}")]
    PlayerNotFound(String),

    /// An argument cannot be expressed as a console command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session configuration could not be parsed.
    #[error("invalid session config: {0}")]
    Config(#[from] serde_json::Error),

    /// The session has been stopped.
    #[error("session is closed")]
    SessionClosed,
}

impl From<DispatchError> for SessionError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::SessionClosed => Self::SessionClosed,
            other => Self::Dispatch(other),
        }
    }
}

impl SessionError {
    /// Returns `true` if a map change failed because the map is missing.
    pub fn is_map_not_found(&self) -> bool {
        matches!(self, Self::Transport(TransportError::MapNotFound(_)))
    }
}
