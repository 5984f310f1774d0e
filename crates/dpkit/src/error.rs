//! Unified error type for dpkit.

use dpkit_dispatch::DispatchError;
use dpkit_protocol::ProtocolError;
use dpkit_session::SessionError;
use dpkit_source::SourceError;
use dpkit_supervisor::SupervisorError;
use dpkit_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DpkitError {
    /// Malformed packet, reply or pattern.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Rcon delivery or authentication failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The log could not be opened or read.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A wait timed out or the dispatcher closed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The server process could not be started or driven.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use dpkit_protocol::EventKind;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: DpkitError = TransportError::MapNotFound("nowhere".into()).into();
        assert!(matches!(err, DpkitError::Transport(_)));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DpkitError = ProtocolError::MissingHeader.into();
        assert!(matches!(err, DpkitError::Protocol(_)));
    }

    #[test]
    fn test_from_dispatch_error() {
        let err: DpkitError = DispatchError::Timeout(EventKind::Elim).into();
        assert!(matches!(err, DpkitError::Dispatch(DispatchError::Timeout(EventKind::Elim))));
    }

    #[test]
    fn test_from_supervisor_error() {
        let err: DpkitError = SupervisorError::NotRunning.into();
        assert!(matches!(err, DpkitError::Supervisor(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: DpkitError = SessionError::PlayerNotFound("whoa".into()).into();
        assert!(matches!(err, DpkitError::Session(_)));
        assert!(err.to_string().contains("whoa"));
    }

    #[test]
    fn test_from_source_error() {
        let io = std::io::Error::other("disk gone");
        let err: DpkitError = SourceError::Io(io).into();
        assert!(matches!(err, DpkitError::Source(_)));
    }
}
