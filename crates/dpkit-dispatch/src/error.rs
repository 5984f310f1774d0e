//! Error types for the dispatch layer.

use dpkit_protocol::EventKind;

/// Errors returned to callers of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No matching event arrived before the deadline.
    #[error("timed out waiting for {0} event")]
    Timeout(EventKind),

    /// The dispatcher was closed (session stopped or log stream ended).
    #[error("session closed")]
    SessionClosed,
}

/// The error a persistent handler may return.
///
/// Handler failures are logged and never reach the dispatch loop.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
