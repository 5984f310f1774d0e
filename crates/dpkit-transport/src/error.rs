use dpkit_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No reply arrived within the configured reply timeout.
    #[error("timed out waiting for the server")]
    Timeout,

    /// The server rejected the rcon secret.
    ///
    /// The transport stays locked out until the secret is reconfigured.
    #[error("bad rcon password")]
    BadRconPassword,

    /// The reply failed a freshness or integrity check (bad challenge,
    /// missing header or preamble, malformed challenge).
    #[error("security check failed: {0}")]
    SecurityCheck(String),

    /// The command referenced a map the server does not have.
    #[error("map not found: {0}")]
    MapNotFound(String),

    /// Socket setup, send or receive failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The command could not be encoded, or a reply body could not be
    /// parsed into the requested structure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
