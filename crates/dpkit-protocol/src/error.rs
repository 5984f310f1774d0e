//! Error types for the protocol layer.
//!
//! Each dpkit crate defines its own error enum. A `ProtocolError` always
//! means the bytes or text were malformed; it never means the network or
//! the server misbehaved in some other way.

/// Errors that can occur while framing, decoding or classifying packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The datagram did not start with the `0xFF 0xFF 0xFF 0xFF` header.
    #[error("packet is missing the out-of-band header")]
    MissingHeader,

    /// A reply did not start with the expected `print` preamble.
    #[error("reply is missing the print preamble")]
    MissingPreamble,

    /// A challenge reply was malformed (wrong verb, empty or spaced token).
    #[error("malformed challenge reply: {0:?}")]
    MalformedChallenge(String),

    /// A command contained characters that cannot travel in one request
    /// (line breaks) or is empty.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// Text contained a character outside Latin-1.
    #[error("character {0:?} cannot be encoded as Latin-1")]
    Unencodable(char),

    /// A status reply could not be parsed.
    #[error("malformed status reply: {0}")]
    MalformedStatus(String),

    /// A grammar template was invalid.
    #[error("invalid pattern {template:?}: {reason}")]
    InvalidPattern {
        /// The offending template.
        template: String,
        /// Why it was rejected.
        reason: String,
    },
}
