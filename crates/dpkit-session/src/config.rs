//! Session configuration.

use dpkit_transport::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Everything needed to attach a session to one server.
///
/// Missing fields fall back to [`Default`]:
///
/// ```
/// use dpkit_session::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{"addr": "10.0.0.5:27910", "rcon_secret": "hello"}"#).unwrap();
/// assert!(config.verify_chat_speakers);
/// assert!(!config.init_security);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `host:port` of the server's rcon endpoint.
    pub addr: String,

    /// The server's `rcon_password`.
    pub rcon_secret: String,

    /// Timing for the rcon transport.
    pub transport: TransportConfig,

    /// Drop chat events whose speaker is not on the live roster.
    ///
    /// Anyone can print `nick: message` into the log by choosing a crafted
    /// nick, so unverified chat should not be trusted for commands.
    pub verify_chat_speakers: bool,

    /// Run [`crate::Session::make_secure`] before events start flowing.
    pub init_security: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:27910".to_string(),
            rcon_secret: String::new(),
            transport: TransportConfig::default(),
            verify_chat_speakers: true,
            init_security: false,
        }
    }
}

impl SessionConfig {
    /// Parses a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.addr, "127.0.0.1:27910");
        assert!(config.verify_chat_speakers);
        assert!(!config.init_security);
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn test_from_json_nested_transport() {
        let config = SessionConfig::from_json(
            r#"{"rcon_secret":"x","transport":{"reply_timeout":{"secs":1,"nanos":0}},"verify_chat_speakers":false}"#,
        )
        .unwrap();
        assert_eq!(config.rcon_secret, "x");
        assert_eq!(config.transport.reply_timeout, Duration::from_secs(1));
        assert_eq!(config.transport.challenge_retries, 3);
        assert!(!config.verify_chat_speakers);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            SessionConfig::from_json("{not json"),
            Err(SessionError::Config(_))
        ));
    }
}
