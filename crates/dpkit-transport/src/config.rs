//! Transport configuration and authentication state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Timing knobs for [`crate::UdpRcon`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long to wait for any single reply datagram.
    pub reply_timeout: Duration,

    /// How long a fetched challenge may be reused.
    pub challenge_ttl: Duration,

    /// Extra attempts after a challenge request goes unanswered.
    /// Commands themselves are never resent.
    pub challenge_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(3),
            challenge_ttl: Duration::from_secs(5),
            challenge_retries: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// Where the transport stands with the server.
///
/// ```text
/// Unauthenticated ──reply──→ Authenticated
///        │                        │
///        └──Bad rcon_password.────┴──→ LockedOut ──set_secret──→ Unauthenticated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    /// No command has been accepted yet.
    Unauthenticated,
    /// The last authenticated command was accepted.
    Authenticated,
    /// The server rejected the secret; commands fail fast.
    LockedOut,
}

impl AuthState {
    /// Returns `true` if commands may be sent.
    pub fn can_send(&self) -> bool {
        !matches!(self, Self::LockedOut)
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::LockedOut => write!(f, "LockedOut"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.reply_timeout, Duration::from_secs(3));
        assert_eq!(config.challenge_ttl, Duration::from_secs(5));
        assert_eq!(config.challenge_retries, 3);
    }

    #[test]
    fn test_transport_config_partial_json_uses_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"challenge_retries": 0}"#).unwrap();
        assert_eq!(config.challenge_retries, 0);
        assert_eq!(config.reply_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_auth_state_can_send() {
        assert!(AuthState::Unauthenticated.can_send());
        assert!(AuthState::Authenticated.can_send());
        assert!(!AuthState::LockedOut.can_send());
    }

    #[test]
    fn test_auth_state_display() {
        assert_eq!(AuthState::LockedOut.to_string(), "LockedOut");
    }
}
