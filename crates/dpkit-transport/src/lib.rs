//! Remote console transport for dpkit.
//!
//! Provides the [`RconTransport`] trait and [`UdpRcon`], its
//! challenge-response implementation over UDP.
//!
//! # Feature Flags
//!
//! - `fake-server`: an in-process UDP server ([`FakeServer`]) speaking the
//!   same protocol, for tests.

#![allow(async_fn_in_trait)]

mod config;
mod error;
#[cfg(feature = "fake-server")]
mod fake;
mod udp;

pub use config::{AuthState, TransportConfig};
pub use error::TransportError;
#[cfg(feature = "fake-server")]
pub use fake::FakeServer;
pub use udp::UdpRcon;

use dpkit_protocol::ServerStatus;

/// Sends authenticated console commands to a server.
pub trait RconTransport: Send + Sync + 'static {
    /// Sends one command and returns the reply text.
    ///
    /// The command is sent at most once; a lost reply surfaces as
    /// [`TransportError::Timeout`].
    async fn send_command(&self, command: &str) -> Result<String, TransportError>;

    /// Runs `status` and parses the reply.
    async fn query_status(&self) -> Result<ServerStatus, TransportError> {
        let body = self.send_command("status").await?;
        Ok(ServerStatus::parse(&body)?)
    }

    /// Current authentication state.
    fn auth_state(&self) -> AuthState;
}
