//! # dpkit
//!
//! Event-driven admin toolkit for Digital Paint: Paintball 2 servers.
//!
//! dpkit follows a server's console log, turns each line into a typed
//! [`Event`](dpkit_protocol::Event), and lets bot code either subscribe to
//! event kinds or await the next matching event, while sending admin
//! commands over the challenge-response rcon protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use dpkit::prelude::*;
//!
//! # async fn run() -> Result<(), DpkitError> {
//! let config = SessionConfig {
//!     rcon_secret: "hello".into(),
//!     ..SessionConfig::default()
//! };
//! let session = dpkit::attach(config, "qconsole27910.log", TailConfig::default()).await?;
//!
//! let elim = session
//!     .wait_for(EventKind::Elim, |e| e.flag("suicide") == Some(true), Some(Duration::from_secs(60)))
//!     .await?;
//! session.say(&format!("{} should be more careful", elim.text("killer_nick").unwrap_or("someone"))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `dpkit-protocol`: wire codec, hashing, text formatting, event grammar
//! - `dpkit-transport`: [`UdpRcon`](dpkit_transport::UdpRcon)
//! - `dpkit-source`: log sources
//! - `dpkit-dispatch`: listeners and one-shot waiters
//! - `dpkit-supervisor`: managed server processes
//! - `dpkit-session`: [`Session`](dpkit_session::Session) tying it together

mod error;
mod managed;

pub use error::DpkitError;
pub use managed::{ManagedServer, attach};

pub use dpkit_dispatch as dispatch;
pub use dpkit_protocol as protocol;
pub use dpkit_session as session;
pub use dpkit_source as source;
pub use dpkit_supervisor as supervisor;
pub use dpkit_transport as transport;

/// Commonly used types.
pub mod prelude {
    pub use crate::{DpkitError, ManagedServer, attach};
    pub use dpkit_dispatch::{DispatchError, EventFilter, HandlerError, ListenerId};
    pub use dpkit_protocol::text::{escape_braces, render};
    pub use dpkit_protocol::{Event, EventKind, FieldValue, GameMode, Player, ServerStatus, Team};
    pub use dpkit_session::{Session, SessionConfig, SessionError, SessionRegistry};
    pub use dpkit_source::{ChannelSource, FileTail, LogSource, RawLine, TailConfig};
    pub use dpkit_supervisor::{ExitReason, LaunchConfig, ProcessState, generate_secret};
    pub use dpkit_transport::{AuthState, RconTransport, TransportConfig, TransportError};
}
