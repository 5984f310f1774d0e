//! Admin sessions for Digital Paint: Paintball 2 servers.
//!
//! A [`Session`] ties one server's log stream to its rcon endpoint:
//!
//! - a pump task reads the [`LogSource`](dpkit_source::LogSource), parses
//!   every line and dispatches the events;
//! - handlers and waiters subscribe through [`Session::on`] and
//!   [`Session::wait_for`];
//! - admin commands (`say`, `kick`, `change_map`, ...) go out over
//!   [`UdpRcon`](dpkit_transport::UdpRcon).
//!
//! # Key types
//!
//! - [`Session`]: one attached server
//! - [`SessionConfig`]: address, secret and behaviour switches
//! - [`SessionRegistry`]: named sessions, owned by the caller

mod config;
mod error;
mod pump;
mod registry;
mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::Session;
