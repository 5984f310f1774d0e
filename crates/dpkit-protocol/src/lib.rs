//! Wire protocol and log grammar for dpkit.
//!
//! This crate defines the "language" spoken between dpkit and a Digital
//! Paint: Paintball 2 server, in both directions:
//!
//! - **Datagrams** ([`codec`]): the 4-byte out-of-band header, challenge
//!   requests, authenticated `rcon` requests, and reply classification.
//! - **Hashing** ([`hash`]): the single digest primitive shared by rcon
//!   authentication and the login-service client.
//! - **Text** ([`text`]): rendering of `{C}`/`{U}`/`{I}` templates to the
//!   in-game wire form, and the exact inverse used by the parser.
//! - **Replies** ([`ServerStatus`], [`Player`]): structured views of the
//!   `status`, `sv players` and cvar replies.
//! - **Events** ([`Event`], [`EventKind`], [`Grammar`]): the log-line
//!   grammar table that turns raw server output into typed events.
//!
//! # Architecture
//!
//! The protocol layer is pure: no sockets, no files, no tasks. Everything
//! here is a function from text/bytes to values, so it can be tested
//! without a runtime.
//!
//! ```text
//! Transport (datagrams) → Protocol (Reply, ServerStatus)
//! Log Source (lines)    → Protocol (Grammar → Event) → Dispatcher
//! ```

pub mod codec;
mod error;
mod event;
mod grammar;
pub mod hash;
pub mod text;
mod types;

pub use codec::{Reply, RconRequest};
pub use error::ProtocolError;
pub use event::{Event, EventKind, FieldValue, LogClock};
pub use grammar::{CaptureClass, Grammar, Pattern, Rule};
pub use types::{GameMode, Player, ServerStatus, StatusPlayer, Team, parse_cvar};
