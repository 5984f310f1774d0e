//! Dedicated server process supervision for dpkit.
//!
//! [`Supervisor::launch`] writes a generated startup config, spawns the
//! server binary with piped stdio, and hands back a [`SupervisorHandle`]
//! plus a [`ChannelSource`](dpkit_source::ChannelSource) of its console
//! output, ready to feed a dispatcher.
//!
//! Each process is owned by its own actor task. Lifecycle transitions are
//! published on a `watch` channel:
//!
//! - [`ProcessState`]: `NotStarted → Running → Stopping → Exited`
//! - [`ExitReason`]: `Graceful` after [`SupervisorHandle::stop`],
//!   `Abnormal { code, signal }` otherwise
//!
//! Nothing is ever restarted automatically.

mod config;
mod error;
mod process;

pub use config::{ExitReason, LaunchConfig, ProcessState, generate_secret};
pub use error::SupervisorError;
pub use process::{Supervisor, SupervisorHandle};
