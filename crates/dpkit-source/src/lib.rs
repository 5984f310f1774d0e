//! Log line sources for dpkit.
//!
//! A [`LogSource`] yields the server's console output one line at a time.
//! The sequence is lazy and non-restartable: once `next_line` returns
//! `Ok(None)` it keeps returning `Ok(None)`.
//!
//! - [`FileTail`] follows a log file as it grows.
//! - [`ReaderSource`] splits any async byte stream (e.g. child stdout).
//! - [`ChannelSource`] receives lines pushed by another task.

mod channel;
mod error;
mod file;
mod reader;

pub use channel::ChannelSource;
pub use error::SourceError;
pub use file::{FileTail, TailConfig};
pub use reader::ReaderSource;

use std::future::Future;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One line of server output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLine {
    pub text: String,
    pub received_at: SystemTime,
}

impl RawLine {
    /// Wraps `text`, stamped with the current time.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: SystemTime::now(),
        }
    }

    /// Builds a line from raw Latin-1 bytes, dropping a trailing `\r\n`.
    pub fn from_latin1(bytes: &[u8]) -> Self {
        let text = dpkit_protocol::codec::latin1_decode(bytes);
        Self::new(text.trim_end_matches(['\r', '\n']))
    }
}

/// A lazily produced, non-restartable sequence of lines.
///
/// The returned future is `Send` so that a source can be driven from a
/// spawned task; implementations simply write `async fn next_line`.
pub trait LogSource: Send + 'static {
    /// Waits for the next line.
    ///
    /// Returns `Ok(None)` once the stream has ended, and on every call
    /// after that.
    fn next_line(&mut self) -> impl Future<Output = Result<Option<RawLine>, SourceError>> + Send;
}
