//! Following a log file as the server appends to it.

use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::{LogSource, RawLine, SourceError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// How often to check the file for new data.
    pub poll_interval: Duration,
    /// Replay the existing contents instead of starting at the end.
    pub from_start: bool,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            from_start: false,
        }
    }
}

// ---------------------------------------------------------------------------
// FileTail
// ---------------------------------------------------------------------------

/// A [`LogSource`] that follows a growing file.
///
/// Bytes are decoded as Latin-1. An unterminated trailing fragment is held
/// back until its newline arrives. If the file shrinks (log rotation by
/// truncation), reading restarts from the beginning.
///
/// A file never "ends", so `next_line` never returns `Ok(None)`.
pub struct FileTail {
    path: PathBuf,
    file: File,
    offset: u64,
    pending: Vec<u8>,
    ready: VecDeque<RawLine>,
    interval: Interval,
}

impl FileTail {
    pub async fn open(path: impl AsRef<Path>, config: TailConfig) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).await.map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;

        let offset = if config.from_start {
            0
        } else {
            file.metadata().await?.len()
        };
        file.seek(SeekFrom::Start(offset)).await?;

        let mut interval = time::interval(config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(path = %path.display(), offset, "tailing log file");
        Ok(Self {
            path,
            file,
            offset,
            pending: Vec::new(),
            ready: VecDeque::new(),
            interval,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset up to which the file has been read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads whatever was appended since the last poll.
    async fn poll(&mut self) -> Result<(), SourceError> {
        let len = self.file.metadata().await?.len();
        if len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                len,
                offset = self.offset,
                "log file truncated, restarting from the beginning"
            );
            self.offset = 0;
            self.pending.clear();
            self.file.seek(SeekFrom::Start(0)).await?;
        }
        if len == self.offset {
            return Ok(());
        }

        self.file.read_to_end(&mut self.pending).await?;
        self.offset = self.file.stream_position().await?;

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.ready.push_back(RawLine::from_latin1(&line));
        }
        Ok(())
    }
}

impl LogSource for FileTail {
    async fn next_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            self.interval.tick().await;
            self.poll().await?;
        }
    }
}
