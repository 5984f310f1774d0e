use std::path::PathBuf;

/// Errors that can occur while reading log lines.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The log file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading from the underlying stream failed.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}
