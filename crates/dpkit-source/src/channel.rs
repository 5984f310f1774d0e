use tokio::sync::mpsc;

use crate::{LogSource, RawLine, SourceError};

/// A [`LogSource`] fed through an mpsc channel.
///
/// The sequence ends once every sender has been dropped and the buffered
/// lines are drained.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<RawLine>,
    finished: bool,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<RawLine>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Creates a bounded channel and returns its sending half with the
    /// source.
    pub fn pair(capacity: usize) -> (mpsc::Sender<RawLine>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

impl LogSource for ChannelSource {
    async fn next_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(line) => Ok(Some(line)),
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_drains_then_ends() {
        let (tx, mut source) = ChannelSource::pair(4);
        tx.send(RawLine::new("a")).await.unwrap();
        tx.send(RawLine::new("b")).await.unwrap();
        drop(tx);

        assert_eq!(source.next_line().await.unwrap().unwrap().text, "a");
        assert_eq!(source.next_line().await.unwrap().unwrap().text, "b");
        assert!(source.next_line().await.unwrap().is_none());
        assert!(source.next_line().await.unwrap().is_none());
    }
}
