use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::{LogSource, RawLine, SourceError};

/// A [`LogSource`] over any async byte stream, such as a child's stdout.
///
/// EOF ends the sequence; a final fragment without a newline is still
/// delivered as a line.
pub struct ReaderSource<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin + Send + 'static> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            finished: false,
        }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> LogSource for ReaderSource<R> {
    async fn next_line(&mut self) -> Result<Option<RawLine>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            self.finished = true;
            tracing::debug!("log stream reached EOF");
            return Ok(None);
        }
        Ok(Some(RawLine::from_latin1(&self.buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_source_splits_lines_and_delivers_fragment() {
        let data: &[u8] = b"one\r\ntwo\nthree";
        let mut source = ReaderSource::new(data);

        let mut lines = Vec::new();
        while let Some(line) = source.next_line().await.unwrap() {
            lines.push(line.text);
        }
        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_reader_source_is_fused_after_eof() {
        let data: &[u8] = b"";
        let mut source = ReaderSource::new(data);
        assert!(source.next_line().await.unwrap().is_none());
        assert!(source.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_source_decodes_latin1() {
        let data: &[u8] = b"\x88Anick: hi\n";
        let mut source = ReaderSource::new(data);
        let line = source.next_line().await.unwrap().unwrap();
        assert_eq!(line.text, "\u{88}Anick: hi");
    }
}
