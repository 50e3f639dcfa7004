use std::mem;

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// Splits a chunk stream into newline-delimited frames.
///
/// The trailing partial line is retained as the decode buffer until
/// more bytes arrive; when the stream ends, the residual buffer is
/// offered as a final line.
pub struct Lines {
    buf: String,
    pending: Vec<u8>,
    chunks: Chunks,
    exhausted: bool,
}

impl Lines {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending: Vec::new(),
            chunks,
            exhausted: false,
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(eol_idx) = self.buf.find('\n') {
                let mut line: String = self.buf.drain(..=eol_idx).collect();
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            if self.exhausted {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(mem::take(&mut self.buf)));
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.push_bytes(&bytes)?,
                None => {
                    // A stream ending inside a multibyte character is
                    // genuinely malformed.
                    if !self.pending.is_empty() {
                        return Err(Error::InvalidPayload);
                    }
                    self.exhausted = true;
                }
            }
        }
    }

    /// Decodes a chunk incrementally. A multibyte character split
    /// across chunk boundaries is kept as a pending suffix until the
    /// rest of its bytes arrive.
    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut data = mem::take(&mut self.pending);
        data.extend_from_slice(bytes);
        match str::from_utf8(&data) {
            Ok(s) => self.buf.push_str(s),
            Err(err) if err.error_len().is_none() => {
                let valid = err.valid_up_to();
                let s = str::from_utf8(&data[..valid])
                    .map_err(|_| Error::InvalidPayload)?;
                self.buf.push_str(s);
                data.drain(..valid);
                self.pending = data;
            }
            Err(_) => return Err(Error::InvalidPayload),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_lines_across_chunk_boundaries() {
        let chunks = Chunks::from_script(vec![
            Bytes::from_static(b"{\"a\":1}\n{\"b\""),
            Bytes::from_static(b":2}\n"),
        ]);
        let mut lines = Lines::new(chunks);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "{\"b\":2}");
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_residual_buffer_is_a_final_line() {
        let chunks =
            Chunks::from_script(vec![Bytes::from_static(b"{\"a\":1}")]);
        let mut lines = Lines::new(chunks);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "café\n" with the two bytes of 'é' landing in different
        // chunks.
        let chunks = Chunks::from_script(vec![
            Bytes::from_static(b"caf\xC3"),
            Bytes::from_static(b"\xA9\n"),
        ]);
        let mut lines = Lines::new(chunks);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "caf\u{e9}");
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_multibyte_char_at_stream_end() {
        let chunks =
            Chunks::from_script(vec![Bytes::from_static(b"ok\ncaf\xC3")]);
        let mut lines = Lines::new(chunks);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "ok");
        assert_eq!(
            lines.next_line().await.unwrap_err(),
            Error::InvalidPayload
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_rejected() {
        let chunks =
            Chunks::from_script(vec![Bytes::from_static(b"\xFF\xFE\n")]);
        let mut lines = Lines::new(chunks);
        assert_eq!(
            lines.next_line().await.unwrap_err(),
            Error::InvalidPayload
        );
    }

    #[tokio::test]
    async fn test_crlf_is_stripped() {
        let chunks =
            Chunks::from_script(vec![Bytes::from_static(b"hello\r\nbye\r\n")]);
        let mut lines = Lines::new(chunks);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "hello");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "bye");
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
