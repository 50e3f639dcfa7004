use std::mem;

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// Reads server-sent events from a chunk stream.
///
/// Incoming bytes are buffered until a complete event is available; the
/// trailing partial event survives across chunk boundaries.
pub struct Sse {
    buf: String,
    pending: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Read more data from the stream first.
            let mut has_more_data = false;
            if let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            {
                self.push_bytes(&bytes)?;
                has_more_data = true;
            }

            // There are data in the buffer, try to parse an event. If the data
            // is not enough to parse an event, we need to read more.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            // Abort if no more data available.
            if !has_more_data {
                // A stream ending inside a multibyte character is
                // genuinely malformed.
                if !self.pending.is_empty() {
                    return Err(Error::InvalidPayload);
                }
                return Ok(None);
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

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        // For `end-of-line`, we only handle line feed. And for event, we
        // only handle field.
        //
        // event         = *( comment / field ) end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        // end-of-line   = ( cr lf / cr / lf )
        let Some(eol_idx) = self.buf.find("\n\n") else {
            return Ok(None);
        };

        // Parse the field line.
        let field = &self.buf[0..eol_idx];
        let mut field_parts = field.split(": ");
        let Some(header) = field_parts.next() else {
            return Err(Error::InvalidPayload);
        };
        if header != "data" {
            // Other events are not supported.
            return Err(Error::InvalidPayload);
        }
        let Some(data) = field_parts.next() else {
            return Err(Error::InvalidPayload);
        };
        let data = data.to_owned();

        // Consume the bytes from the buffer.
        self.buf.drain(0..eol_idx + 2);

        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_script(vec![
            Bytes::from_static(b"data: hello\n\n"),
            Bytes::from_static(b"data: bye\n\n"),
        ]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let chunks = Chunks::from_script(vec![
            Bytes::from_static(b"data:"),
            Bytes::from_static(b" hello\n"),
            Bytes::from_static(b"\n"),
        ]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "café" with the two bytes of 'é' landing in different
        // chunks.
        let chunks = Chunks::from_script(vec![
            Bytes::from_static(b"data: caf\xC3"),
            Bytes::from_static(b"\xA9\n\n"),
        ]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "caf\u{e9}");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks =
            Chunks::from_script(vec![Bytes::from_static(b"xxxxxx\n\n")]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        // An incomplete event is not an error, just the end of stream.
        let chunks = Chunks::from_script(vec![Bytes::from_static(b"xxxxxx\n")]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
