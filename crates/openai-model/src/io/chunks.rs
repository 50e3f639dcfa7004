#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub struct Error;

/// A source of raw byte chunks, either a live HTTP response body or an
/// in-memory script for tests.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    Scripted(VecDeque<Bytes>),
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_script<I: Into<VecDeque<Bytes>>>(chunks: I) -> Self {
        Chunks::Scripted(chunks.into())
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|_| Error)
            }
            #[cfg(test)]
            Chunks::Scripted(chunks) => Ok(chunks.pop_front()),
        }
    }
}
