//! A model provider for OpenAI-compatible APIs.
//!
//! The wire protocol is the chunked-delta one: an SSE stream of chunk
//! objects, each optionally carrying a content delta and/or indexed
//! tool-call deltas that are reassembled before a single finalized
//! batch is emitted.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, header};
use turnstile_model::{ErrorKind, ModelProvider, ModelRequest, ProviderError};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
pub use response::OpenAITurn;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Turn = OpenAITurn;

    fn send_turn(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Turn, Self::Error>> + Send + 'static
    {
        let config = Arc::clone(&self.config);
        let client = self.client.clone();
        let req = req.clone();

        async move {
            if config.api_key.is_empty() || config.base_url.is_empty() {
                return Err(Error::new(
                    "api key or base url is not configured",
                    ErrorKind::ConfigMissing,
                ));
            }

            let openai_req = proto::create_request(&req, &config);
            let resp_fut = client
                .post(format!("{}{}", config.base_url, "/chat/completions"))
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", config.api_key),
                )
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "text/event-stream")
                .json(&openai_req)
                .send();
            let resp = match resp_fut.await.and_then(Response::error_for_status)
            {
                Ok(resp) => resp,
                Err(err) => {
                    return Err(Error::new(
                        format!("{err}"),
                        ErrorKind::Transport,
                    ));
                }
            };

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.essence_str() == "text/event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Decode,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(OpenAITurn::from_sse(sse))
        }
    }
}
