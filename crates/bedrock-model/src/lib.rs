//! A model provider for Bedrock-hosted Anthropic models.
//!
//! The wire protocol is the line-delimited framed one: each line of the
//! streaming response is a JSON frame whose base64 `chunk.bytes` payload
//! decodes to a typed message event. When no streaming endpoint is
//! configured the provider falls back to the non-streaming invoke
//! endpoint and replays the complete response as events.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use reqwest::{Client, Response, header};
use turnstile_model::{ErrorKind, ModelProvider, ModelRequest, ProviderError};

pub use config::{BedrockConfig, BedrockConfigBuilder};
use io::{Chunks, Lines};
pub use response::BedrockTurn;

/// Error type for [`BedrockProvider`].
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

/// Bedrock-hosted Anthropic model provider.
#[derive(Clone, Debug)]
pub struct BedrockProvider {
    client: Client,
    config: Arc<BedrockConfig>,
}

impl BedrockProvider {
    /// Creates a new `BedrockProvider` with the given configuration.
    #[inline]
    pub fn new(config: BedrockConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for BedrockProvider {
    type Error = Error;
    type Turn = BedrockTurn;

    fn send_turn(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Turn, Self::Error>> + Send + 'static
    {
        let config = Arc::clone(&self.config);
        let client = self.client.clone();
        let req = req.clone();

        async move {
            if config.api_key.is_empty() {
                return Err(Error::new(
                    "api key is not configured",
                    ErrorKind::ConfigMissing,
                ));
            }
            let Some(url) = config.stream_url.clone().or_else(|| {
                config.invoke_url.clone()
            }) else {
                return Err(Error::new(
                    "no model endpoint is configured",
                    ErrorKind::ConfigMissing,
                ));
            };
            let streaming = config.stream_url.is_some();

            let bedrock_req = proto::create_request(&req, &config);
            let resp_fut = client
                .post(url)
                .header("api-key", &config.api_key)
                .header(header::CONTENT_TYPE, "application/json")
                .json(&bedrock_req)
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

            if streaming {
                let chunks = Chunks::from_response(resp);
                return Ok(BedrockTurn::from_lines(Lines::new(chunks)));
            }

            // Non-streaming fallback: buffer the whole body and replay
            // it as events.
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    return Err(Error::new(
                        format!("{err}"),
                        ErrorKind::Transport,
                    ));
                }
            };
            Ok(BedrockTurn::from_invoke_body(&body))
        }
    }
}

#[cfg(test)]
mod tests {
    use turnstile_model::ModelRequest;

    use super::*;

    fn empty_request() -> ModelRequest {
        ModelRequest {
            messages: vec![],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let config = BedrockConfigBuilder::with_api_key("")
            .with_stream_url("https://bedrock.example/stream")
            .build();
        let provider = BedrockProvider::new(config);
        let err = provider.send_turn(&empty_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
    }

    #[tokio::test]
    async fn test_missing_endpoints_is_config_error() {
        let config = BedrockConfigBuilder::with_api_key("xxx").build();
        let provider = BedrockProvider::new(config);
        let err = provider.send_turn(&empty_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
    }
}
