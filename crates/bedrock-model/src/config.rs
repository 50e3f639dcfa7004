use std::env;
use std::fmt::Debug;

const DEFAULT_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f64 = 0.9;

/// Builder for [`BedrockConfig`].
#[derive(Clone, PartialEq)]
pub struct BedrockConfigBuilder {
    api_key: String,
    stream_url: Option<String>,
    invoke_url: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
}

impl BedrockConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            stream_url: None,
            invoke_url: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Sets the streaming endpoint.
    #[inline]
    pub fn with_stream_url<S: Into<String>>(mut self, url: S) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    /// Sets the non-streaming endpoint, used as a fallback mode when no
    /// streaming endpoint is configured.
    #[inline]
    pub fn with_invoke_url<S: Into<String>>(mut self, url: S) -> Self {
        self.invoke_url = Some(url.into());
        self
    }

    /// Sets the maximum number of tokens to sample.
    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the sampling temperature.
    #[inline]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> BedrockConfig {
        BedrockConfig {
            api_key: self.api_key,
            stream_url: self.stream_url,
            invoke_url: self.invoke_url,
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_owned(),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        }
    }
}

impl Debug for BedrockConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("stream_url", &self.stream_url)
            .field("invoke_url", &self.invoke_url)
            .finish_non_exhaustive()
    }
}

/// Configuration for the Bedrock-hosted Anthropic provider.
#[derive(Clone, PartialEq)]
pub struct BedrockConfig {
    pub(crate) api_key: String,
    pub(crate) stream_url: Option<String>,
    pub(crate) invoke_url: Option<String>,
    pub(crate) anthropic_version: String,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f64,
}

impl BedrockConfig {
    /// Reads the configuration from the `aws_bedrock_key`,
    /// `aws_bedrock_stream_url` and `aws_bedrock_url` environment
    /// variables.
    ///
    /// Returns `None` when the key is unset; either endpoint may be
    /// absent individually.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("aws_bedrock_key").ok()?;
        let mut builder = BedrockConfigBuilder::with_api_key(api_key);
        if let Ok(url) = env::var("aws_bedrock_stream_url") {
            builder = builder.with_stream_url(url);
        }
        if let Ok(url) = env::var("aws_bedrock_url") {
            builder = builder.with_invoke_url(url);
        }
        Some(builder.build())
    }
}

impl Debug for BedrockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfig")
            .field("api_key", &"<redacted>")
            .field("stream_url", &self.stream_url)
            .field("invoke_url", &self.invoke_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}
