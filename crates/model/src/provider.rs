use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::TurnStream;

/// The error type for a model provider.
pub trait ProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model provider, which starts conversation
/// turns against one concrete LLM backend.
///
/// Once the provider is created, it should behave like a stateless
/// object. It can still have internal state, but callers should not
/// rely on it, and the provider should be prepared for being dropped
/// anytime. Conversation history is owned by the session, not by the
/// provider.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ProviderError;

    /// The turn stream type for this provider.
    type Turn: TurnStream<Error = Self::Error>;

    /// Sends the full history and tool declarations to the model and
    /// resolves to the stream of events for this turn.
    fn send_turn(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Turn, Self::Error>> + Send + 'static;
}
