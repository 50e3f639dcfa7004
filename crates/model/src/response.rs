use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::RawMessage;
use crate::provider::ProviderError;

/// The stream of events for one provider turn.
///
/// A well-formed turn yields zero or more [`TurnEvent::Text`] events
/// followed by at most one [`TurnEvent::ToolCalls`] event. Adapters
/// must never surface partially accumulated tool-call state.
pub trait TurnStream: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ProviderError;

    /// Attempts to pull out the next event from the turn.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means the turn is still waiting for the next
    ///   event. Implementations will ensure that the current task is
    ///   notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means an event is available and
    ///   subsequent calls may produce further events.
    /// - `Poll::Ready(Ok(None))` means the turn has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the turn.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<TurnEvent>, Self::Error>>;

    /// Returns the provider-shaped assistant message for this turn, to
    /// be appended to the conversation history.
    ///
    /// Call this only after the turn has completed; implementations
    /// should always return the same message for one turn. The default
    /// returns `None`, in which case the session downgrades to a plain
    /// text history entry.
    fn history_message(&self) -> Option<RawMessage> {
        None
    }
}

/// A finalized tool call requested by the model.
///
/// Once emitted, it is immutable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The argument text, expected (but not guaranteed) to be a valid
    /// JSON object.
    pub arguments: String,
}

/// The normalized unit produced by any provider adapter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnEvent {
    /// A text fragment, emitted as soon as it arrives.
    Text(String),
    /// A finalized batch of tool-call requests, in ascending position
    /// order.
    ToolCalls(Vec<ToolCall>),
}
