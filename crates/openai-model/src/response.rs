use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use turnstile_model::{
    ErrorKind, RawMessage, ToolCall, ToolCallAccumulator, TurnEvent,
    TurnStream,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, FunctionToolCall, Message, ToolCall as WireToolCall};

struct PartialState {
    // `None` once the underlying stream has been exhausted.
    sse: Option<Sse>,
    id: Option<String>,
    content: String,
    reasoning_content: Option<String>,
    accumulator: ToolCallAccumulator,
    wire_tool_calls: Vec<WireToolCall>,
    pending_batch: Option<Vec<ToolCall>>,
}

impl PartialState {
    fn history_message(&self) -> Option<(String, Message)> {
        Some((
            self.id.clone()?,
            Message::Assistant {
                content: Some(self.content.clone()),
                tool_calls: if self.wire_tool_calls.is_empty() {
                    None
                } else {
                    Some(self.wire_tool_calls.clone())
                },
                reasoning_content: self.reasoning_content.clone(),
            },
        ))
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<TurnEvent>, PartialState), Error>;

pin_project! {
    /// A single chunked-delta protocol turn.
    pub struct OpenAITurn {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Message)>,
    }
}

impl Debug for OpenAITurn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAITurn").finish_non_exhaustive()
    }
}

impl OpenAITurn {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse: Some(sse),
            id: None,
            content: Default::default(),
            reasoning_content: Default::default(),
            accumulator: Default::default(),
            wire_tool_calls: Default::default(),
            pending_batch: Default::default(),
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            full_msg: None,
        }
    }
}

impl TurnStream for OpenAITurn {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<TurnEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    if this.full_msg.is_none() {
                        *this.full_msg = partial_state.history_message();
                    }
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The assistant message is complete as soon as the stream has
        // been exhausted, which may be one event before the final tool
        // call batch is surfaced. It must be recorded before the batch
        // so that the session appends it ahead of any tool result.
        if partial_state.sse.is_none() && this.full_msg.is_none() {
            *this.full_msg = partial_state.history_message();
        }

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }

    fn history_message(&self) -> Option<RawMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, msg)| RawMessage::new(id, msg.clone()))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<TurnEvent>, PartialState), Error> {
    if let Some(sse) = &mut partial_state.sse {
        loop {
            let sse_event = match sse.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    return Err(Error::new(
                        format!("{err:?}"),
                        ErrorKind::Transport,
                    ));
                }
            };
            trace!("got sse event: {sse_event}");
            if sse_event == "[DONE]" {
                break;
            }

            let chunk =
                match serde_json::from_str::<ChatCompletionChunk>(&sse_event) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        // A single malformed chunk never fails the stream.
                        warn!("skipping malformed chunk: {err}");
                        continue;
                    }
                };
            if partial_state.id.is_none() {
                partial_state.id = Some(chunk.id);
            }

            let Some(choice) = chunk.choices.into_iter().next() else {
                // Chunks with an empty choice batch carry nothing we need.
                continue;
            };

            if let Some(finish_reason) = &choice.finish_reason {
                trace!("finish reason: {finish_reason}");
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for tool_call in tool_calls {
                    let Some(index) = tool_call.index else {
                        warn!("skipping tool call delta without index");
                        continue;
                    };
                    let function = tool_call.function.as_ref();
                    partial_state.accumulator.register(
                        index,
                        tool_call.id.as_deref(),
                        function.and_then(|f| f.name.as_deref()),
                    );
                    if let Some(arguments) =
                        function.and_then(|f| f.arguments.as_deref())
                    {
                        partial_state
                            .accumulator
                            .append_arguments(index, arguments);
                    }
                }
            }

            if let Some(reasoning) = choice.delta.reasoning_content {
                partial_state
                    .reasoning_content
                    .get_or_insert_default()
                    .push_str(&reasoning);
            }

            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    partial_state.content.push_str(&content);
                    return Ok((
                        Some(TurnEvent::Text(content)),
                        partial_state,
                    ));
                }
            }
        }

        // The stream has ended, finalize the accumulated tool calls.
        partial_state.sse = None;
        let accumulator = mem::take(&mut partial_state.accumulator);
        let calls = accumulator.finalize();
        if !calls.is_empty() {
            partial_state.wire_tool_calls =
                calls.iter().map(wire_tool_call).collect();
            partial_state.pending_batch = Some(calls);
        }
    }

    if let Some(batch) = partial_state.pending_batch.take() {
        return Ok((Some(TurnEvent::ToolCalls(batch)), partial_state));
    }

    Ok((None, partial_state))
}

fn wire_tool_call(call: &ToolCall) -> WireToolCall {
    WireToolCall {
        index: None,
        id: Some(call.id.clone()),
        r#type: Some("function".to_owned()),
        function: Some(FunctionToolCall {
            name: Some(call.name.clone()),
            arguments: Some(call.arguments.clone()),
        }),
    }
}
