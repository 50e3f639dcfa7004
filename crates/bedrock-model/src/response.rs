use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pin_project_lite::pin_project;
use serde_json::{Map, Value};
use turnstile_model::{
    ErrorKind, RawMessage, ToolCall, ToolCallAccumulator, TurnEvent,
    TurnStream,
};

use crate::Error;
use crate::io::Lines;
use crate::proto::{
    BlockDelta, ContentBlock, ContentPart, InvokeBlock, InvokeResponse,
    Message, MessageContent, StreamEvent, StreamFrame,
};

enum Source {
    Stream(Lines),
    Buffered(VecDeque<TurnEvent>),
    Done,
}

struct PartialState {
    source: Source,
    content: String,
    accumulator: ToolCallAccumulator,
    tool_parts: Vec<ContentPart>,
    pending_batch: Option<Vec<ToolCall>>,
}

impl PartialState {
    fn history_message(&self) -> Option<(String, Message)> {
        let first_id = self.tool_parts.iter().find_map(|part| match part {
            ContentPart::ToolUse { id, .. } => Some(id.clone()),
            _ => None,
        })?;
        Some((
            first_id,
            Message::Assistant {
                content: MessageContent::Blocks(self.tool_parts.clone()),
            },
        ))
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<TurnEvent>, PartialState), Error>;

pin_project! {
    /// A single framed-protocol turn, either streamed line by line or
    /// replayed from a complete non-streaming response.
    pub struct BedrockTurn {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Message)>,
    }
}

impl Debug for BedrockTurn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockTurn").finish_non_exhaustive()
    }
}

impl BedrockTurn {
    #[inline]
    pub(crate) fn from_lines(lines: Lines) -> Self {
        Self::with_state(PartialState {
            source: Source::Stream(lines),
            content: Default::default(),
            accumulator: Default::default(),
            tool_parts: Default::default(),
            pending_batch: Default::default(),
        })
    }

    /// Builds a turn from a complete non-streaming response body.
    ///
    /// Each `text` block becomes a text event; each `tool_use` block
    /// becomes a singleton batch since its arguments arrive whole. A
    /// body that fails to parse is surfaced verbatim as text.
    pub(crate) fn from_invoke_body(body: &str) -> Self {
        let mut events = VecDeque::new();
        let mut tool_parts = Vec::new();

        match serde_json::from_str::<InvokeResponse>(body) {
            Ok(resp) => {
                for block in resp.content {
                    match block {
                        InvokeBlock::Text { text } => {
                            events.push_back(TurnEvent::Text(text));
                        }
                        InvokeBlock::ToolUse { id, name, input } => {
                            let arguments = if input.is_null() {
                                "{}".to_owned()
                            } else {
                                input.to_string()
                            };
                            tool_parts.push(ContentPart::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: if input.is_null() {
                                    Value::Object(Map::new())
                                } else {
                                    input
                                },
                            });
                            events.push_back(TurnEvent::ToolCalls(vec![
                                ToolCall {
                                    id,
                                    name,
                                    arguments,
                                },
                            ]));
                        }
                    }
                }
            }
            Err(err) => {
                warn!("failed to parse invoke response: {err}");
                events.push_back(TurnEvent::Text(body.to_owned()));
            }
        }

        Self::with_state(PartialState {
            source: Source::Buffered(events),
            content: Default::default(),
            accumulator: Default::default(),
            tool_parts,
            pending_batch: Default::default(),
        })
    }

    fn with_state(state: PartialState) -> Self {
        let full_msg = state.history_message();
        let next_event_fut = async move { next_event(state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            full_msg,
        }
    }
}

impl TurnStream for BedrockTurn {
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

        // For the streaming mode the assistant message becomes known at
        // `message_stop`, which is also the moment the batch is queued;
        // record it before the batch event is surfaced.
        if matches!(partial_state.source, Source::Done)
            && this.full_msg.is_none()
        {
            *this.full_msg = partial_state.history_message();
        }

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
    match &mut partial_state.source {
        Source::Stream(lines) => {
            let mut stopped = false;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        return Err(Error::new(
                            format!("{err:?}"),
                            ErrorKind::Transport,
                        ));
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(event) = decode_frame(&line) else {
                    continue;
                };
                trace!("got stream event: {event:?}");

                match event {
                    StreamEvent::MessageStart
                    | StreamEvent::MessageDelta => {}
                    StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::ToolUse { id, name },
                    } => {
                        partial_state.accumulator.register(
                            index,
                            Some(&id),
                            Some(&name),
                        );
                    }
                    StreamEvent::ContentBlockStart { .. } => {}
                    StreamEvent::ContentBlockDelta {
                        index,
                        delta: BlockDelta::InputJsonDelta { partial_json },
                    } => {
                        partial_state
                            .accumulator
                            .append_arguments(index, &partial_json);
                    }
                    StreamEvent::ContentBlockDelta {
                        delta: BlockDelta::TextDelta { text },
                        ..
                    } => {
                        if !text.is_empty() {
                            partial_state.content.push_str(&text);
                            return Ok((
                                Some(TurnEvent::Text(text)),
                                partial_state,
                            ));
                        }
                    }
                    StreamEvent::ContentBlockStop { index } => {
                        trace!("content block {index} stopped");
                    }
                    StreamEvent::MessageStop => {
                        stopped = true;
                        break;
                    }
                }
            }

            if stopped {
                // Streamed argument JSON may be truncated; repair the
                // braces before finalizing.
                let mut accumulator =
                    mem::take(&mut partial_state.accumulator);
                accumulator.repair_truncated_arguments();
                let calls = accumulator.finalize();
                if !calls.is_empty() {
                    partial_state.tool_parts =
                        calls.iter().map(tool_use_part).collect();
                    partial_state.pending_batch = Some(calls);
                }
            }
            partial_state.source = Source::Done;
        }
        Source::Buffered(events) => {
            if let Some(event) = events.pop_front() {
                return Ok((Some(event), partial_state));
            }
            partial_state.source = Source::Done;
        }
        Source::Done => {}
    }

    if let Some(batch) = partial_state.pending_batch.take() {
        return Ok((Some(TurnEvent::ToolCalls(batch)), partial_state));
    }

    Ok((None, partial_state))
}

/// Decodes one newline-delimited frame into an inner stream event.
///
/// Frames usually wrap the event as base64 in `chunk.bytes`; bare event
/// lines are accepted as well. Any malformed line is skipped, it never
/// terminates the stream.
fn decode_frame(line: &str) -> Option<StreamEvent> {
    let frame = match serde_json::from_str::<StreamFrame>(line) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("skipping malformed frame: {err}");
            return None;
        }
    };

    let parsed = match frame.chunk {
        Some(payload) => {
            let bytes = match STANDARD.decode(&payload.bytes) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("skipping frame with invalid base64: {err}");
                    return None;
                }
            };
            serde_json::from_slice::<StreamEvent>(&bytes)
        }
        None => serde_json::from_str::<StreamEvent>(line),
    };

    match parsed {
        Ok(event) => Some(event),
        Err(err) => {
            warn!("skipping unrecognized event: {err}");
            None
        }
    }
}

fn tool_use_part(call: &ToolCall) -> ContentPart {
    ContentPart::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: serde_json::from_str(&call.arguments)
            .unwrap_or_else(|_| Value::Object(Map::new())),
    }
}
