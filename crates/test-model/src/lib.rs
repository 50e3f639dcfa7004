//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use turnstile_model::{
    ErrorKind, ModelProvider, ModelRequest, ProviderError, RawMessage,
    TurnEvent, TurnStream,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    #[allow(dead_code)]
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelTurn {
    provider: TestModelProvider,
    request: ModelRequest,
    event_idx: usize,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TurnStream for TestModelTurn {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<TurnEvent>, Self::Error>> {
        let step_idx = self.request.messages.len();
        if step_idx >= self.provider.conversation_script.len() {
            return Poll::Ready(Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            }));
        }

        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        let step = &this.provider.conversation_script[step_idx];
        let preset_events = match step {
            ConversationStep::UserInput => {
                return Poll::Ready(Err(Error {
                    message: "not an assistant turn step",
                    kind: ErrorKind::Other,
                }));
            }
            ConversationStep::AssistantTurn(turn) => &turn.events,
        };

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            if this.event_idx < preset_events.len() {
                let event = match &preset_events[this.event_idx] {
                    PresetEvent::Text(text) => TurnEvent::Text(text.clone()),
                    PresetEvent::ToolCalls(calls) => {
                        TurnEvent::ToolCalls(calls.clone())
                    }
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(event)));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(
            this.provider.delay.unwrap_or(Duration::from_millis(1)),
        )));
        Pin::new(this).poll_next_event(cx)
    }

    fn history_message(&self) -> Option<RawMessage> {
        let step_idx = self.request.messages.len();
        let id = format!("msg:{step_idx}");
        Some(RawMessage::new(id.clone(), id))
    }
}

#[derive(Clone)]
enum ConversationStep {
    UserInput,
    AssistantTurn(PresetTurn),
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script,
/// which is how the model should respond to a request. The added steps
/// will be selected according to the history messages in your request.
/// If there are no enough steps in the script, an error will be
/// returned.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    attempts: Arc<Mutex<HashMap<usize, u64>>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_turn_step(&mut self, preset: PresetTurn) {
        self.conversation_script
            .push(ConversationStep::AssistantTurn(preset));
    }

    #[inline]
    pub fn add_user_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::UserInput);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    fn should_fail(&self, step_idx: usize) -> bool {
        let Some(ConversationStep::AssistantTurn(turn)) =
            self.conversation_script.get(step_idx)
        else {
            return false;
        };
        let Some(failures) = turn.failures else {
            return false;
        };
        if failures == 0 {
            return true;
        }
        let mut attempts = self.attempts.lock().unwrap();
        let attempted = attempts.entry(step_idx).or_insert(0);
        if *attempted < failures {
            *attempted += 1;
            return true;
        }
        false
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Turn = TestModelTurn;

    fn send_turn(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Turn, Self::Error>> + Send + 'static
    {
        if self.should_fail(req.messages.len()) {
            return ready(Err(Error {
                message: "preset failure",
                kind: ErrorKind::Transport,
            }));
        }

        let turn = TestModelTurn {
            provider: self.clone(),
            request: req.clone(),
            event_idx: 0,
            sleep: None,
        };
        ready(Ok(turn))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use turnstile_model::{ModelMessage, ModelTool, ToolCall};

    use super::*;

    async fn collect_turn(
        turn: TestModelTurn,
    ) -> (String, Option<Vec<ToolCall>>, RawMessage) {
        let mut turn = pin!(turn);
        let mut text = String::new();
        let mut tool_calls = None;
        loop {
            let Some(event) = poll_fn(|cx| turn.as_mut().poll_next_event(cx))
                .await
                .unwrap()
            else {
                break;
            };
            match event {
                TurnEvent::Text(fragment) => text.push_str(&fragment),
                TurnEvent::ToolCalls(calls) => tool_calls = Some(calls),
            }
        }
        let history = turn.history_message().unwrap();
        (text, tool_calls, history)
    }

    #[tokio::test]
    async fn test_send_turn() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_turn_step(PresetTurn::with_events([
            PresetEvent::Text("Hello, ".to_owned()),
            PresetEvent::Text("world!".to_owned()),
        ]));
        provider.add_user_input_step();
        provider.add_assistant_turn_step(PresetTurn::with_events([
            PresetEvent::Text("Sure, ".to_owned()),
            PresetEvent::Text("let me take a ".to_owned()),
            PresetEvent::Text("look.".to_owned()),
            PresetEvent::ToolCalls(vec![ToolCall {
                id: "tool:1".to_owned(),
                name: "read_file".to_owned(),
                arguments: "{\"filename\":\"todo.txt\"}".to_owned(),
            }]),
        ]));

        let mut req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![ModelTool {
                name: "read_file".to_owned(),
                description: "Reads a file".to_owned(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "The name of the file to read"
                        }
                    }
                }),
            }],
        };
        let turn = provider.send_turn(&req).await.unwrap();
        let (text, _, history) = collect_turn(turn).await;
        assert_eq!(text, "Hello, world!");

        req.messages.push(ModelMessage::Raw(history));
        req.messages
            .push(ModelMessage::User("Check my todo".to_owned()));
        let turn = provider.send_turn(&req).await.unwrap();
        let (text, tool_calls, _) = collect_turn(turn).await;
        assert_eq!(text, "Sure, let me take a look.");
        let tool_calls = tool_calls.unwrap();
        assert_eq!(tool_calls[0].name, "read_file");
        assert_eq!(tool_calls[0].arguments, "{\"filename\":\"todo.txt\"}");
    }

    #[tokio::test]
    async fn test_preset_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_turn_step(
            PresetTurn::with_events([PresetEvent::Text("Hi!".to_owned())])
                .with_failures(1),
        );

        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        };
        assert!(provider.send_turn(&req).await.is_err());
        let turn = provider.send_turn(&req).await.unwrap();
        let (text, _, _) = collect_turn(turn).await;
        assert_eq!(text, "Hi!");
    }
}
