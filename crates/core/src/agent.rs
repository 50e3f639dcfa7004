use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use turnstile_model::{ModelProvider, ToolCall};

use crate::session::{ChatSession, TurnOutcome};
use crate::tool::{self, ToolRegistry};

/// Result content for a call whose name is not in the registry.
const TOOL_NOT_FOUND: &str = "Tool not found";

/// Drives a conversation until the model stops requesting tools.
///
/// The loop alternates between model turns and tool dispatch: a turn
/// that requests tools has every call answered, in batch order, before
/// the continuation turn is issued; a turn without tool calls ends the
/// loop. Provider failures degrade to empty turns inside the session,
/// so they terminate the loop instead of spinning it.
pub struct AgentLoop<P: ModelProvider> {
    session: ChatSession<P>,
    registry: Box<dyn ToolRegistry>,
    turn_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    cancellation_token: CancellationToken,
}

impl<P: ModelProvider> AgentLoop<P> {
    /// Creates a new `AgentLoop` over a session and a tool registry.
    ///
    /// The session is expected to declare the registry's tools (see
    /// [`ToolRegistry::list_tools`]); the loop only answers calls, it
    /// does not advertise them.
    #[inline]
    pub fn new(session: ChatSession<P>, registry: Box<dyn ToolRegistry>) -> Self {
        Self {
            session,
            registry,
            turn_timeout: None,
            call_timeout: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Limits the duration of one model turn.
    #[inline]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// Limits the duration of one tool call.
    #[inline]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Ties the loop to the given cancellation token.
    #[inline]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Returns the underlying session.
    #[inline]
    pub fn session(&self) -> &ChatSession<P> {
        &self.session
    }

    /// Runs the loop for one user prompt and returns the accumulated
    /// answer text.
    ///
    /// Text fragments are forwarded through `on_text` as they stream
    /// in. Cancellation or a turn timeout ends the loop with the text
    /// accumulated so far.
    pub async fn run(
        &mut self,
        prompt: &str,
        mut on_text: impl FnMut(&str),
    ) -> String {
        let mut answer = String::new();
        let mut prompt = Some(prompt.to_owned());

        loop {
            let this_prompt = prompt.take();
            let Some(outcome) =
                self.next_turn(this_prompt.as_deref(), &mut on_text).await
            else {
                break;
            };
            answer.push_str(&outcome.text);

            if outcome.tool_calls.is_empty() {
                break;
            }

            let mut cancelled = false;
            for call in &outcome.tool_calls {
                let output = tokio::select! {
                    _ = self.cancellation_token.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    output = self.dispatch_call(call) => output,
                };
                self.session.append_tool_result(call.id.clone(), output);
            }
            if cancelled {
                info!("agent loop cancelled during tool dispatch");
                break;
            }
        }

        answer
    }

    async fn next_turn(
        &mut self,
        prompt: Option<&str>,
        on_text: &mut impl FnMut(&str),
    ) -> Option<TurnOutcome> {
        let turn_timeout = self.turn_timeout;
        let token = self.cancellation_token.clone();
        let chat_fut = async {
            let chat = self.session.chat(prompt, on_text);
            match turn_timeout {
                Some(dur) => tokio::time::timeout(dur, chat).await.ok(),
                None => Some(chat.await),
            }
        };

        tokio::select! {
            _ = token.cancelled() => {
                info!("model turn cancelled");
                None
            }
            outcome = chat_fut => {
                if outcome.is_none() {
                    warn!("model turn timed out");
                }
                outcome
            }
        }
    }

    /// Produces the result content for one tool call. This never
    /// fails; every kind of breakage becomes a result the model can
    /// read.
    async fn dispatch_call(&self, call: &ToolCall) -> String {
        let arguments = if call.arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) => {
                    warn!("tool call {} arguments are not an object", call.id);
                    return error_payload("arguments are not a JSON object");
                }
                Err(err) => {
                    warn!(
                        "failed to parse arguments of tool call {}: {err}",
                        call.id
                    );
                    return error_payload(&format!("invalid arguments: {err}"));
                }
            }
        };

        let result = match self.call_timeout {
            Some(dur) => {
                let call_fut = self.registry.call_tool(&call.name, arguments);
                match tokio::time::timeout(dur, call_fut).await {
                    Ok(result) => result,
                    Err(_) => Err(tool::Error::execution_error()
                        .with_reason("tool call timed out")),
                }
            }
            None => self.registry.call_tool(&call.name, arguments).await,
        };

        match result {
            Ok(Value::String(output)) => output,
            Ok(output) => output.to_string(),
            Err(err) if err.kind() == tool::ErrorKind::NotFound => {
                TOOL_NOT_FOUND.to_owned()
            }
            Err(err) => {
                warn!("tool call {} failed: {}", call.id, err.reason());
                error_payload(&err.reason())
            }
        }
    }
}

fn error_payload(reason: &str) -> String {
    serde_json::json!({ "error": reason }).to_string()
}
