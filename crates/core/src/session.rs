use std::future::poll_fn;
use std::pin::pin;

use turnstile_model::{
    ModelMessage, ModelProvider, ModelRequest, ModelTool, ToolCall,
    ToolCallResult, TurnEvent, TurnStream,
};

/// What one model turn produced, after the stream has been fully
/// drained.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The concatenated assistant text of this turn.
    pub text: String,
    /// Tool calls requested by the model, in batch order.
    pub tool_calls: Vec<ToolCall>,
}

impl TurnOutcome {
    #[inline]
    fn empty() -> Self {
        Default::default()
    }
}

/// Builder for [`ChatSession`].
pub struct ChatSessionBuilder<P> {
    provider: P,
    system_prompt: Option<String>,
    context: Option<String>,
    tools: Vec<ModelTool>,
}

impl<P: ModelProvider> ChatSessionBuilder<P> {
    /// Sets the system instructions for this session.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets a context message that seeds the conversation right after
    /// the system instructions.
    #[inline]
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Declares the tools that the model may call during this session.
    #[inline]
    pub fn with_tools(mut self, tools: Vec<ModelTool>) -> Self {
        self.tools = tools;
        self
    }

    /// Builds the session. The seed messages enter the history in the
    /// fixed order system-then-context.
    pub fn build(self) -> ChatSession<P> {
        let mut history = Vec::new();
        if let Some(system_prompt) = self.system_prompt {
            history.push(ModelMessage::System(system_prompt));
        }
        if let Some(context) = self.context {
            history.push(ModelMessage::User(context));
        }
        ChatSession {
            provider: self.provider,
            tools: self.tools,
            history,
        }
    }
}

/// A conversation with one model provider.
///
/// The session owns the history; the provider stays stateless. Provider
/// failures never escape a turn, they degrade to an empty
/// [`TurnOutcome`] so the caller can wind down gracefully.
pub struct ChatSession<P: ModelProvider> {
    provider: P,
    tools: Vec<ModelTool>,
    history: Vec<ModelMessage>,
}

impl<P: ModelProvider> ChatSession<P> {
    /// Starts building a session over the given provider.
    #[inline]
    pub fn builder(provider: P) -> ChatSessionBuilder<P> {
        ChatSessionBuilder {
            provider,
            system_prompt: None,
            context: None,
            tools: Vec::new(),
        }
    }

    /// Runs one model turn.
    ///
    /// When `prompt` is given, it is appended to the history as a user
    /// message first. The full history and the tool declarations are
    /// then sent to the provider, and the resulting event stream is
    /// driven to completion; each text fragment is forwarded through
    /// `on_text` as it arrives.
    ///
    /// Once the stream completes, the provider-shaped assistant message
    /// is appended to the history. Tool results must only be appended
    /// after this method returns, which keeps the assistant message
    /// ordered before its results.
    pub async fn chat(
        &mut self,
        prompt: Option<&str>,
        mut on_text: impl FnMut(&str),
    ) -> TurnOutcome {
        if let Some(prompt) = prompt {
            self.history.push(ModelMessage::User(prompt.to_owned()));
        }

        let req = ModelRequest {
            messages: self.history.clone(),
            tools: self.tools.clone(),
        };
        let turn = match self.provider.send_turn(&req).await {
            Ok(turn) => turn,
            Err(err) => {
                error!("model turn failed: {err:?}");
                return TurnOutcome::empty();
            }
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut turn = pin!(turn);
        loop {
            let event =
                match poll_fn(|cx| turn.as_mut().poll_next_event(cx)).await {
                    Ok(event) => event,
                    Err(err) => {
                        error!("model turn failed mid-stream: {err:?}");
                        return TurnOutcome::empty();
                    }
                };
            let Some(event) = event else {
                break;
            };
            trace!("got an event: {event:?}");

            match event {
                TurnEvent::Text(fragment) => {
                    on_text(&fragment);
                    text.push_str(&fragment);
                }
                TurnEvent::ToolCalls(calls) => {
                    tool_calls.extend(calls);
                }
            }
        }

        match turn.history_message() {
            Some(raw) => self.history.push(ModelMessage::Raw(raw)),
            // Providers without an own history shape fall back to a
            // plain text entry.
            None => self.history.push(ModelMessage::Assistant(text.clone())),
        }

        TurnOutcome { text, tool_calls }
    }

    /// Appends the result of a tool call to the history.
    #[inline]
    pub fn append_tool_result(
        &mut self,
        id: impl Into<String>,
        output: impl Into<String>,
    ) {
        self.history.push(ModelMessage::ToolResult(ToolCallResult {
            id: id.into(),
            content: output.into(),
        }));
    }

    /// Appends an arbitrary message to the history.
    #[inline]
    pub fn append_message(&mut self, msg: ModelMessage) {
        self.history.push(msg);
    }

    /// Returns the conversation history.
    #[inline]
    pub fn history(&self) -> &[ModelMessage] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use turnstile_test_model::{PresetEvent, PresetTurn, TestModelProvider};

    use super::*;

    #[tokio::test]
    async fn test_seed_order() {
        let provider = TestModelProvider::default();
        let session = ChatSession::builder(provider)
            .with_context("The working directory is /tmp.")
            .with_system_prompt("You are a helpful assistant.")
            .build();

        // Regardless of the builder call order, the system message
        // comes first.
        assert_eq!(
            session.history(),
            &[
                ModelMessage::System(
                    "You are a helpful assistant.".to_owned()
                ),
                ModelMessage::User(
                    "The working directory is /tmp.".to_owned()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_appends_history_message() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_turn_step(PresetTurn::with_events([
            PresetEvent::Text("Hello, ".to_owned()),
            PresetEvent::Text("world!".to_owned()),
        ]));
        let mut session = ChatSession::builder(provider).build();

        let mut streamed = String::new();
        let outcome = session
            .chat(Some("Hi"), |fragment| streamed.push_str(fragment))
            .await;
        assert_eq!(outcome.text, "Hello, world!");
        assert_eq!(streamed, "Hello, world!");
        assert!(outcome.tool_calls.is_empty());

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert!(matches!(&history[1], ModelMessage::Raw(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_empty_outcome() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_turn_step(
            PresetTurn::with_events([PresetEvent::Text("Hi!".to_owned())])
                .with_failures(0),
        );
        let mut session = ChatSession::builder(provider).build();

        let outcome = session.chat(Some("Hi"), |_| {}).await;
        assert_eq!(outcome, TurnOutcome::default());
        // The failed turn leaves no assistant entry behind.
        assert_eq!(session.history().len(), 1);
    }
}
