use serde::{Deserialize, Serialize};
use serde_json::Value;
use turnstile_model::{ModelMessage, ModelRequest, ModelTool};

use crate::BedrockConfig;

// ------------------------------
// Types received from the server
// ------------------------------

/// One newline-delimited frame of the streaming response. The inner
/// event is base64-encoded in `chunk.bytes`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct StreamFrame {
    pub chunk: Option<FramePayload>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct FramePayload {
    pub bytes: String,
}

/// A decoded inner event of the streaming response.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta,
    MessageStop,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text,
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

/// The non-streaming response shape: one complete message with a list
/// of content blocks.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InvokeResponse {
    #[serde(default)]
    pub content: Vec<InvokeBlock>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvokeBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

/// A history message in this provider's wire shape. Tool results go
/// back as user messages carrying a `tool_result` block; the
/// assistant's own tool-call turn carries `tool_use` blocks.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: MessageContent },
    User { content: MessageContent },
    Assistant { content: MessageContent },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentPart>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessagesRequest {
    anthropic_version: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &BedrockConfig,
) -> MessagesRequest {
    MessagesRequest {
        anthropic_version: config.anthropic_version.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        tools: req.tools.iter().map(create_tool).collect(),
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: MessageContent::Text(content.clone()),
        },
        ModelMessage::User(content) => Message::User {
            content: MessageContent::Text(content.clone()),
        },
        ModelMessage::Assistant(content) => Message::Assistant {
            content: MessageContent::Text(content.clone()),
        },
        ModelMessage::ToolResult(result) => Message::User {
            content: MessageContent::Blocks(vec![ContentPart::ToolResult {
                tool_use_id: result.id.clone(),
                content: result.content.clone(),
            }]),
        },
        ModelMessage::Raw(raw) => {
            // Raw messages from this provider always have `Message` type.
            let Some(msg) = raw.downcast_ref::<Message>() else {
                return Message::Assistant {
                    content: MessageContent::Text(String::new()),
                };
            };
            msg.clone()
        }
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use turnstile_model::ToolCallResult;

    use super::*;
    use crate::BedrockConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("Be terse.".to_owned()),
                ModelMessage::User("Hello".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "fetch".to_owned(),
                description: "Fetches a URL.".to_owned(),
                input_schema: json!({ "type": "object" }),
            }],
        };
        let config = BedrockConfigBuilder::with_api_key("xxx")
            .with_stream_url("https://bedrock.example/stream")
            .build();
        let serialized =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            serialized,
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "messages": [
                    { "role": "system", "content": "Be terse." },
                    { "role": "user", "content": "Hello" },
                ],
                "max_tokens": 1024,
                "temperature": 0.9,
                "tools": [{
                    "name": "fetch",
                    "description": "Fetches a URL.",
                    "input_schema": { "type": "object" }
                }]
            })
        );
    }

    #[test]
    fn test_tool_result_becomes_user_block() {
        let msg = create_message(&ModelMessage::ToolResult(ToolCallResult {
            id: "toolu_1".to_owned(),
            content: "42".to_owned(),
        }));
        let serialized = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            serialized,
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": "42"
                }]
            })
        );
    }

    #[test]
    fn test_decode_stream_events() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":1,
                "content_block":{"type":"tool_use","id":"toolu_1","name":"get","input":{}}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlock::ToolUse {
                    id: "toolu_1".to_owned(),
                    name: "get".to_owned(),
                },
            }
        );

        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,
                "delta":{"type":"input_json_delta","partial_json":"{\"x\":"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{\"x\":".to_owned(),
                },
            }
        );

        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"message_stop","amazon-bedrock-invocationMetrics":{}}"#,
        )
        .unwrap();
        assert_eq!(event, StreamEvent::MessageStop);
    }
}
