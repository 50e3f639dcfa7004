use serde::{Deserialize, Serialize};
use turnstile_model::ToolCall;

/// The events in a preset turn.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "tool_calls")]
    ToolCalls(Vec<ToolCall>),
}

/// The preset turn for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetTurn {
    /// Events in this turn.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failures` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
}

impl PresetTurn {
    /// Creates a `PresetTurn` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// Sets failure times before a successful turn. `0` means the turn
    /// will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let turn = PresetTurn::with_events([
            PresetEvent::Text("I have left a message for you.".to_string()),
            PresetEvent::ToolCalls(vec![ToolCall {
                id: "1".to_string(),
                name: "write_file".to_string(),
                arguments: "{\"filename\":\"message.txt\"}".to_string(),
            }]),
        ]);

        let serialized = serde_json::to_string(&turn).unwrap();
        let deserialized: PresetTurn =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(turn, deserialized);
    }
}
