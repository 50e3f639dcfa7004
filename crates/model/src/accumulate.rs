use std::collections::BTreeMap;

use crate::response::ToolCall;

/// Assembles fragmented tool-call data streamed by a provider.
///
/// Both wire protocols deliver tool calls in pieces keyed by a position
/// index: the id and name may arrive separately from the argument text,
/// and the argument text itself arrives as partial JSON fragments. The
/// accumulator merges those pieces per key and finalizes them in
/// deterministic order once the turn ends.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: BTreeMap<u32, Fragment>,
}

#[derive(Debug, Default)]
struct Fragment {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether no fragments have been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records id and name pieces for the fragment at `key`, creating
    /// the fragment on first sight.
    ///
    /// The id is assigned once and never overwritten; the name may be
    /// registered as `None` first and set by a later piece. Empty
    /// strings are treated as absent.
    pub fn register(&mut self, key: u32, id: Option<&str>, name: Option<&str>) {
        let fragment = self.entries.entry(key).or_default();
        if fragment.id.is_none() {
            if let Some(id) = id.filter(|id| !id.is_empty()) {
                fragment.id = Some(id.to_owned());
            }
        }
        if fragment.name.is_none() {
            if let Some(name) = name.filter(|name| !name.is_empty()) {
                fragment.name = Some(name.to_owned());
            }
        }
    }

    /// Appends partial argument text to the fragment at `key`.
    ///
    /// Fragments grow strictly in arrival order; there is no reordering
    /// within a key. An unseen key is registered implicitly.
    pub fn append_arguments(&mut self, key: u32, text: &str) {
        self.entries.entry(key).or_default().arguments.push_str(text);
    }

    /// Best-effort repair of truncated streamed JSON arguments.
    ///
    /// For every fragment whose trimmed argument text does not end with
    /// `}`, counts unmatched `{` against `}` and appends that many `}`
    /// characters. Arguments that are malformed beyond unbalanced
    /// braces (e.g. truncated inside a string literal) still fail to
    /// parse later; that residual failure is reported per tool call at
    /// dispatch time, not here.
    pub fn repair_truncated_arguments(&mut self) {
        for fragment in self.entries.values_mut() {
            let trimmed = fragment.arguments.trim_end();
            if trimmed.is_empty() || trimmed.ends_with('}') {
                continue;
            }
            let open = fragment.arguments.matches('{').count();
            let close = fragment.arguments.matches('}').count();
            if open > close {
                let missing = open - close;
                fragment.arguments.truncate(trimmed.len());
                for _ in 0..missing {
                    fragment.arguments.push('}');
                }
            }
        }
    }

    /// Finalizes the accumulated fragments into immutable tool calls.
    ///
    /// Entries are emitted in ascending position-key order regardless
    /// of arrival order. Entries whose name was never set are dropped.
    pub fn finalize(self) -> Vec<ToolCall> {
        self.entries
            .into_values()
            .filter_map(|fragment| {
                let name = fragment.name?;
                Some(ToolCall {
                    id: fragment.id.unwrap_or_default(),
                    name,
                    arguments: fragment.arguments,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_fragments() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), Some("get"));
        acc.register(1, Some("b"), Some("put"));
        acc.append_arguments(0, "{\"x\":");
        acc.append_arguments(1, "{\"y\":");
        acc.append_arguments(0, "1}");
        acc.append_arguments(1, "2}");

        let calls = acc.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, "{\"x\":1}");
        assert_eq!(calls[1].arguments, "{\"y\":2}");
    }

    #[test]
    fn test_chunked_delta_example() {
        // The worked example: id and name in the first delta, arguments
        // split across two deltas sharing index 0.
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), Some("get"));
        acc.append_arguments(0, "{\"x\":");
        acc.append_arguments(0, "1}");

        let calls = acc.finalize();
        assert_eq!(
            calls,
            vec![ToolCall {
                id: "a".to_owned(),
                name: "get".to_owned(),
                arguments: "{\"x\":1}".to_owned(),
            }]
        );
    }

    #[test]
    fn test_finalize_order_is_key_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(2, Some("c"), Some("third"));
        acc.register(0, Some("a"), Some("first"));
        acc.register(1, Some("b"), Some("second"));

        let names: Vec<_> =
            acc.finalize().into_iter().map(|call| call.name).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn test_id_assigned_once() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), None);
        acc.register(0, Some("z"), Some("get"));

        let calls = acc.finalize();
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].name, "get");
    }

    #[test]
    fn test_name_may_arrive_late() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), None);
        acc.append_arguments(0, "{}");
        acc.register(0, None, Some("late"));

        let calls = acc.finalize();
        assert_eq!(calls[0].name, "late");
    }

    #[test]
    fn test_nameless_entries_are_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), Some("get"));
        acc.register(1, Some("b"), None);
        acc.append_arguments(1, "{\"orphan\":true}");

        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get");
    }

    #[test]
    fn test_repair_appends_missing_braces() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), Some("get"));
        acc.append_arguments(0, "{\"x\":1");
        acc.register(1, Some("b"), Some("put"));
        acc.append_arguments(1, "{\"nested\":{\"y\":2");

        acc.repair_truncated_arguments();
        let calls = acc.finalize();
        assert_eq!(calls[0].arguments, "{\"x\":1}");
        assert_eq!(calls[1].arguments, "{\"nested\":{\"y\":2}}");
    }

    #[test]
    fn test_repair_keeps_balanced_arguments() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), Some("get"));
        acc.append_arguments(0, "{\"x\":1}");

        acc.repair_truncated_arguments();
        let calls = acc.finalize();
        assert_eq!(calls[0].arguments, "{\"x\":1}");
    }

    #[test]
    fn test_repair_ignores_empty_arguments() {
        let mut acc = ToolCallAccumulator::new();
        acc.register(0, Some("a"), Some("get"));

        acc.repair_truncated_arguments();
        let calls = acc.finalize();
        assert_eq!(calls[0].arguments, "");
    }
}
