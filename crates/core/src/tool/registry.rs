use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::Instrument;
use turnstile_model::ModelTool;

use super::{Error, Tool, ToolRegistry, ToolResult};

/// An in-process [`ToolRegistry`] over statically typed tools.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Arc<dyn ToolObject>>,
}

impl Registry {
    /// Adds a tool to the registry, replacing any previous tool with
    /// the same name.
    pub fn add_tool<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.tools.insert(name, Arc::new(AnyTool(tool)));
    }
}

#[async_trait]
impl ToolRegistry for Registry {
    fn list_tools(&self) -> Vec<ModelTool> {
        self.tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                input_schema: tool.parameter_schema().clone(),
            })
            .collect()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            warn!("tool not found: {name}");
            return Err(Error::not_found());
        };

        trace!("calling tool {name} with args: {arguments:?}");
        tool.execute(arguments)
            .instrument(debug_span!("tool execute"))
            .await
    }
}

trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

struct AnyTool<T: Tool>(T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    #[inline]
    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };
        Box::pin(self.0.execute(input))
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;
    use std::sync::LazyLock;

    use schemars::{JsonSchema, schema_for};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::tool::ErrorKind;

    #[derive(Deserialize, JsonSchema)]
    struct AddInput {
        a: i64,
        b: i64,
    }

    static ADD_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
        serde_json::to_value(schema_for!(AddInput)).unwrap()
    });

    struct AddTool;

    impl Tool for AddTool {
        type Input = AddInput;

        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Adds two integers"
        }

        fn parameter_schema(&self) -> &Value {
            &ADD_SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(json!(input.a + input.b)))
        }
    }

    #[tokio::test]
    async fn test_call_tool() {
        let mut registry = Registry::default();
        registry.add_tool(AddTool);

        let tools = registry.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");
        assert!(tools[0].input_schema.is_object());

        let result = registry
            .call_tool("add", json!({ "a": 1, "b": 2 }))
            .await
            .unwrap();
        assert_eq!(result, json!(3));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = Registry::default();
        let err = registry.call_tool("add", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let mut registry = Registry::default();
        registry.add_tool(AddTool);
        let err = registry
            .call_tool("add", json!({ "a": "one" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
