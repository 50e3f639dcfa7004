//! Tool call supports.

mod error;
mod registry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use turnstile_model::ModelTool;

pub use error::{Error, ErrorKind};
pub use registry::Registry;

/// The result of a tool call.
pub type ToolResult = Result<Value, Error>;

/// The set of tools available to an agent.
///
/// This is the seam towards whatever actually hosts the tools; the
/// in-process [`Registry`] is one implementation, a remote transport
/// would be another. Execution failures are reported as [`Error`]
/// values and turned into tool-result messages by the agent loop, they
/// are never fatal.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Returns the declarations of all available tools.
    fn list_tools(&self) -> Vec<ModelTool>;

    /// Calls the tool with the given name and arguments.
    async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult;
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not
/// maintain any internal state.
///
/// The tool can be context-aware, meaning it can access additional
/// information about the current execution context, such as the working
/// directory or the current user. To do this, make the context an
/// immutable state of the tool, which can be set during initialization,
/// and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of
    /// `self`, and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
