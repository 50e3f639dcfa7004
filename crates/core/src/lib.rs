//! Core logic including the chat session, the agent loop and tool
//! dispatch.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod session;
pub mod tool;

pub use agent::AgentLoop;
pub use session::{ChatSession, ChatSessionBuilder, TurnOutcome};
pub use tool::ToolRegistry;
