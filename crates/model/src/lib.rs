//! The unified protocol between the agent and LLM providers.
//!
//! Providers speak structurally different wire protocols, and this crate
//! defines the single event model they all normalize into: a turn is a
//! lazy sequence of text fragments followed by at most one batch of
//! finalized tool calls. The crate also hosts the accumulation logic
//! that both streaming adapters share to assemble fragmented tool-call
//! data.
//!
//! Types here don't define any behavior of their own; they are the
//! constraints that provider implementations adhere to. Provider crates
//! live next to this one and depend only on it.

#![deny(missing_docs)]

mod accumulate;
mod error;
mod provider;
mod raw;
mod request;
mod response;

pub use accumulate::*;
pub use error::*;
pub use provider::*;
pub use raw::*;
pub use request::*;
pub use response::*;
