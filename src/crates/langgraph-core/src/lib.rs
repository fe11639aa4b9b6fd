//! langgraph-core - generic building blocks for graph-structured agent loops.
//!
//! This crate is the small, domain-free foundation the `orchestrator` crate
//! builds its Repair Orchestrator on: chat message types for assembling LM
//! prompts, and a shared `GraphError`. It does not itself know about nodes,
//! repair graphs, sandboxes, or CI — that lives in `orchestrator`, which
//! generalizes the "graph as data, not inheritance" idea (node handlers as
//! values in a dispatch map, keyed by a closed set of names) on top of these
//! primitives.

pub mod error;
pub mod messages;

pub use error::{GraphError, Result};
pub use messages::{add_messages, Message, MessageRole};
