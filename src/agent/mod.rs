//! LLM agent modules for investigation planning.
//!
//! This module provides the tool-calling agent that turns a free-form
//! question into graph queries and task calls, and the local fallback.

pub mod agent_loop;
pub mod local;
pub mod model;
pub mod tools;

pub use agent_loop::{AgentConfig, GraphAgent};
pub use local::local_summary;
pub use model::{ChatModel, OpenAiChat};
pub use tools::ToolExecutor;
