//! Tool definitions for the planning agent.
//!
//! This module defines the tools the LLM can use: raw graph operations and
//! delegation of whole tasks to the coordinator.

use crate::backend::{self, SearchBackend};
use crate::error::BackendError;
use crate::tasks::{Coordinator, TaskKind};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Tool definition for the chat-completions tool-calling API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn function(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

/// Decode tool-call arguments. Anything but a JSON object reads as `{}`.
pub fn parse_arguments(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({}),
    }
}

/// Runs tool calls against the backend and the task coordinator.
pub struct ToolExecutor {
    backend: Arc<dyn SearchBackend>,
    coordinator: Coordinator,
}

impl ToolExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>, coordinator: Coordinator) -> Self {
        Self {
            backend,
            coordinator,
        }
    }

    /// Execute a tool call.
    ///
    /// Bad arguments are answered with an `error` object for the model to
    /// read; backend failures abort.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<Value, BackendError> {
        debug!("Executing tool: {} with args: {}", name, args);

        let result = match name {
            "graph_indices" => backend::list_indices(self.backend.as_ref()).await?,
            "graph_mapping" => match args.get("index").and_then(Value::as_str) {
                Some(index) if !index.is_empty() => {
                    backend::mapping(self.backend.as_ref(), index).await?
                }
                _ => json!({ "error": "index is required" }),
            },
            "graph_query" => self.graph_query(args).await?,
            "call_specialist" => self.call_specialist(args).await?,
            _ => json!({ "error": format!("unknown tool {}", name) }),
        };

        info!("Tool {} executed", name);
        Ok(result)
    }

    async fn graph_query(&self, args: &Value) -> Result<Value, BackendError> {
        let task = match args.get("op").and_then(Value::as_str) {
            Some("lookup") => TaskKind::GraphLookup,
            Some("join") => TaskKind::GraphJoin,
            other => {
                return Ok(json!({
                    "error": format!("unsupported op {}", other.unwrap_or("<missing>"))
                }))
            }
        };
        let envelope = self.coordinator.dispatch(task.name(), args).await?;
        Ok(envelope.to_value())
    }

    async fn call_specialist(&self, args: &Value) -> Result<Value, BackendError> {
        let Some(task) = args.get("task").and_then(Value::as_str) else {
            return Ok(json!({ "error": "task is required" }));
        };
        let params = args.get("params").cloned().unwrap_or_else(|| json!({}));
        let envelope = self.coordinator.dispatch(task, &params).await?;
        Ok(envelope.to_value())
    }
}

/// Get all tool definitions.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    let task_names: Vec<&str> = TaskKind::ALL.iter().map(TaskKind::name).collect();

    vec![
        function(
            "graph_indices",
            "List the indices of the search backend.",
            json!({ "type": "object", "properties": {} }),
        ),
        function(
            "graph_mapping",
            "Field mapping of one index.",
            json!({
                "type": "object",
                "properties": {
                    "index": { "type": "string", "description": "Index name" }
                },
                "required": ["index"]
            }),
        ),
        function(
            "graph_query",
            "Lookup on one index, or a federated join from a parent index to a child index. \
             A join with no hits falls back to a lookup on the parent index.",
            json!({
                "type": "object",
                "properties": {
                    "op": { "type": "string", "enum": ["lookup", "join"] },
                    "parent_index": { "type": "string" },
                    "child_index": { "type": "string" },
                    "on": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "[child_key, parent_key], e.g. [\"companies\", \"id\"]"
                    },
                    "es_query": { "type": "object", "description": "Query DSL (default match_all)" },
                    "size": { "type": "integer", "description": "At most 50 is usually enough" }
                },
                "required": ["op", "parent_index", "es_query"]
            }),
        ),
        function(
            "call_specialist",
            "Delegate a multi-step investigative task (co-investment, geographic or \
             temporal proximity, filtered investments, ...).",
            json!({
                "type": "object",
                "properties": {
                    "task": { "type": "string", "enum": task_names },
                    "params": {
                        "type": "object",
                        "description": "Task parameters such as company_label, company_id_a, \
                                        min_amount, currency_code, lat, lon, window_days"
                    }
                },
                "required": ["task"]
            }),
        ),
    ]
}
