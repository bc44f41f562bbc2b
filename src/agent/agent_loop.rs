//! Agent loop for tool-based investigation planning.
//!
//! The model is asked the user's question with the graph tools available.
//! Every tool call is executed and answered with a `tool` message; the loop
//! ends on the first assistant message without tool calls.

use super::model::{ChatMessage, ChatModel};
use super::tools::{get_tool_definitions, parse_arguments, ToolExecutor};
use crate::config::LlmConfig;
use crate::error::AgentError;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Assistant turns before the loop gives up.
    pub max_steps: usize,
    /// Characters of each serialized tool result sent back to the model.
    pub tool_result_limit: usize,
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for AgentConfig {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            base_url: llm.base_url.clone(),
            model_name: llm.model.clone(),
            api_key: llm.api_key.clone(),
            temperature: llm.temperature,
            max_steps: llm.max_steps,
            tool_result_limit: llm.tool_result_limit,
            timeout_seconds: llm.timeout_seconds,
        }
    }
}

/// The planning agent.
pub struct GraphAgent {
    config: AgentConfig,
    model: Arc<dyn ChatModel>,
    tool_executor: ToolExecutor,
}

impl GraphAgent {
    pub fn new(config: AgentConfig, model: Arc<dyn ChatModel>, tool_executor: ToolExecutor) -> Self {
        info!("Initializing agent with model {}", config.model_name);
        Self {
            config,
            model,
            tool_executor,
        }
    }

    /// Answer `prompt`, returning the model's final text.
    pub async fn ask(&self, prompt: &str) -> Result<String, AgentError> {
        let tools = get_tool_definitions();
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];

        for step in 0..self.config.max_steps {
            debug!("Agent step {}", step + 1);

            let reply = self.model.complete(&messages, &tools).await?;
            if !reply.has_tool_calls() {
                info!("Agent answered after {} steps", step + 1);
                return Ok(reply.content.unwrap_or_default());
            }

            let calls = reply.tool_calls.clone().unwrap_or_default();
            messages.push(ChatMessage {
                content: Some(reply.content.unwrap_or_default()),
                ..reply
            });

            for call in &calls {
                let args = parse_arguments(&call.function.arguments);
                let result = self.tool_executor.execute(&call.function.name, &args).await?;
                let content = truncate_chars(&result.to_string(), self.config.tool_result_limit);
                messages.push(ChatMessage::tool(call, content));
            }
        }

        Err(AgentError::StepBudgetExceeded(self.config.max_steps))
    }
}

/// First `limit` characters of `text`.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// System prompt for tool-calling mode
const SYSTEM_PROMPT: &str = r#"You plan investigations over a graph of companies, investments and investors.

Use graph_query lookups (size <= 50) for single-index questions and joins when the key pair is clear:
on=["companies","id"] links investments to companies, on=["investors","id"] links investments to investors.
For multi-step questions (co-investment, geography, timing, filtered investments) call call_specialist
with the matching task.

Finish with a clear summary: number of results, the salient items, and ways to refine the question."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::model::{ToolCallFunction, ToolCallMessage};
    use crate::agent::tools::ToolDefinition;
    use crate::backend::fake::{hits, DownBackend, FakeBackend};
    use crate::backend::{Catalog, SearchBackend};
    use crate::tasks::Coordinator;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned replies and records every request it receives.
    struct ScriptedModel {
        replies: Mutex<Vec<ChatMessage>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<ChatMessage>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ChatMessage, AgentError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AgentError::Llm("script exhausted".to_string()))
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ToolCallMessage {
                id: id.to_string(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
            ..ChatMessage::default()
        }
    }

    fn answer(text: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            content: Some(text.to_string()),
            ..ChatMessage::default()
        }
    }

    fn agent(model: Arc<ScriptedModel>, backend: Arc<dyn SearchBackend>, config: AgentConfig) -> GraphAgent {
        let coordinator = Coordinator::with_default_handlers(backend.clone(), Catalog::default());
        GraphAgent::new(config, model, ToolExecutor::new(backend, coordinator))
    }

    #[tokio::test]
    async fn test_tool_results_are_answered_by_call_id() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call("call_1", "call_specialist", r#"{"task": "lookup_company", "params": {"label": "Acme"}}"#),
            answer("Acme is the only match."),
        ]));
        let backend = Arc::new(FakeBackend::new().respond(|_, _| Some(hits(&[json!({ "id": "c1" })]))));

        let text = agent(model.clone(), backend, AgentConfig::default())
            .ask("find Acme")
            .await
            .unwrap();
        assert_eq!(text, "Acme is the only match.");

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second[0].role, "system");
        assert_eq!(second[2].role, "assistant");
        assert_eq!(second[2].content.as_deref(), Some(""));
        assert_eq!(second[3].role, "tool");
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_1"));

        let result: serde_json::Value =
            serde_json::from_str(second[3].content.as_deref().unwrap()).unwrap();
        assert_eq!(result["summary"], "1 results (top 1) in company.");
    }

    #[tokio::test]
    async fn test_malformed_arguments_read_as_empty() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call("call_1", "graph_mapping", "{index: company"),
            answer("done"),
        ]));
        agent(model.clone(), Arc::new(FakeBackend::new()), AgentConfig::default())
            .ask("mapping?")
            .await
            .unwrap();

        let tool_message = &model.requests()[1][3];
        assert_eq!(tool_message.content.as_deref(), Some(r#"{"error":"index is required"}"#));
    }

    #[tokio::test]
    async fn test_step_budget() {
        let replies = (0..3)
            .map(|i| tool_call(&format!("call_{}", i), "graph_indices", "{}"))
            .collect();
        let model = Arc::new(ScriptedModel::new(replies));
        let config = AgentConfig {
            max_steps: 3,
            ..AgentConfig::default()
        };

        let err = agent(model.clone(), Arc::new(FakeBackend::new()), config)
            .ask("loop forever")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::StepBudgetExceeded(3)));
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_results_are_truncated() {
        let big: Vec<serde_json::Value> = (0..500).map(|i| json!({ "id": format!("c{}", i) })).collect();
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call("call_1", "graph_indices", ""),
            answer("many"),
        ]));
        let backend = Arc::new(FakeBackend::new().respond(move |_, _| Some(json!(big.clone()))));
        let config = AgentConfig {
            tool_result_limit: 100,
            ..AgentConfig::default()
        };

        agent(model.clone(), backend, config).ask("indices").await.unwrap();
        let content = model.requests()[1][3].content.clone().unwrap();
        assert_eq!(content.chars().count(), 100);
    }

    #[tokio::test]
    async fn test_backend_failure_aborts() {
        let model = Arc::new(ScriptedModel::new(vec![tool_call("call_1", "graph_indices", "{}")]));
        let err = agent(model, Arc::new(DownBackend), AgentConfig::default())
            .ask("indices")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.model_name, "gpt-4o-mini");
        assert_eq!(config.max_steps, 8);
        assert_eq!(config.temperature, 0.2);
    }
}
