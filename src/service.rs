use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{CallToolResult, Content, ErrorData, ServerCapabilities, ServerInfo},
    ServerHandler,
};
use rmcp_macros::{tool, tool_handler, tool_router};
use std::{future::Future, sync::Arc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::SequentialThinkingConfig;
use crate::models::{SequentialThinkingArguments, ThinkingPromptParams, ThoughtHistoryParams};
use crate::prompts::{PromptProvider, PromptStore, DEFAULT_PROMPT};
use crate::session::SessionFacade;

/// MCP server exposing one thinking session over a transport
#[derive(Clone)]
pub struct SequentialThinkingService {
    tool_router: ToolRouter<Self>,
    session: Arc<Mutex<SessionFacade>>,
    prompts: Arc<Mutex<PromptProvider>>,
    config: Arc<SequentialThinkingConfig>,
    started: Instant,
    instructions: String,
}

impl SequentialThinkingService {
    /// Create a new service instance with its own session
    pub fn new(config: SequentialThinkingConfig) -> Self {
        tracing::info!("Initializing {} service", config.server.name);

        let store = PromptStore::from_config(&config.prompts);
        let prompts = PromptProvider::new(store, &config.limits);
        let instructions = prompts.instructions();
        let session = SessionFacade::new(config.limits.clone());

        Self {
            tool_router: Self::tool_router(),
            session: Arc::new(Mutex::new(session)),
            prompts: Arc::new(Mutex::new(prompts)),
            config: Arc::new(config),
            started: Instant::now(),
            instructions,
        }
    }

    /// Advisory check of the session's wall-clock budget. The engine keeps
    /// accepting thoughts; the client is told it has run long.
    fn budget_warning(&self) -> Option<String> {
        let elapsed = self.started.elapsed();
        let budget = self.config.limits.timeout();
        if elapsed <= budget {
            return None;
        }
        tracing::warn!(
            "Session budget exceeded: {}ms elapsed of {}ms",
            elapsed.as_millis(),
            budget.as_millis()
        );
        Some(format!(
            "Session budget of {}ms exceeded ({}ms elapsed); consider concluding",
            budget.as_millis(),
            elapsed.as_millis()
        ))
    }
}

#[tool_router]
impl SequentialThinkingService {
    #[tool(description = "Record one step of a dynamic, reflective reasoning process. Each call submits a single thought with its position (thought_number) and the current estimate of total thoughts, which may change. Earlier thoughts can be revised (is_revision + revises_thought) and alternatives explored on branches (branch_from_thought + branch_id). Set next_thought_needed to false when done; set needs_more_thoughts to continue past a conclusion. Rejected thoughts return an error with a kind; correct and resubmit.")]
    pub async fn sequential_thinking(
        &self,
        params: Parameters<SequentialThinkingArguments>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let budget_warning = self.budget_warning();
        let arguments = serde_json::Value::Object(params.0 .0);
        let result = self.session.lock().await.submit_json(arguments);

        match result {
            Ok(mut response) => {
                response.warnings.extend(budget_warning);
                let content = Content::json(response)
                    .map_err(|e| ErrorData::internal_error(format!("Failed to create JSON content: {}", e), None))?;
                Ok(CallToolResult::success(vec![content]))
            }
            Err(rejection) => {
                let content = Content::json(rejection)
                    .map_err(|e| ErrorData::internal_error(format!("Failed to create JSON content: {}", e), None))?;
                Ok(CallToolResult::error(vec![content]))
            }
        }
    }

    #[tool(description = "Read the thinking session without changing it. view: current (latest thought), thought (latest thought with thought_number), branch (thoughts of branch_id), branches (known branch ids), all (full history in arrival order), status (session state and limits).")]
    pub async fn thought_history(
        &self,
        params: Parameters<ThoughtHistoryParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let result = self.session.lock().await.query(&params.0);

        match result {
            Ok(response) => {
                let content = Content::json(response)
                    .map_err(|e| ErrorData::internal_error(format!("Failed to create JSON content: {}", e), None))?;
                Ok(CallToolResult::success(vec![content]))
            }
            Err(rejection) => {
                tracing::warn!("thought_history rejected: {}", rejection);
                let content = Content::json(rejection)
                    .map_err(|e| ErrorData::internal_error(format!("Failed to create JSON content: {}", e), None))?;
                Ok(CallToolResult::error(vec![content]))
            }
        }
    }

    #[tool(description = "Get guidance text for the thinking protocol. name defaults to 'sequential-thinking'; use name='list' to see available prompts. Pass arguments to fill placeholders and persist=true to remember them (scope: global or prompt).")]
    pub async fn thinking_prompt(
        &self,
        params: Parameters<ThinkingPromptParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let params = params.0;
        let name = params.name.as_deref().unwrap_or(DEFAULT_PROMPT);
        let mut prompts = self.prompts.lock().await;

        if name == "list" {
            let content = Content::json(prompts.list())
                .map_err(|e| ErrorData::internal_error(format!("Failed to create JSON content: {}", e), None))?;
            return Ok(CallToolResult::success(vec![content]));
        }

        let arguments = params.arguments.unwrap_or_default();
        let persisted = if params.persist {
            Some(prompts.persist(name, params.scope, &arguments).map_err(|e| {
                tracing::error!("thinking_prompt error: {}", e);
                ErrorData::from(e)
            })?)
        } else {
            None
        };

        match prompts.render(name, &arguments) {
            Ok(mut response) => {
                response.persisted = persisted;
                let content = Content::json(response)
                    .map_err(|e| ErrorData::internal_error(format!("Failed to create JSON content: {}", e), None))?;
                Ok(CallToolResult::success(vec![content]))
            }
            Err(e) => {
                tracing::error!("thinking_prompt error: {}", e);
                Err(ErrorData::from(e))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for SequentialThinkingService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            server_info: rmcp::model::Implementation {
                name: self.config.server.name.clone(),
                version: self.config.server.version.clone(),
            },
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(self.instructions.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use serde_json::json;

    fn arguments(value: serde_json::Value) -> Parameters<SequentialThinkingArguments> {
        Parameters(serde_json::from_value(value).unwrap())
    }

    fn thought(text: &str, number: i32, total: i32, next: bool) -> Parameters<SequentialThinkingArguments> {
        arguments(json!({
            "thought": text,
            "thought_number": number,
            "total_thoughts": total,
            "next_thought_needed": next
        }))
    }

    fn rejection_kind(result: &CallToolResult) -> String {
        let content = serde_json::to_value(&result.content[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        value["kind"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_accepted_and_rejected_calls() {
        let service = SequentialThinkingService::new(SequentialThinkingConfig::default());

        let accepted = service.sequential_thinking(thought("Plan", 1, 3, true)).await.unwrap();
        assert_eq!(accepted.is_error, Some(false));

        let rejected = service.sequential_thinking(thought("Bad", 0, 3, true)).await.unwrap();
        assert_eq!(rejected.is_error, Some(true));

        let session = service.session.lock().await;
        assert_eq!(session.engine().len(), 1);
    }

    #[tokio::test]
    async fn test_wrongly_typed_arguments_are_malformed() {
        let service = SequentialThinkingService::new(SequentialThinkingConfig::default());

        let word_for_number = service
            .sequential_thinking(arguments(json!({
                "thought": "x",
                "thought_number": "one",
                "total_thoughts": 1,
                "next_thought_needed": true
            })))
            .await
            .unwrap();
        assert_eq!(word_for_number.is_error, Some(true));
        assert_eq!(rejection_kind(&word_for_number), "MalformedRequest");

        let out_of_range = service
            .sequential_thinking(arguments(json!({
                "thought": "x",
                "thought_number": 1,
                "total_thoughts": 10_000_000_000_i64,
                "next_thought_needed": true
            })))
            .await
            .unwrap();
        assert_eq!(rejection_kind(&out_of_range), "MalformedRequest");

        let missing = service.sequential_thinking(arguments(json!({}))).await.unwrap();
        assert_eq!(rejection_kind(&missing), "MalformedRequest");

        assert!(service.session.lock().await.engine().is_empty());
    }

    #[tokio::test]
    async fn test_history_tool_rejects_missing_argument() {
        let service = SequentialThinkingService::new(SequentialThinkingConfig::default());
        let result = service
            .thought_history(Parameters(ThoughtHistoryParams {
                view: crate::models::HistoryView::Thought,
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_invalid_params() {
        let service = SequentialThinkingService::new(SequentialThinkingConfig::default());
        let result = service
            .thinking_prompt(Parameters(ThinkingPromptParams {
                name: Some("missing".to_string()),
                ..Default::default()
            }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_warning_after_timeout() {
        let mut config = SequentialThinkingConfig::default();
        config.limits = LimitsConfig {
            timeout_ms: 50,
            ..LimitsConfig::default()
        };
        let service = SequentialThinkingService::new(config);
        assert!(service.budget_warning().is_none());

        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        assert!(service.budget_warning().is_some());

        // Thoughts are still accepted
        let accepted = service.sequential_thinking(thought("Late", 1, 1, false)).await.unwrap();
        assert_eq!(accepted.is_error, Some(false));
    }

    #[tokio::test]
    async fn test_server_info_uses_config() {
        let service = SequentialThinkingService::new(SequentialThinkingConfig::default());
        let info = service.get_info();
        assert_eq!(info.server_info.name, "sequential-thinking");
        assert!(info.instructions.unwrap().contains("sequential_thinking"));
    }
}
