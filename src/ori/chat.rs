//! Chat orchestrator (C6).
//!
//! Runs the per-message, tool-calling turn protocol: look up the agent,
//! prime a transcript, call the model with the agent's enabled tools,
//! dispatch any tool calls the model returns, and ask for a final
//! completion. One [`ChatOrchestrator`] instance is shared by the HTTP
//! adapter and owns the in-memory transcripts the agent store deliberately
//! never persists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::ori::agent_store::{AgentRecord, AgentStore};
use crate::ori::client_wrapper::{
    ClientWrapper, Message as LlmMessage, NativeToolCall, Role as LlmRole, ToolDefinition,
};
use crate::ori::clients::claude::ClaudeClient;
use crate::ori::clients::gemini::GeminiClient;
use crate::ori::clients::grok::GrokClient;
use crate::ori::clients::openai::OpenAIClient;
use crate::ori::config::Config;
use crate::ori::error::{ApiError, ApiResult};
use crate::ori::health::HealthManager;
use crate::ori::mcp::{McpAdapter, McpRegistry};
use crate::ori::plugin::PluginSupervisor;
use crate::ori::tool_protocol::{ToolProtocol, ToolRegistry};

const MODEL_TURN_DEADLINE: Duration = Duration::from_secs(45);
const TOOL_CALL_DEADLINE: Duration = Duration::from_secs(20);
const FOLLOW_UP_DEADLINE: Duration = Duration::from_secs(20);
const EMPTY_RETRY_DEADLINE: Duration = Duration::from_secs(20);

/// One tool invocation surfaced back to the caller, mirroring the
/// `toolCalls: [{function,args,result}]` HTTP contract.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub function: String,
    pub args: serde_json::Value,
    pub result: serde_json::Value,
}

/// The outcome of a single chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Owns every agent's in-memory transcript plus the shared, process-wide
/// default model clients. Transcripts are keyed by agent id and guarded by
/// a per-agent mutex so that concurrent turns against two different agents
/// never block each other, while a single agent's turns are naturally
/// serialised by holding its transcript lock for the whole turn (spec's
/// "one in-flight model turn per agent" bound).
pub struct ChatOrchestrator {
    config: Arc<Config>,
    agents: Arc<AgentStore>,
    plugins: Arc<PluginSupervisor>,
    mcp: Arc<McpRegistry>,
    health: Arc<HealthManager>,
    transcripts: Mutex<HashMap<String, Arc<Mutex<Vec<LlmMessage>>>>>,
    default_clients: Mutex<HashMap<String, Arc<dyn ClientWrapper>>>,
}

impl ChatOrchestrator {
    pub fn new(
        config: Arc<Config>,
        agents: Arc<AgentStore>,
        plugins: Arc<PluginSupervisor>,
        mcp: Arc<McpRegistry>,
        health: Arc<HealthManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            agents,
            plugins,
            mcp,
            health,
            transcripts: Mutex::new(HashMap::new()),
            default_clients: Mutex::new(HashMap::new()),
        })
    }

    /// Run one turn of the 8-step protocol against the named agent (an id
    /// or a display name — `AgentStore::get` keys by id, so a name is
    /// resolved first via `get_by_name`).
    pub async fn handle_turn(&self, agent_ref: &str, question: &str) -> ApiResult<ChatTurn> {
        let record = self.resolve_agent(agent_ref).await?;
        let registry = self.build_tool_registry(&record).await?;
        let client = self.resolve_client(&record)?;

        let transcript_handle = self.transcript_for(&record.id).await;
        let mut transcript = transcript_handle.lock().await;

        if transcript.is_empty() {
            transcript.push(system_message(&tool_listing_prompt(&registry)));
        }
        transcript.push(user_message(question));

        let tool_defs: Vec<ToolDefinition> =
            registry.list_tools().iter().map(|m| m.to_tool_definition()).collect();

        let first = call_model(&client, &transcript, Some(tool_defs.clone()), MODEL_TURN_DEADLINE).await?;

        if !first.tool_calls.is_empty() {
            transcript.push(first.clone());

            let mut tool_call_records = Vec::with_capacity(first.tool_calls.len());
            let mut concatenated_results = String::new();

            for call in &first.tool_calls {
                let (output, record_entry) = self.dispatch_tool_call(&registry, call).await?;
                concatenated_results.push_str(&output);
                concatenated_results.push('\n');
                transcript.push(tool_result_message(&call.id, &output));
                tool_call_records.push(record_entry);
            }

            transcript.push(system_message(
                "Prefer displaying the structured tool output above rather than re-deriving it.",
            ));

            let final_response = match call_model(&client, &transcript, None, FOLLOW_UP_DEADLINE).await {
                Ok(msg) => {
                    transcript.push(msg.clone());
                    msg.content.to_string()
                }
                Err(_) => concatenated_results.trim_end().to_string(),
            };

            self.persist_on_success(&record).await?;
            return Ok(ChatTurn {
                response: final_response,
                tool_calls: tool_call_records,
            });
        }

        let mut response_text = first.content.to_string();
        if response_text.trim().is_empty() {
            transcript.push(user_message(
                "Answer in plain text; no tool call is necessary for this turn.",
            ));
            if let Ok(retry) = call_model(&client, &transcript, None, EMPTY_RETRY_DEADLINE).await {
                transcript.push(retry.clone());
                response_text = retry.content.to_string();
            }
        } else {
            transcript.push(first);
        }

        self.persist_on_success(&record).await?;
        Ok(ChatTurn {
            response: response_text,
            tool_calls: Vec::new(),
        })
    }

    async fn transcript_for(&self, agent_id: &str) -> Arc<Mutex<Vec<LlmMessage>>> {
        self.transcripts
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    async fn resolve_agent(&self, agent_ref: &str) -> ApiResult<AgentRecord> {
        if let Ok(record) = self.agents.get(agent_ref).await {
            return Ok(record);
        }
        self.agents
            .get_by_name(agent_ref)
            .await
            .ok_or_else(|| ApiError::not_found(format!("agent '{agent_ref}' not found")))
    }

    /// Build the per-turn tool registry from the agent's enabled tool
    /// names, checking the plugin supervisor first and falling back to a
    /// registered MCP server of the same name.
    async fn build_tool_registry(&self, record: &AgentRecord) -> ApiResult<ToolRegistry> {
        let mut registry = ToolRegistry::empty();
        for name in &record.enabled_plugins {
            if let Some(adapter) = self.plugins.get_by_name(name).await {
                registry
                    .add_protocol(name, adapter)
                    .await
                    .map_err(|e| ApiError::dependency_unavailable(e.to_string()))?;
                continue;
            }
            if let Some(connection) = self.mcp.get(name).await {
                let adapter: Arc<dyn ToolProtocol> = Arc::new(McpAdapter::new(connection));
                registry
                    .add_protocol(name, adapter)
                    .await
                    .map_err(|e| ApiError::dependency_unavailable(e.to_string()))?;
                continue;
            }
            return Err(ApiError::dependency_unavailable(format!(
                "agent '{}' enables tool '{name}' but no plugin or MCP server is loaded under that name",
                record.name
            )));
        }
        Ok(registry)
    }

    /// Resolve a live model client for the given agent. An agent-owned API
    /// key always produces a fresh client; otherwise the process-wide
    /// default for that provider is reused (and created once, lazily).
    fn resolve_client(&self, record: &AgentRecord) -> ApiResult<Arc<dyn ClientWrapper>> {
        let provider = record.settings.provider.as_str();
        let model = record.settings.model.as_str();

        if let Some(key) = &record.settings.api_key {
            return build_client(provider, model, key);
        }

        let default_key = match provider {
            "openai" => self.config.openai_api_key.as_deref(),
            "anthropic" | "claude" => self.config.anthropic_api_key.as_deref(),
            "gemini" | "google" => self.config.gemini_api_key.as_deref(),
            "grok" | "xai" => self.config.grok_api_key.as_deref(),
            other => {
                return Err(ApiError::validation(format!("unknown model provider '{other}'")));
            }
        };
        let key = default_key.ok_or_else(|| {
            ApiError::dependency_unavailable(format!(
                "agent '{}' has no API key and no process-wide default is configured for provider '{provider}'",
                record.name
            ))
        })?;

        // The default client is shared and reused across turns/agents for
        // the same provider+model pair so the shared HTTP transport's idle
        // pool stays warm (spec's bounded-idle-pool requirement).
        let cache_key = format!("{provider}:{model}");
        if let Ok(mut cache) = self.default_clients.try_lock() {
            if let Some(client) = cache.get(&cache_key) {
                return Ok(Arc::clone(client));
            }
            let client = build_client(provider, model, key)?;
            cache.insert(cache_key, Arc::clone(&client));
            return Ok(client);
        }
        build_client(provider, model, key)
    }

    /// Run a single tool call with its own deadline, tagging stats against
    /// the enclosing plugin/MCP name and surfacing both the transcript
    /// text and the structured record for the HTTP response.
    async fn dispatch_tool_call(
        &self,
        registry: &ToolRegistry,
        call: &NativeToolCall,
    ) -> ApiResult<(String, ToolCallRecord)> {
        let resolved_name = resolve_tool_name(registry, &call.name)
            .ok_or_else(|| ApiError::bad_gateway(format!("tool '{}' is not registered", call.name)))?;

        let outcome = timeout(
            TOOL_CALL_DEADLINE,
            registry.execute_tool(&resolved_name, call.arguments.clone()),
        )
        .await;

        let protocol_name = registry.get_tool_protocol(&resolved_name).unwrap_or("unknown").to_string();

        let tool_result = match outcome {
            Err(_) => {
                self.health.record_call(&protocol_name, false).await;
                return Err(ApiError::timeout(format!("tool '{}' timed out", call.name)));
            }
            Ok(Err(e)) => {
                self.health.record_call(&protocol_name, false).await;
                return Err(ApiError::bad_gateway(format!("tool '{}' failed: {e}", call.name)));
            }
            Ok(Ok(result)) => result,
        };

        if !tool_result.success {
            self.health.record_call(&protocol_name, false).await;
            let message = tool_result.error.clone().unwrap_or_else(|| "tool execution failed".to_string());
            return Err(ApiError::bad_gateway(format!("tool '{}' failed: {message}", call.name)));
        }
        self.health.record_call(&protocol_name, true).await;

        let output_text = match &tool_result.output {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok((
            output_text,
            ToolCallRecord {
                function: call.name.clone(),
                args: call.arguments.clone(),
                result: tool_result.output.clone(),
            },
        ))
    }

    /// Persist the agent's settings on a successful turn. Transcripts are
    /// intentionally left out, matching the store's non-persistence policy.
    async fn persist_on_success(&self, record: &AgentRecord) -> ApiResult<()> {
        self.agents.write_agent_settings(&record.name, &record.settings).await
    }
}

fn build_client(provider: &str, model: &str, api_key: &str) -> ApiResult<Arc<dyn ClientWrapper>> {
    let client: Arc<dyn ClientWrapper> = match provider {
        "openai" => Arc::new(OpenAIClient::new_with_model_string(api_key, model)),
        "anthropic" | "claude" => Arc::new(ClaudeClient::new_with_model_str(api_key, model)),
        "gemini" | "google" => Arc::new(GeminiClient::new_with_model_string(api_key, model)),
        "grok" | "xai" => Arc::new(GrokClient::new_with_model_str(api_key, model)),
        other => return Err(ApiError::validation(format!("unknown model provider '{other}'"))),
    };
    Ok(client)
}

async fn call_model(
    client: &Arc<dyn ClientWrapper>,
    transcript: &[LlmMessage],
    tools: Option<Vec<ToolDefinition>>,
    deadline: Duration,
) -> ApiResult<LlmMessage> {
    match timeout(deadline, client.send_message(transcript, tools)).await {
        Ok(Ok(message)) => Ok(message),
        Ok(Err(e)) => Err(ApiError::bad_gateway(e.to_string())),
        Err(_) => Err(ApiError::timeout("model did not respond within its deadline")),
    }
}

/// OpenAI returns function names with underscores; match the stored tool
/// name after mapping `_` to `-` if an exact match isn't found.
fn resolve_tool_name(registry: &ToolRegistry, name: &str) -> Option<String> {
    if registry.get_tool(name).is_some() {
        return Some(name.to_string());
    }
    let hyphenated = name.replace('_', "-");
    if registry.get_tool(&hyphenated).is_some() {
        return Some(hyphenated);
    }
    None
}

fn tool_listing_prompt(registry: &ToolRegistry) -> String {
    let names: Vec<&str> = registry.list_tools().iter().map(|m| m.name.as_str()).collect();
    if names.is_empty() {
        "You are a helpful assistant. No tools are enabled for this agent.".to_string()
    } else {
        format!("You are a helpful assistant. Available tools: {}.", names.join(", "))
    }
}

fn system_message(text: &str) -> LlmMessage {
    LlmMessage {
        role: LlmRole::System,
        content: Arc::from(text),
        tool_calls: Vec::new(),
    }
}

fn user_message(text: &str) -> LlmMessage {
    LlmMessage {
        role: LlmRole::User,
        content: Arc::from(text),
        tool_calls: Vec::new(),
    }
}

fn tool_result_message(call_id: &str, content: &str) -> LlmMessage {
    LlmMessage {
        role: LlmRole::Tool { call_id: call_id.to_string() },
        content: Arc::from(content),
        tool_calls: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ori::agent_store::AgentSettings;
    use crate::ori::event_bus::EventBus;
    use async_trait::async_trait;
    use std::error::Error;

    fn sample_record(name: &str, provider: &str, api_key: Option<&str>) -> AgentRecord {
        let now = chrono::Utc::now();
        AgentRecord {
            id: name.to_string(),
            name: name.to_string(),
            agent_type: "general".to_string(),
            settings: AgentSettings {
                provider: provider.to_string(),
                model: "test-model".to_string(),
                temperature: 0.7,
                api_key: api_key.map(String::from),
                system_prompt: None,
                max_tokens: 4096,
            },
            enabled_plugins: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn orchestrator(dir: &std::path::Path) -> Arc<ChatOrchestrator> {
        let event_bus = EventBus::new();
        ChatOrchestrator::new(
            Arc::new(Config::from_env()),
            AgentStore::new(dir),
            Arc::new(PluginSupervisor::new()),
            McpRegistry::new(),
            HealthManager::new(event_bus),
        )
    }

    #[tokio::test]
    async fn unknown_agent_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let err = orch.handle_turn("nope", "hi").await.unwrap_err();
        assert_eq!(err.code, crate::ori::error::ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn missing_default_key_is_dependency_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        orch.agents.create(sample_record("no-key", "openai", None)).await.unwrap();
        let err = orch.handle_turn("no-key", "hi").await.unwrap_err();
        assert_eq!(err.code, crate::ori::error::ErrorCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn unknown_provider_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        orch.agents
            .create(sample_record("weird", "not-a-provider", Some("key")))
            .await
            .unwrap();
        let err = orch.handle_turn("weird", "hi").await.unwrap_err();
        assert_eq!(err.code, crate::ori::error::ErrorCode::ValidationError);
    }

    struct EchoClient;

    #[async_trait]
    impl ClientWrapper for EchoClient {
        async fn send_message(
            &self,
            messages: &[LlmMessage],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<LlmMessage, Box<dyn Error>> {
            let last = messages.last().map(|m| m.content.to_string()).unwrap_or_default();
            Ok(LlmMessage {
                role: LlmRole::Assistant,
                content: Arc::from(format!("echo: {last}").as_str()),
                tool_calls: Vec::new(),
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }

        fn usage_slot(&self) -> Option<&Mutex<Option<crate::ori::client_wrapper::TokenUsage>>> {
            None
        }
    }

    #[tokio::test]
    async fn plain_turn_round_trips_through_call_model() {
        let client: Arc<dyn ClientWrapper> = Arc::new(EchoClient);
        let transcript = vec![user_message("hello")];
        let reply = call_model(&client, &transcript, None, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&*reply.content, "echo: hello");
    }

    #[test]
    fn tool_name_normalization_maps_underscores_to_hyphens() {
        let mut registry = ToolRegistry::empty();
        registry.add_tool(crate::ori::tool_protocol::Tool::new(
            "get-weather",
            "fetches weather",
            Arc::new(NoopProtocol) as Arc<dyn ToolProtocol>,
        ));
        assert_eq!(resolve_tool_name(&registry, "get_weather").as_deref(), Some("get-weather"));
        assert_eq!(resolve_tool_name(&registry, "get-weather").as_deref(), Some("get-weather"));
        assert_eq!(resolve_tool_name(&registry, "missing"), None);
    }

    struct NoopProtocol;

    #[async_trait]
    impl ToolProtocol for NoopProtocol {
        async fn execute(
            &self,
            _tool_name: &str,
            _parameters: serde_json::Value,
        ) -> Result<crate::ori::tool_protocol::ToolResult, Box<dyn Error + Send + Sync>> {
            Ok(crate::ori::tool_protocol::ToolResult::success(serde_json::Value::Null))
        }

        async fn list_tools(
            &self,
        ) -> Result<Vec<crate::ori::tool_protocol::ToolMetadata>, Box<dyn Error + Send + Sync>> {
            Ok(vec![])
        }

        async fn get_tool_metadata(
            &self,
            tool_name: &str,
        ) -> Result<crate::ori::tool_protocol::ToolMetadata, Box<dyn Error + Send + Sync>> {
            Ok(crate::ori::tool_protocol::ToolMetadata::new(tool_name, ""))
        }

        fn protocol_name(&self) -> &str {
            "noop"
        }
    }
}
