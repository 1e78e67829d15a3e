//! MCP client registry (C4).
//!
//! Speaks the Model Context Protocol as a *client* against externally
//! launched servers, over JSON-RPC 2.0 framed as newline-delimited JSON on
//! the child's stdio. Deliberately hand-rolled rather than built on the
//! `rmcp` crate: the example pack only attested `rmcp`'s server-side usage,
//! and a client/transport integration against an unfamiliar crate's API
//! without a grounding source to check it against was judged riskier than
//! implementing the (well-specified, small) wire protocol directly — the
//! same framed-stdio-JSON idiom already used by [`plugin`](crate::ori::plugin)
//! for the separate, simpler plugin RPC.

use crate::ori::tool_protocol::{ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::{timeout, Duration};

pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(10);
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerLifecycle {
    Stopped,
    Starting,
    Running,
    Error,
    Restarting,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: i64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default, deserialize_with = "deserialize_flexible_id")]
    id: Option<i64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Some servers emit numeric ids as floats; normalize to i64 on the way in
/// so the pending-request table can key on a single integer type.
fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        if let Some(i) = v.as_i64() {
            Some(i)
        } else {
            v.as_f64().map(|f| f.round() as i64)
        }
    }))
}

/// JSON-RPC well-known error codes, per spec §4.4.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

struct PendingTable {
    next_id: AtomicI64,
    table: Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>,
}

/// A connected MCP server: launches the child, drives the
/// `initialize` -> `notifications/initialized` -> `tools/list` handshake,
/// and exposes request/response plumbing for the rest of the client.
pub struct McpServerConnection {
    name: String,
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    pending: Arc<PendingTable>,
    lifecycle: RwLock<ServerLifecycle>,
    tools: RwLock<Vec<ToolMetadata>>,
}

impl McpServerConnection {
    /// Spawn `command` and perform the full startup handshake.
    pub async fn connect(
        name: &str,
        command: &str,
        args: &[String],
    ) -> Result<Arc<Self>, Box<dyn Error + Send + Sync>> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take().ok_or("mcp server stdin not piped")?;
        let stdout = child.stdout.take().ok_or("mcp server stdout not piped")?;
        let mut reader = BufReader::new(stdout).lines();

        let pending = Arc::new(PendingTable {
            next_id: AtomicI64::new(1),
            table: Mutex::new(HashMap::new()),
        });
        let pending_for_task = Arc::clone(&pending);
        tokio::spawn(async move {
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(&line) {
                            Ok(resp) => {
                                if let Some(id) = resp.id {
                                    if let Some(tx) = pending_for_task.table.lock().await.remove(&id) {
                                        let _ = tx.send(resp);
                                    }
                                }
                            }
                            Err(e) => log::warn!("mcp: unparseable server frame: {e}"),
                        }
                    }
                    Ok(None) => {
                        pending_for_task.table.lock().await.clear();
                        break;
                    }
                    Err(e) => {
                        log::warn!("mcp: stdout read error: {e}");
                        break;
                    }
                }
            }
        });

        let connection = Arc::new(Self {
            name: name.to_string(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            lifecycle: RwLock::new(ServerLifecycle::Starting),
            tools: RwLock::new(Vec::new()),
        });

        connection.initialize_handshake().await?;
        Ok(connection)
    }

    async fn initialize_handshake(self: &Arc<Self>) -> Result<(), Box<dyn Error + Send + Sync>> {
        let init_result = self
            .call(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "ori-agent", "version": env!("CARGO_PKG_VERSION")},
                })),
                INITIALIZE_TIMEOUT,
            )
            .await;

        if init_result.is_err() {
            *self.lifecycle.write().await = ServerLifecycle::Error;
            return init_result.map(|_| ());
        }

        self.notify("notifications/initialized", None).await?;

        let tools_result = self
            .call("tools/list", None, INITIALIZE_TIMEOUT)
            .await?;
        let raw_tools = tools_result
            .get("tools")
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));
        let tools: Vec<McpToolDescriptor> = serde_json::from_value(raw_tools)?;
        *self.tools.write().await = tools.into_iter().map(McpToolDescriptor::into_metadata).collect();

        *self.lifecycle.write().await = ServerLifecycle::Running;
        Ok(())
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0",
            method,
            params,
        };
        let mut line = serde_json::to_string(&notification)?;
        line.push('\n');
        self.stdin.lock().await.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        let id = self.pending.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.table.lock().await.insert(id, tx);

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin.lock().await.write_all(line.as_bytes()).await?;

        let response = timeout(deadline, rx)
            .await
            .map_err(|_| format!("mcp call '{method}' to '{}' timed out", self.name))?
            .map_err(|_| "mcp transport closed before responding")?;

        if let Some(err) = response.error {
            return Err(format!("mcp error {}: {}", err.code, err.message).into());
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// Send a `ping` within [`PING_TIMEOUT`]; intended to be driven every
    /// [`PING_INTERVAL`] while the server is running. A failed ping moves
    /// the connection's lifecycle to `error`; a successful one clears a
    /// prior `error` state back to `running`.
    pub async fn ping(&self) -> bool {
        let ok = self.call("ping", None, PING_TIMEOUT).await.is_ok();
        let mut lifecycle = self.lifecycle.write().await;
        if matches!(*lifecycle, ServerLifecycle::Running | ServerLifecycle::Error) {
            *lifecycle = if ok { ServerLifecycle::Running } else { ServerLifecycle::Error };
        }
        ok
    }

    pub async fn lifecycle(&self) -> ServerLifecycle {
        *self.lifecycle.read().await
    }

    pub async fn tools(&self) -> Vec<ToolMetadata> {
        self.tools.read().await.clone()
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.call(
            "tools/call",
            Some(serde_json::json!({"name": tool_name, "arguments": arguments})),
            Duration::from_secs(20),
        )
        .await
    }

    pub async fn list_resources(&self) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.call("resources/list", None, Duration::from_secs(10)).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.call(
            "resources/read",
            Some(serde_json::json!({"uri": uri})),
            Duration::from_secs(10),
        )
        .await
    }

    pub async fn list_prompts(&self) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.call("prompts/list", None, Duration::from_secs(10)).await
    }

    pub async fn get_prompt(&self, name: &str) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.call(
            "prompts/get",
            Some(serde_json::json!({"name": name})),
            Duration::from_secs(10),
        )
        .await
    }

    pub async fn shutdown(&self) {
        *self.lifecycle.write().await = ServerLifecycle::Stopped;
        let _ = self.child.lock().await.start_kill();
    }
}

#[derive(Debug, Deserialize)]
struct McpToolDescriptor {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "inputSchema", default)]
    input_schema: serde_json::Value,
}

impl McpToolDescriptor {
    fn into_metadata(self) -> ToolMetadata {
        let mut metadata = ToolMetadata::new(self.name, self.description);
        if let Some(properties) = self.input_schema.get("properties").and_then(|p| p.as_object()) {
            let required: Vec<String> = self
                .input_schema
                .get("required")
                .and_then(|r| r.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            for (name, schema) in properties {
                let param_type = match schema.get("type").and_then(|t| t.as_str()) {
                    Some("number") => ToolParameterType::Number,
                    Some("integer") => ToolParameterType::Integer,
                    Some("boolean") => ToolParameterType::Boolean,
                    Some("array") => ToolParameterType::Array,
                    Some("object") => ToolParameterType::Object,
                    _ => ToolParameterType::String,
                };
                let description = schema
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("")
                    .to_string();
                let mut param = ToolParameter::new(name.clone(), param_type).with_description(description);
                if required.contains(name) {
                    param = param.required();
                }
                metadata = metadata.with_parameter(param);
            }
        }
        metadata
    }
}

/// MCP server result `content[]` item, per the spec's reply-translation rule:
/// a single text item passes through as a bare string; anything else becomes
/// a JSON array of these.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum ContentItem {
    Text { #[serde(rename = "type")] kind: String, text: String },
    Data { #[serde(rename = "type")] kind: String, data: String, #[serde(rename = "mimeType")] mime_type: String },
    Resource { #[serde(rename = "type")] kind: String, uri: String },
}

/// Adapts a connected MCP server to [`ToolProtocol`].
pub struct McpAdapter {
    connection: Arc<McpServerConnection>,
}

impl McpAdapter {
    pub fn new(connection: Arc<McpServerConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ToolProtocol for McpAdapter {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let raw = self.connection.call_tool(tool_name, parameters).await?;

        let is_error = raw.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
        let content = raw.get("content").cloned().unwrap_or(serde_json::Value::Array(vec![]));
        let items: Vec<ContentItem> = serde_json::from_value(content).unwrap_or_default();

        let output = if items.len() == 1 {
            if let ContentItem::Text { text, .. } = &items[0] {
                serde_json::Value::String(text.clone())
            } else {
                serde_json::to_value(&items)?
            }
        } else {
            serde_json::to_value(&items)?
        };

        if is_error {
            let message = output.as_str().map(String::from).unwrap_or_else(|| output.to_string());
            return Ok(ToolResult::failure(message));
        }
        Ok(ToolResult::success(output))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(self.connection.tools().await)
    }

    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>> {
        self.connection
            .tools()
            .await
            .into_iter()
            .find(|m| m.name == tool_name)
            .ok_or_else(|| Box::new(ToolError::NotFound(tool_name.to_string())) as Box<dyn Error + Send + Sync>)
    }

    fn protocol_name(&self) -> &str {
        "mcp"
    }

    async fn list_resources(&self) -> Result<Vec<crate::ori::resource_protocol::ResourceMetadata>, Box<dyn Error + Send + Sync>> {
        let raw = self.connection.list_resources().await?;
        let resources = raw.get("resources").cloned().unwrap_or(serde_json::Value::Array(vec![]));
        Ok(serde_json::from_value(resources).unwrap_or_default())
    }

    async fn read_resource(&self, uri: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let raw = self.connection.read_resource(uri).await?;
        Ok(raw.to_string())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.connection.shutdown().await;
        Ok(())
    }
}

/// Registry of every connected MCP server, keyed by the name under which it
/// was registered (spec §4.4's "MCP client registry").
pub struct McpRegistry {
    connections: RwLock<HashMap<String, Arc<McpServerConnection>>>,
}

impl McpRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
        })
    }

    pub async fn register(
        &self,
        name: &str,
        command: &str,
        args: &[String],
    ) -> Result<Arc<McpServerConnection>, Box<dyn Error + Send + Sync>> {
        let connection = McpServerConnection::connect(name, command, args).await?;
        self.connections.write().await.insert(name.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<McpServerConnection>> {
        self.connections.read().await.get(name).cloned()
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<McpServerConnection>> {
        self.connections.write().await.remove(name)
    }

    pub async fn list(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }
}

impl Default for McpRegistry {
    fn default() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_json_rpc_spec() {
        assert_eq!(error_codes::PARSE_ERROR, -32700);
        assert_eq!(error_codes::METHOD_NOT_FOUND, -32601);
    }

    #[test]
    fn descriptor_into_metadata_maps_required_params() {
        let descriptor = McpToolDescriptor {
            name: "echo".into(),
            description: "echoes input".into(),
            input_schema: serde_json::json!({
                "properties": {"text": {"type": "string", "description": "text to echo"}},
                "required": ["text"],
            }),
        };
        let metadata = descriptor.into_metadata();
        assert_eq!(metadata.name, "echo");
        assert_eq!(metadata.parameters.len(), 1);
        assert!(metadata.parameters[0].required);
    }
}
