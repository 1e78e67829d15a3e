// src/ori/mod.rs

pub mod agent_store;
pub mod chat;
pub mod client_wrapper;
pub mod clients;
pub mod communicator;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod health;
pub mod http;
pub mod image_generation;
pub mod llm_session;
pub mod mcp;
pub mod notification;
pub mod plugin;
pub mod resource_protocol;
pub mod tool_adapters;
pub mod tool_protocol;
pub mod workflow;
pub mod workspace;

// The teacher's standalone multi-agent council/orchestration/planner layer
// (`agent`, `orchestration`, `council`, `council_session`, `event`,
// `context_strategy`, `thought_chain`, `multi_participant_session`,
// `planner`, and the `mcp_server*`/`mcp_http_adapter` family) has been
// removed: `chat` is this host's turn-taking loop, and `mcp`/`http` are its
// MCP client and HTTP surface.

// Let's explicitly export LLMSession so we don't have to access it via ori::llm_session::LLMSession
// and instead as ori::LLMSession
pub use llm_session::LLMSession;
pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorCode};
