//! Process configuration.
//!
//! Ori Agent reads its configuration from environment variables rather than a
//! config file — there is no TOML/YAML parsing dependency here, mirroring the
//! rest of this crate's "users construct this manually" philosophy.
//!
//! # Example
//!
//! ```rust
//! use ori::Config;
//!
//! let config = Config::from_env();
//! assert!(config.agent_store_path.ends_with("agent_store"));
//! ```

use std::env;
use std::path::PathBuf;

/// Global process configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the OpenAI provider, used when an agent has no key of its own.
    pub openai_api_key: Option<String>,
    /// API key for the Anthropic provider, used when an agent has no key of its own.
    pub anthropic_api_key: Option<String>,
    /// API key for the Gemini provider, used when an agent has no key of its own.
    pub gemini_api_key: Option<String>,
    /// API key for the Grok (xAI) provider, used when an agent has no key of its own.
    pub grok_api_key: Option<String>,
    /// Root directory for the agent store's persisted layout.
    pub agent_store_path: PathBuf,
    /// Directory used by the plugin supervisor to cache downloaded artefacts
    /// and the merged registry.
    pub plugin_cache_dir: PathBuf,
    /// Path to the local plugin registry override file.
    pub plugin_registry_path: PathBuf,
}

impl Config {
    /// Read configuration from the environment, falling back to sane defaults
    /// under the current working directory when a variable is unset.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            grok_api_key: env::var("XAI_API_KEY").ok(),
            agent_store_path: env::var("AGENT_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("agent_store")),
            plugin_cache_dir: env::var("PLUGIN_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("plugin_cache")),
            plugin_registry_path: env::var("PLUGIN_REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("plugin_registry.json")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
