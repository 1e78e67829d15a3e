//! Plugin lifecycle & RPC supervisor (C2).
//!
//! Tools are not in-tree libraries — each is a separate OS process speaking a
//! versioned handshake plus a framed-JSON RPC protocol over its own stdio.
//! The supervisor discovers registry entries, launches/caches one client per
//! absolute binary path, and exposes each live plugin as an adapter
//! satisfying [`ToolProtocol`](crate::ori::tool_protocol::ToolProtocol) so
//! the rest of the host never has to know a tool is out-of-process.

use crate::ori::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::{timeout, Duration};

const HANDSHAKE_MAGIC: &str = "ORI-PLUGIN-HANDSHAKE-V1";
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);
const UPDATE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A registry entry as persisted in `plugin_registry.json` / the remote cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRegistryEntry {
    pub name: String,
    pub description: String,
    /// Local filesystem path or a remote URL the binary is fetched from.
    pub path: String,
    pub version: String,
    pub checksum: Option<String>,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Merge registry sources in priority order (later wins, by entry name).
///
/// Sources, lowest to highest priority: embedded fallback, local cache file,
/// local override file, remote HTTP source (already fetched and handed in as
/// `remote`), explicit override path. List order after merge is irrelevant —
/// only presence-by-name matters.
pub fn merge_registry_sources(
    embedded_fallback: Vec<PluginRegistryEntry>,
    cache_file: Option<Vec<PluginRegistryEntry>>,
    local_override: Option<Vec<PluginRegistryEntry>>,
    remote: Option<Vec<PluginRegistryEntry>>,
    explicit_override: Option<Vec<PluginRegistryEntry>>,
) -> HashMap<String, PluginRegistryEntry> {
    let mut merged: HashMap<String, PluginRegistryEntry> = HashMap::new();
    for batch in [
        Some(embedded_fallback),
        cache_file,
        local_override,
        remote,
        explicit_override,
    ]
    .into_iter()
    .flatten()
    {
        for entry in batch {
            merged.insert(entry.name.clone(), entry);
        }
    }
    merged
}

/// Resolve a registry entry's `path` to an absolute path, falling back to the
/// current working directory when the base-relative candidate is absent.
pub fn resolve_plugin_path(registry_base_dir: &Path, entry_path: &str) -> PathBuf {
    let base_relative = registry_base_dir.join(entry_path);
    if base_relative.exists() {
        return base_relative;
    }
    let cwd_relative = PathBuf::from(entry_path);
    if cwd_relative.exists() {
        return cwd_relative;
    }
    base_relative
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// A live handle to one plugin child process.
///
/// Holds the process, the stdin writer, and a dispatch table of pending
/// requests keyed by monotonic request id — a background task continuously
/// reads framed (newline-delimited JSON) lines from stdout and completes the
/// matching oneshot channel.
pub struct PluginClient {
    name: std::sync::Mutex<String>,
    version: std::sync::Mutex<String>,
    path: PathBuf,
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>,
}

impl PluginClient {
    /// Launch the plugin binary and perform the versioned handshake.
    pub async fn launch(name: &str, path: &Path) -> Result<Arc<Self>, Box<dyn Error + Send + Sync>> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or("plugin stdin not piped")?;
        let stdout = child.stdout.take().ok_or("plugin stdout not piped")?;
        let mut reader = BufReader::new(stdout).lines();

        let handshake_line = format!("{}\n", HANDSHAKE_MAGIC);
        timeout(LAUNCH_TIMEOUT, stdin.write_all(handshake_line.as_bytes())).await??;

        let ack = timeout(LAUNCH_TIMEOUT, reader.next_line())
            .await?
            .map_err(|e| format!("plugin handshake read failed: {e}"))?
            .ok_or("plugin closed stdout during handshake")?;
        if !ack.starts_with(HANDSHAKE_MAGIC) {
            let _ = child.start_kill();
            return Err(format!("bad handshake cookie from {}: {ack}", path.display()).into());
        }

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_for_task = Arc::clone(&pending);
        tokio::spawn(async move {
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<RpcResponse>(&line) {
                            Ok(resp) => {
                                if let Some(tx) = pending_for_task.lock().await.remove(&resp.id) {
                                    let _ = tx.send(resp);
                                }
                            }
                            Err(e) => warn!("plugin sent unparseable frame: {e}"),
                        }
                    }
                    Ok(None) => {
                        // Transport closed: fail every outstanding request.
                        let mut table = pending_for_task.lock().await;
                        table.clear();
                        break;
                    }
                    Err(e) => {
                        warn!("plugin stdout read error: {e}");
                        break;
                    }
                }
            }
        });

        let client = Arc::new(Self {
            name: std::sync::Mutex::new(name.to_string()),
            version: std::sync::Mutex::new(String::new()),
            path: path.to_path_buf(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            next_id: AtomicU64::new(1),
            pending,
        });

        let version = client
            .call_raw("Version", serde_json::Value::Null, Duration::from_secs(10))
            .await?
            .as_str()
            .unwrap_or("0.0.0")
            .to_string();
        *client.version.lock().unwrap() = version;

        Ok(client)
    }

    /// Issue a raw RPC call by method name. Exposed at crate visibility so
    /// the HTTP adapter can forward the handful of plugin-config methods
    /// (`GetDefaultSettings`, `GetRequiredConfig`, `ValidateConfig`,
    /// `InitializeWithConfig`) that have no dedicated wrapper here.
    pub(crate) async fn call_raw(
        &self,
        method: &str,
        params: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = RpcRequest { id, method, params };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
        }

        let response = timeout(deadline, rx)
            .await
            .map_err(|_| format!("plugin call '{method}' timed out after {deadline:?}"))?
            .map_err(|_| "plugin transport closed before responding")?;

        if let Some(err) = response.error {
            return Err(err.into());
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn version(&self) -> String {
        self.version.lock().unwrap().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn shutdown(&self) {
        let _ = self.child.lock().await.start_kill();
    }
}

/// Adapts a live [`PluginClient`] to the host's [`ToolProtocol`] interface so
/// every consumer (agent tool registry, MCP-style dispatch) sees a uniform
/// tool surface regardless of whether a tool runs in-process or as a plugin.
pub struct PluginAdapter {
    client: Arc<PluginClient>,
}

impl PluginAdapter {
    pub fn new(client: Arc<PluginClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<PluginClient> {
        &self.client
    }
}

#[async_trait]
impl ToolProtocol for PluginAdapter {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let args_json = serde_json::to_string(&parameters)?;
        let raw = self
            .client
            .call_raw(
                "Call",
                serde_json::json!({"name": tool_name, "args": args_json}),
                Duration::from_secs(20),
            )
            .await
            .map_err(|e| Box::new(ToolError::ExecutionFailed(e.to_string())) as Box<dyn Error + Send + Sync>)?;
        Ok(ToolResult::success(raw))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let raw = self
            .client
            .call_raw("Definition", serde_json::Value::Null, Duration::from_secs(10))
            .await?;
        let metadata: ToolMetadata = serde_json::from_value(raw)?;
        Ok(vec![metadata])
    }

    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>> {
        self.list_tools()
            .await?
            .into_iter()
            .find(|m| m.name == tool_name)
            .ok_or_else(|| Box::new(ToolError::NotFound(tool_name.to_string())) as Box<dyn Error + Send + Sync>)
    }

    fn protocol_name(&self) -> &str {
        "plugin"
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.client.shutdown().await;
        Ok(())
    }
}

/// What's stored for a successfully loaded plugin: the adapter plus the
/// checksum of the binary it was loaded from (used to validate the
/// basename-fallback cache lookup — see [`PluginSupervisor::load`]).
struct CacheEntry {
    adapter: Arc<PluginAdapter>,
    checksum: String,
}

/// Owns every live plugin child process. No other component holds a direct
/// handle to a plugin — they only ever see the [`ToolProtocol`]-shaped
/// adapter returned by [`load`](PluginSupervisor::load).
pub struct PluginSupervisor {
    /// `absolute path -> adapter`, the primary cache key.
    by_path: RwLock<HashMap<PathBuf, CacheEntry>>,
    /// `declared name -> absolute path`, secondary index.
    by_name: RwLock<HashMap<String, PathBuf>>,
}

impl PluginSupervisor {
    pub fn new() -> Self {
        Self {
            by_path: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
        }
    }

    fn checksum_file(path: &Path) -> std::io::Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Load (or reuse) the adapter for a plugin binary at `path`, registered
    /// under `name`.
    ///
    /// Lookup order: primary cache by path; on a cache hit whose checksum no
    /// longer matches the file on disk the entry is treated as stale and
    /// reloaded. On a full cache miss, fall back to the basename index only
    /// when the candidate's checksum matches what's cached under that name —
    /// otherwise this fails with a restart-required error rather than
    /// silently returning a binary with the same filename but different
    /// contents (see the plugin-cache Open Question in the design notes).
    pub async fn load(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<Arc<PluginAdapter>, Box<dyn Error + Send + Sync>> {
        let checksum = Self::checksum_file(path)?;

        if let Some(entry) = self.by_path.read().await.get(path) {
            if entry.checksum == checksum {
                return Ok(Arc::clone(&entry.adapter));
            }
        }

        if let Some(basename) = path.file_name() {
            let by_name = self.by_name.read().await;
            for (_, cached_path) in by_name.iter() {
                if cached_path.file_name() == Some(basename) {
                    if let Some(entry) = self.by_path.read().await.get(cached_path) {
                        if entry.checksum == checksum {
                            return Ok(Arc::clone(&entry.adapter));
                        }
                    }
                    return Err(format!(
                        "plugin '{name}': basename collision at {:?} with mismatched checksum; restart required",
                        basename
                    )
                    .into());
                }
            }
        }

        info!("launching plugin '{name}' from {}", path.display());
        let client = PluginClient::launch(name, path).await?;
        let adapter = Arc::new(PluginAdapter::new(client));

        self.by_path.write().await.insert(
            path.to_path_buf(),
            CacheEntry {
                adapter: Arc::clone(&adapter),
                checksum,
            },
        );
        self.by_name
            .write()
            .await
            .insert(name.to_string(), path.to_path_buf());

        Ok(adapter)
    }

    pub async fn is_loaded(&self, path: &Path) -> bool {
        self.by_path.read().await.contains_key(path)
    }

    pub async fn unload(&self, name: &str) {
        if let Some(path) = self.by_name.write().await.remove(name) {
            if let Some(entry) = self.by_path.write().await.remove(&path) {
                let _ = entry; // adapter dropped; underlying client shut down via Drop-free shutdown() caller responsibility
            }
        }
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Arc<PluginAdapter>> {
        let path = self.by_name.read().await.get(name).cloned()?;
        self.by_path.read().await.get(&path).map(|e| Arc::clone(&e.adapter))
    }

    pub async fn list_loaded(&self) -> Vec<String> {
        self.by_name.read().await.keys().cloned().collect()
    }
}

impl Default for PluginSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`hot_update`].
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub success: bool,
    pub rolled_back: bool,
    pub message: String,
}

/// Perform the 5-step hot-update protocol against a plugin binary already on
/// disk at `current_path`.
///
/// 1. Backup current binary to `<backup_dir>/<name>_v<version>_<timestamp>`.
/// 2. `artifact` is assumed already downloaded to `downloaded_path` by the
///    caller (the actual HTTP fetch is an external collaborator — see §6).
/// 3. If `expected_checksum` is supplied, verify SHA-256; mismatch aborts.
/// 4. Make executable, atomically rename over `current_path`.
/// 5. Verify the file is present and executable; on failure restore the
///    backup and report `rolled_back: true`.
pub async fn hot_update(
    name: &str,
    version: &str,
    timestamp: u64,
    current_path: &Path,
    downloaded_path: &Path,
    expected_checksum: Option<&str>,
    backup_dir: &Path,
) -> Result<UpdateReport, Box<dyn Error + Send + Sync>> {
    std::fs::create_dir_all(backup_dir)?;
    let backup_path = backup_dir.join(format!("{name}_v{version}_{timestamp}"));
    std::fs::copy(current_path, &backup_path)?;

    if let Some(expected) = expected_checksum {
        let actual = PluginSupervisor::checksum_file(downloaded_path)?;
        if actual != expected {
            return Ok(UpdateReport {
                success: false,
                rolled_back: true,
                message: format!("checksum mismatch: expected {expected}, got {actual}"),
            });
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(downloaded_path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(downloaded_path, perms)?;
    }

    std::fs::rename(downloaded_path, current_path)?;

    let verified = current_path.exists() && {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::metadata(current_path)
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        }
        #[cfg(not(unix))]
        {
            true
        }
    };

    if verified {
        Ok(UpdateReport {
            success: true,
            rolled_back: false,
            message: "updated".to_string(),
        })
    } else {
        std::fs::copy(&backup_path, current_path)?;
        Ok(UpdateReport {
            success: false,
            rolled_back: true,
            message: "post-update verification failed; restored backup".to_string(),
        })
    }
}

#[allow(dead_code)]
const _UPDATE_DOWNLOAD_TIMEOUT_DOC: Duration = UPDATE_DOWNLOAD_TIMEOUT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_registry_sources_later_wins_by_name() {
        let embedded = vec![PluginRegistryEntry {
            name: "math".into(),
            description: "old".into(),
            path: "old/math".into(),
            version: "1.0.0".into(),
            checksum: None,
            auto_update: false,
            platforms: vec![],
            dependencies: vec![],
        }];
        let local_override = vec![PluginRegistryEntry {
            name: "math".into(),
            description: "new".into(),
            path: "new/math".into(),
            version: "1.1.0".into(),
            checksum: None,
            auto_update: false,
            platforms: vec![],
            dependencies: vec![],
        }];
        let merged = merge_registry_sources(embedded, None, Some(local_override), None, None);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["math"].version, "1.1.0");
    }

    #[test]
    fn resolve_plugin_path_falls_back_to_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_plugin_path(dir.path(), "does-not-exist-anywhere");
        assert_eq!(resolved, dir.path().join("does-not-exist-anywhere"));
    }

    #[tokio::test]
    async fn hot_update_rolls_back_on_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("plugin_bin");
        let downloaded = dir.path().join("plugin_bin.new");
        std::fs::write(&current, b"old-bytes").unwrap();
        std::fs::write(&downloaded, b"new-bytes").unwrap();

        let report = hot_update(
            "math",
            "1.1.0",
            1234,
            &current,
            &downloaded,
            Some("deadbeef"),
            dir.path(),
        )
        .await
        .unwrap();

        assert!(!report.success);
        assert!(report.rolled_back);
        assert_eq!(std::fs::read(&current).unwrap(), b"old-bytes");
    }
}
