//! Client-side execution counter.
//!
//! A [`StatsCounter`] shows a workflow's execution count without blocking
//! on the network: the device-local tier is read synchronously on mount,
//! and the shared count is fetched through the stats function in the
//! background. Refresh failures are logged and otherwise ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use agentdays_core::stats_cache::{
    default_ttl, local_key, CachedCount, CounterDisplay, CounterState, LOCAL_KEY_PREFIX,
};
use agentdays_core::types::Timestamp;
use chrono::Utc;

use crate::invoke::{InvocationClient, InvocationError};

/// Device-local storage for cached counts. Reads and writes are
/// synchronous and must never fail loudly.
pub trait LocalTier: Send + Sync {
    fn read(&self, workflow_name: &str) -> Option<CachedCount>;
    fn write(&self, workflow_name: &str, entry: CachedCount);
}

/// In-process tier; forgets everything on restart.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, CachedCount>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalTier for MemoryTier {
    fn read(&self, workflow_name: &str) -> Option<CachedCount> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&local_key(workflow_name)).copied()
    }

    fn write(&self, workflow_name: &str, entry: CachedCount) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(local_key(workflow_name), entry);
    }
}

/// One JSON file per workflow under a directory.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<prefix><name>.json` with every name byte outside `[A-Za-z0-9-]`
    /// written as `%XX`, so distinct names never share a file.
    fn path_for(&self, workflow_name: &str) -> PathBuf {
        let mut file_name = String::from(LOCAL_KEY_PREFIX);
        for byte in workflow_name.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file_name.push(char::from(byte));
            } else {
                file_name.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{file_name}.json"))
    }
}

impl LocalTier for FileTier {
    fn read(&self, workflow_name: &str) -> Option<CachedCount> {
        let path = self.path_for(workflow_name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read cached count");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable cached count");
                None
            }
        }
    }

    fn write(&self, workflow_name: &str, entry: CachedCount) {
        let path = self.path_for(workflow_name);
        let result = std::fs::create_dir_all(&self.dir)
            .and_then(|()| serde_json::to_vec(&entry).map_err(std::io::Error::other))
            .and_then(|bytes| std::fs::write(&path, bytes));

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write cached count");
        }
    }
}

/// Execution counter for one workflow.
pub struct StatsCounter {
    workflow_name: String,
    client: Arc<InvocationClient>,
    local: Arc<dyn LocalTier>,
    ttl: chrono::Duration,
    state: RwLock<CounterState>,
}

impl StatsCounter {
    pub fn new(
        workflow_name: impl Into<String>,
        client: Arc<InvocationClient>,
        local: Arc<dyn LocalTier>,
    ) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            client,
            local,
            ttl: default_ttl(),
            state: RwLock::new(CounterState::Unknown),
        }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Seed the state from the local tier. Never touches the network.
    pub fn mount(&self) -> CounterState {
        self.mount_at(Utc::now())
    }

    pub fn mount_at(&self, now: Timestamp) -> CounterState {
        let local = self.local.read(&self.workflow_name);
        let state = CounterState::on_mount(local, now, self.ttl);
        self.set_state(state);
        state
    }

    pub fn state(&self) -> CounterState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn display(&self) -> CounterDisplay {
        self.state().display()
    }

    /// Fetch the shared count once.
    ///
    /// Returns `true` when the state was updated. On failure the current
    /// state is kept and the error is only logged.
    pub async fn refresh(&self) -> bool {
        match self.fetch().await {
            Ok(entry) => {
                self.commit_fetched(entry, Utc::now());
                self.local.write(&self.workflow_name, entry);
                tracing::debug!(
                    workflow = %self.workflow_name,
                    count = entry.count,
                    "Execution count refreshed",
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    workflow = %self.workflow_name,
                    error = %e,
                    "Failed to refresh execution count",
                );
                false
            }
        }
    }

    /// Refresh unless the current value is fresh.
    pub async fn refresh_if_needed(&self) -> bool {
        if self.state().needs_refresh() {
            self.refresh().await
        } else {
            false
        }
    }

    /// Fire-and-forget [`refresh_if_needed`](Self::refresh_if_needed).
    pub fn spawn_refresh(self: &Arc<Self>) -> tokio::task::JoinHandle<bool> {
        let counter = Arc::clone(self);
        tokio::spawn(async move { counter.refresh_if_needed().await })
    }

    /// Age the current value against `now`.
    pub fn tick(&self, now: Timestamp) -> CounterState {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = state.on_tick(now, self.ttl);
        *state
    }

    /// Apply a fetched count under a single write guard.
    fn commit_fetched(&self, entry: CachedCount, now: Timestamp) -> CounterState {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = state.on_fetched(entry, now, self.ttl);
        *state
    }

    async fn fetch(&self) -> Result<CachedCount, InvocationError> {
        let response = self.client.workflow_stats(&self.workflow_name, false).await?;
        Ok(CachedCount {
            count: response.count,
            cached_at: response.cached_at.unwrap_or_else(Utc::now),
        })
    }

    fn set_state(&self, next: CounterState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}
