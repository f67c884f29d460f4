//! Persistent key-value storage for the token
//!
//! `KeyValueStore` mirrors the host's global state API: reads are synchronous
//! against an in-memory view, updates are asynchronous and only report
//! success once the value is durable. `MemoryStore` keeps everything in
//! process; `JsonFileStore` backs the view with a JSON object on disk.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Key-value collaborator used by `TokenStore`.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn KeyValueStore>`).
pub trait KeyValueStore: Send + Sync {
    /// Current value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`. Resolves after the write is durable.
    fn update<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn update<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        Box::pin(async { Ok(()) })
    }
}

/// File-backed store holding a flat JSON object of string values.
///
/// Reads are served from memory. Writes are serialized by a tokio Mutex and
/// go through an atomic temp-file + rename; the in-memory view is only
/// updated after the rename succeeds, so a failed write leaves both the file
/// and `get()` at the previous value.
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
    writes: Mutex<()>,
}

impl JsonFileStore {
    /// Load the store from `path`.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start, no token).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading state file: {e}")))?;
            let values: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Serialize(format!("parsing state file: {e}")))?;
            info!(path = %path.display(), keys = values.len(), "loaded state file");
            values
        } else {
            info!(path = %path.display(), "state file not found, starting empty");
            let values = HashMap::new();
            write_atomic(&path, &values).await?;
            values
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
            writes: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.writes.lock().await;

        let mut snapshot = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.insert(key.to_owned(), value.clone());

        write_atomic(&self.path, &snapshot).await?;

        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        debug!(key, "updated state value");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn update<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.persist(key, value))
    }
}

/// Write the state map atomically with 0600 permissions (it holds a token).
async fn write_atomic(path: &Path, values: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(values)
        .map_err(|e| Error::Serialize(format!("serializing state: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("state path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".state.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp state file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting state file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp state file: {e}")))?;

    debug!(path = %path.display(), "persisted state");
    Ok(())
}
