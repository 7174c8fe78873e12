//! Credential storage: session token, remembered login, tenant and depot.
//!
//! The physical backend is pluggable behind [`SecretStore`] — the host OS
//! secret storage on device, a JSON file for the daemon, a map in tests.
//! [`Credentials`] adds the typed accessors the transport and UI need and a
//! token generation counter used by the transport's single-flight re-login.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::warn;

const KEY_TOKEN: &str = "token";
const KEY_USER: &str = "usuario";
const KEY_PASS: &str = "clave";
const KEY_TENANT: &str = "empresa";
const KEY_DEPOT: &str = "deposito";

/// Plain key-value secret backend.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory backend, used by tests and as a session-only store.
#[derive(Default)]
pub struct MemorySecrets {
    map: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.map.write().await.remove(key);
        Ok(())
    }
}

/// JSON-file backend for the sync daemon.
///
/// Values are kept in memory and flushed on every write, so a failed flush
/// still leaves the running session usable.
pub struct FileSecrets {
    path: PathBuf,
    map: RwLock<HashMap<String, String>>,
}

impl FileSecrets {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("corrupt secret file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        Ok(Self {
            path,
            map: RwLock::new(map),
        })
    }

    async fn flush(&self, map: &HashMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[async_trait]
impl SecretStore for FileSecrets {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.write().await;
        map.insert(key.to_string(), value.to_string());
        self.flush(&map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.write().await;
        map.remove(key);
        self.flush(&map).await
    }
}

/// Typed façade over a [`SecretStore`].
///
/// Reads fall back to `None` on a store fault so the transport can treat a
/// missing token and an unreadable token the same way; writes log the fault
/// and keep going rather than failing a login that already succeeded.
pub struct Credentials {
    store: Box<dyn SecretStore>,
    generation: AtomicU64,
}

impl Credentials {
    pub fn new(store: Box<dyn SecretStore>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
        }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(?err, key, "secret store read failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value).await {
            warn!(?err, key, "secret store write failed");
        }
    }

    async fn erase(&self, key: &str) {
        if let Err(err) = self.store.remove(key).await {
            warn!(?err, key, "secret store remove failed");
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.read(KEY_TOKEN).await
    }

    /// Persist a fresh session token and advance the generation counter.
    pub async fn set_token(&self, token: &str) {
        self.write(KEY_TOKEN, token).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn clear_token(&self) {
        self.erase(KEY_TOKEN).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Monotonic counter bumped on every token write. The transport compares
    /// generations to tell "my token is stale" from "someone already
    /// re-logged in for me".
    pub fn token_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Login remembered via the operator's opt-in, if any.
    pub async fn remembered_login(&self) -> Option<(String, String)> {
        let user = self.read(KEY_USER).await?;
        let pass = self.read(KEY_PASS).await?;
        Some((user, pass))
    }

    pub async fn remember(&self, user: &str, pass: &str) {
        self.write(KEY_USER, user).await;
        self.write(KEY_PASS, pass).await;
    }

    pub async fn forget(&self) {
        self.erase(KEY_USER).await;
        self.erase(KEY_PASS).await;
    }

    pub async fn tenant(&self) -> Option<String> {
        self.read(KEY_TENANT).await
    }

    pub async fn set_tenant(&self, tenant: &str) {
        self.write(KEY_TENANT, tenant).await;
    }

    pub async fn depot(&self) -> Option<String> {
        self.read(KEY_DEPOT).await
    }

    pub async fn set_depot(&self, depot: &str) {
        self.write(KEY_DEPOT, depot).await;
    }
}
