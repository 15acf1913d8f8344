//! Durable credential storage.
//!
//! The file-backed store is what lets a restarted process resume an
//! authenticated session without logging in again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::credential::Credential;
use crate::error::{AuthError, Result};

/// Default credential file name within the data directory.
pub const CREDENTIAL_FILE: &str = "credentials.json";

/// Trait for persisting the credential pair.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Load the stored credential, if any.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Persist a credential, replacing any previous one.
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential.
    async fn clear(&self) -> Result<()>;

    /// Whether a credential exists in storage.
    fn has_credential(&self) -> bool;
}

/// Shared credential store for use across async contexts.
pub type SharedCredentialStore = Arc<dyn CredentialStore>;

/// Create a shared file-backed store under `data_dir`.
pub fn create_file_store(data_dir: &Path) -> SharedCredentialStore {
    Arc::new(FileCredentialStore::new(data_dir))
}

/// Create a shared in-memory store (tests, ephemeral sessions).
pub fn create_memory_store() -> SharedCredentialStore {
    Arc::new(MemoryCredentialStore::new())
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// File-backed credential store for production use.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cached: Arc<RwLock<Option<Credential>>>,
}

impl FileCredentialStore {
    /// Create a store writing to `data_dir/credentials.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CREDENTIAL_FILE),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a store with a custom file path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// The credential file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    fn has_credential(&self) -> bool {
        self.path.exists()
    }

    async fn load(&self) -> Result<Option<Credential>> {
        {
            let cache = self.cached.read().await;
            if cache.is_some() {
                return Ok(cache.clone());
            }
        }

        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| AuthError::Storage(format!("Failed to read credential file: {}", e)))?;

        let credential: Credential = serde_json::from_str(&content).map_err(|e| {
            AuthError::Serialization(format!("Failed to parse credential file: {}", e))
        })?;

        let mut cache = self.cached.write().await;
        *cache = Some(credential.clone());

        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Storage(format!("Failed to create credential directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(credential).map_err(|e| {
            AuthError::Serialization(format!("Failed to serialize credential: {}", e))
        })?;

        std::fs::write(&self.path, json)
            .map_err(|e| AuthError::Storage(format!("Failed to write credential file: {}", e)))?;

        let mut cache = self.cached.write().await;
        *cache = Some(credential.clone());

        tracing::debug!("Credential saved to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                AuthError::Storage(format!("Failed to delete credential file: {}", e))
            })?;
        }
        let mut cache = self.cached.write().await;
        *cache = None;
        Ok(())
    }
}

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn has_credential(&self) -> bool {
        self.slot
            .try_read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let mut slot = self.slot.write().await;
        *slot = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut slot = self.slot.write().await;
        *slot = None;
        Ok(())
    }
}
