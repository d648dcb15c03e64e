//! Filesystem credential storage.
//!
//! One JSON file per key inside the session directory. Writes go through a
//! temp file and a rename; writes and wipes share one lock so a wipe never
//! interleaves with a half-written entry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pairlink_core::{
    SessionConfig,
    traits::{CredentialStore, StoreError},
};
use serde_json::Value;
use tokio::{fs, sync::Mutex};

/// Filesystem storage rooted at a session directory.
pub struct FileCredentialStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Create a store over `dir`. Nothing is touched until first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store over `<auth_root>/<session_id>`.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.session_dir())
    }

    /// The session directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_name(key)))
    }
}

/// Map a key onto a safe file stem.
fn file_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir).await?;
        tracing::info!(dir = %self.dir.display(), "credential directory wiped");
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        match fs::read_dir(&self.dir).await {
            Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}
