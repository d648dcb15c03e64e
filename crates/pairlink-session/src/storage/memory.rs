//! In-memory credential storage.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use pairlink_core::traits::{CredentialStore, StoreError};
use serde_json::Value;

/// In-memory storage implementation.
///
/// Useful for development and tests.
/// Data is lost on restart.
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Value>>,
    wipes: AtomicUsize,
    fail_wipes: AtomicBool,
}

impl MemoryCredentialStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            wipes: AtomicUsize::new(0),
            fail_wipes: AtomicBool::new(false),
        }
    }

    /// Number of wipes requested so far, failed ones included.
    #[must_use]
    pub fn wipe_count(&self) -> usize {
        self.wipes.load(Ordering::SeqCst)
    }

    /// Make subsequent wipes fail without clearing anything.
    pub fn fail_wipes(&self, fail: bool) {
        self.fail_wipes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ensure_root(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn write(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        self.wipes.fetch_add(1, Ordering::SeqCst);
        if self.fail_wipes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("wipe disabled".to_string()));
        }
        self.entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .clear();
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .is_empty())
    }
}
