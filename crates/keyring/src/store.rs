//! Persistence backends for key records.
use async_trait::async_trait;
use std::{collections::HashMap, path::PathBuf};
use tokio::{fs, sync::RwLock};

use crate::{KeyRecord, Result};
use conclave_protocol::{canonical_bytes, PublicKey};

/// Persistent map from public key to key record.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Insert or replace a record.
    async fn upsert(&self, record: &KeyRecord) -> Result<()>;

    /// Get a record.
    async fn get(
        &self,
        public_key: &PublicKey,
    ) -> Result<Option<KeyRecord>>;

    /// Remove a record.
    async fn remove(&self, public_key: &PublicKey) -> Result<()>;

    /// List all records.
    async fn list(&self) -> Result<Vec<KeyRecord>>;
}

/// In-memory key store.
#[derive(Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<PublicKey, KeyRecord>>,
}

impl MemoryKeyStore {
    /// Create an empty in-memory key store.
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn upsert(&self, record: &KeyRecord) -> Result<()> {
        let mut writer = self.records.write().await;
        writer.insert(record.public_key, record.clone());
        Ok(())
    }

    async fn get(
        &self,
        public_key: &PublicKey,
    ) -> Result<Option<KeyRecord>> {
        let reader = self.records.read().await;
        Ok(reader.get(public_key).cloned())
    }

    async fn remove(&self, public_key: &PublicKey) -> Result<()> {
        let mut writer = self.records.write().await;
        writer.remove(public_key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<KeyRecord>> {
        let reader = self.records.read().await;
        Ok(reader.values().cloned().collect())
    }
}

/// Key store over a directory of JSON files.
///
/// Each record is written as canonical JSON to a file named by
/// the hex encoding of its public key.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open a file key store, creating the directory when it
    /// does not exist.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !fs::try_exists(&dir).await? {
            fs::create_dir_all(&dir).await?;
        }
        Ok(Self { dir })
    }

    fn path(&self, public_key: &PublicKey) -> PathBuf {
        self.dir.join(format!("{}.json", public_key))
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn upsert(&self, record: &KeyRecord) -> Result<()> {
        let buffer = canonical_bytes(record)?;
        fs::write(self.path(&record.public_key), buffer).await?;
        Ok(())
    }

    async fn get(
        &self,
        public_key: &PublicKey,
    ) -> Result<Option<KeyRecord>> {
        let path = self.path(public_key);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let contents = fs::read(path).await?;
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    async fn remove(&self, public_key: &PublicKey) -> Result<()> {
        let path = self.path(public_key);
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<KeyRecord>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry
                .path()
                .extension()
                .map(|e| e == "json")
                .unwrap_or(false)
            {
                let contents = fs::read(entry.path()).await?;
                records.push(serde_json::from_slice(&contents)?);
            }
        }
        Ok(records)
    }
}
