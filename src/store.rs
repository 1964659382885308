//! Identity-to-account credential persistence.
//!
//! The gateway provisions one game account per chat identity and has to
//! remember the mapping across restarts. The store is a plain key-value
//! surface: callers pass the timestamp so record ages stay deterministic
//! under test. Failures propagate instead of being retried.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, Result};

/// One identity's provisioned game account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Chat-platform identity key.
    pub identity: String,
    /// Provisioned game account name.
    pub account: String,
    /// Derived account password.
    pub password: String,
    /// Unix seconds when the record was first created.
    pub created_ts: u64,
    /// Unix seconds of the most recent interaction.
    pub last_seen_ts: u64,
    /// Last chat display name seen for this identity.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Idempotent key-value persistence for account credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or refresh the identity's record. Re-upserts keep the
    /// original `created_ts` and move `last_seen_ts` forward.
    async fn upsert(
        &self,
        identity: &str,
        account: &str,
        password: &str,
        now_ts: u64,
        display_name: Option<&str>,
    ) -> Result<UserRecord>;

    /// Fetch the identity's record, if any.
    async fn get(&self, identity: &str) -> Result<Option<UserRecord>>;
}

/// Current Unix time in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn apply_upsert(
    records: &mut HashMap<String, UserRecord>,
    identity: &str,
    account: &str,
    password: &str,
    now_ts: u64,
    display_name: Option<&str>,
) -> UserRecord {
    let record = records
        .entry(identity.to_string())
        .and_modify(|existing| {
            existing.account = account.to_string();
            existing.password = password.to_string();
            existing.last_seen_ts = now_ts;
            if let Some(name) = display_name {
                existing.display_name = Some(name.to_string());
            }
        })
        .or_insert_with(|| UserRecord {
            identity: identity.to_string(),
            account: account.to_string(),
            password: password.to_string(),
            created_ts: now_ts,
            last_seen_ts: now_ts,
            display_name: display_name.map(str::to_string),
        });
    record.clone()
}

/// JSON-file-backed credential store.
///
/// The whole record set is held in memory and rewritten through a
/// temp-file rename on every change, so a crash mid-write cannot leave
/// a torn file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<String, UserRecord>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating parent directories as
    /// needed. A missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let records = if path.exists() {
            let bytes = fs::read(&path)?;
            let list: Vec<UserRecord> = serde_json::from_slice(&bytes)
                .map_err(|e| GatewayError::Store(format!("corrupt store file: {e}")))?;
            list.into_iter()
                .map(|record| (record.identity.clone(), record))
                .collect()
        } else {
            HashMap::new()
        };

        debug!("credential store: {} records loaded", records.len());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save(&self, records: &HashMap<String, UserRecord>) -> Result<()> {
        let mut list: Vec<&UserRecord> = records.values().collect();
        list.sort_by(|a, b| a.identity.cmp(&b.identity));
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| GatewayError::Store(format!("serialize failed: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Filesystem path backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn upsert(
        &self,
        identity: &str,
        account: &str,
        password: &str,
        now_ts: u64,
        display_name: Option<&str>,
    ) -> Result<UserRecord> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::LockPoisoned)?;
        let record = apply_upsert(&mut records, identity, account, password, now_ts, display_name);
        self.save(&records)?;
        Ok(record)
    }

    async fn get(&self, identity: &str) -> Result<Option<UserRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| GatewayError::LockPoisoned)?;
        Ok(records.get(identity).cloned())
    }
}

/// In-memory credential store for tests and embedders that persist
/// elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn upsert(
        &self,
        identity: &str,
        account: &str,
        password: &str,
        now_ts: u64,
        display_name: Option<&str>,
    ) -> Result<UserRecord> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::LockPoisoned)?;
        Ok(apply_upsert(&mut records, identity, account, password, now_ts, display_name))
    }

    async fn get(&self, identity: &str) -> Result<Option<UserRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| GatewayError::LockPoisoned)?;
        Ok(records.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("users.json")).unwrap();

        store
            .upsert("u1", "chat_u1", "pw_abc", 100, Some("Ada"))
            .await
            .unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.account, "chat_u1");
        assert_eq!(record.created_ts, 100);
        assert_eq!(record.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("users.json")).unwrap();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reupsert_preserves_created_ts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("users.json")).unwrap();

        store.upsert("u1", "chat_u1", "pw_a", 100, None).await.unwrap();
        let record = store
            .upsert("u1", "chat_u1", "pw_b", 200, Some("Renamed"))
            .await
            .unwrap();

        assert_eq!(record.created_ts, 100);
        assert_eq!(record.last_seen_ts, 200);
        assert_eq!(record.password, "pw_b");
        assert_eq!(record.display_name.as_deref(), Some("Renamed"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_reads_back_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store
                .upsert("u1", "chat_u1", "pw_a", 100, Some("Ada"))
                .await
                .unwrap();
            store.upsert("u2", "chat_u2", "pw_b", 150, None).await.unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        let record = reopened.get("u1").await.unwrap().unwrap();
        assert_eq!(record.password, "pw_a");
        assert_eq!(record.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/users.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.upsert("u1", "chat_u1", "pw_a", 100, None).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"not json at all").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, GatewayError::Store(_)));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.upsert("u1", "chat_u1", "pw_a", 100, None).await.unwrap();
        let record = store
            .upsert("u1", "chat_u1", "pw_a", 250, Some("Ada"))
            .await
            .unwrap();
        assert_eq!(record.created_ts, 100);
        assert_eq!(record.last_seen_ts, 250);
        assert!(store.get("u2").await.unwrap().is_none());
    }

    #[test]
    fn test_unix_timestamp_moves_forward() {
        // Sanity only: epoch seconds should be well past 2020.
        assert!(unix_timestamp() > 1_577_836_800);
    }
}
