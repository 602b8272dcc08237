use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::errors::ResourceKind;
use crate::resource::collection::Collection;
use crate::resource::index::Index;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The last remote observation of a managed resource.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Observation {
    Index(Index),
    Collection(Collection),
}

impl Observation {
    pub fn key(&self) -> StateKey {
        match self {
            Observation::Index(index) => StateKey::index(&index.name),
            Observation::Collection(collection) => StateKey::collection(&collection.name),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Observation::Index(index) => &index.name,
            Observation::Collection(collection) => &collection.name,
        }
    }

    /// The backend's state label, e.g. "Initializing" or "Ready".
    pub fn state_label(&self) -> &str {
        match self {
            Observation::Index(index) => &index.status.state,
            Observation::Collection(collection) => collection.status.as_deref().unwrap_or("unknown"),
        }
    }
}

/// Durable-state key: resource kind and identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl StateKey {
    pub fn index(name: &str) -> Self {
        StateKey {
            kind: ResourceKind::Index,
            name: name.to_owned(),
        }
    }

    pub fn collection(name: &str) -> Self {
        StateKey {
            kind: ResourceKind::Collection,
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Durable record of observed remote state.
///
/// `persist` is an upsert keyed by `Observation::key`, so calling it with the
/// same observation twice leaves the store unchanged.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn persist(&self, observation: &Observation) -> Result<(), StateError>;
    async fn remove(&self, key: &StateKey) -> Result<(), StateError>;
    async fn get(&self, key: &StateKey) -> Result<Option<Observation>, StateError>;
    async fn list(&self) -> Result<Vec<Observation>, StateError>;
}

#[derive(Default)]
pub struct MemoryStateStore {
    records: RwLock<BTreeMap<StateKey, Observation>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn persist(&self, observation: &Observation) -> Result<(), StateError> {
        self.records
            .write()
            .await
            .insert(observation.key(), observation.clone());
        Ok(())
    }

    async fn remove(&self, key: &StateKey) -> Result<(), StateError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn get(&self, key: &StateKey) -> Result<Option<Observation>, StateError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<Observation>, StateError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct StateFile {
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    resources: Vec<Observation>,
}

/// A `StateStore` kept in a single JSON file.
///
/// Every write replaces the file through a rename, so a crash mid-write leaves
/// the previous contents in place.
pub struct FileStateStore {
    path: PathBuf,
    records: Mutex<BTreeMap<StateKey, Observation>>,
}

impl FileStateStore {
    /// Open the store at `path`, loading its records if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: StateFile = serde_json::from_slice(&bytes)?;
                file.resources
                    .into_iter()
                    .map(|observation| (observation.key(), observation))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(FileStateStore {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, records: &BTreeMap<StateKey, Observation>) -> Result<(), StateError> {
        let file = StateFile {
            updated_at: Some(Utc::now()),
            resources: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn persist(&self, observation: &Observation) -> Result<(), StateError> {
        let mut records = self.records.lock().await;
        let key = observation.key();
        let previous = records.insert(key.clone(), observation.clone());
        if let Err(err) = self.flush(&records).await {
            // Keep memory in line with what is on disk.
            match previous {
                Some(previous) => records.insert(key, previous),
                None => records.remove(&key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn remove(&self, key: &StateKey) -> Result<(), StateError> {
        let mut records = self.records.lock().await;
        if let Some(previous) = records.remove(key) {
            if let Err(err) = self.flush(&records).await {
                records.insert(key.clone(), previous);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &StateKey) -> Result<Option<Observation>, StateError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<Observation>, StateError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::index::{IndexStatus, Metric, Placement, ServerlessSpec, Cloud};
    use tokio_test::block_on;

    fn index(state: &str) -> Observation {
        Observation::Index(Index {
            name: "widget".to_owned(),
            dimension: 512,
            metric: Metric::Cosine,
            host: None,
            spec: Placement::Serverless(ServerlessSpec {
                cloud: Cloud::Aws,
                region: "us-east-1".to_owned(),
            }),
            status: IndexStatus {
                ready: state == "Ready",
                state: state.to_owned(),
            },
        })
    }

    fn collection() -> Observation {
        Observation::Collection(Collection {
            name: "snap".to_owned(),
            source: Some("widget".to_owned()),
            size: Some(2048),
            status: Some("Ready".to_owned()),
            dimension: Some(512),
            vector_count: None,
        })
    }

    #[test]
    fn test_memory_store_upserts_by_key() {
        block_on(async {
            let store = MemoryStateStore::new();
            store.persist(&index("Initializing")).await.unwrap();
            store.persist(&index("Ready")).await.unwrap();
            store.persist(&collection()).await.unwrap();

            let records = store.list().await.unwrap();
            assert_eq!(records.len(), 2);
            let current = store.get(&StateKey::index("widget")).await.unwrap().unwrap();
            assert_eq!(current.state_label(), "Ready");

            store.remove(&StateKey::index("widget")).await.unwrap();
            assert!(store.get(&StateKey::index("widget")).await.unwrap().is_none());
        })
    }

    #[test]
    fn test_file_store_survives_reopen() {
        block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.json");

            let store = FileStateStore::open(&path).await.unwrap();
            store.persist(&index("Initializing")).await.unwrap();
            store.persist(&collection()).await.unwrap();
            store.persist(&index("Ready")).await.unwrap();
            drop(store);

            let reopened = FileStateStore::open(&path).await.unwrap();
            let records = reopened.list().await.unwrap();
            assert_eq!(records, vec![index("Ready"), collection()]);

            reopened.remove(&StateKey::collection("snap")).await.unwrap();
            let reopened = FileStateStore::open(&path).await.unwrap();
            assert_eq!(reopened.list().await.unwrap(), vec![index("Ready")]);
        })
    }

    #[test]
    fn test_file_store_keeps_last_good_record_when_flush_fails() {
        block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let state_dir = dir.path().join("state");
            std::fs::create_dir(&state_dir).unwrap();

            let store = FileStateStore::open(state_dir.join("state.json")).await.unwrap();
            store.persist(&index("Initializing")).await.unwrap();
            store.persist(&collection()).await.unwrap();

            // Nothing can be written once the directory is gone.
            std::fs::remove_dir_all(&state_dir).unwrap();

            match store.persist(&index("Ready")).await {
                Err(StateError::Io(_)) => {}
                other => panic!("Expected IO error, got {:?}", other),
            }
            let current = store.get(&StateKey::index("widget")).await.unwrap().unwrap();
            assert_eq!(current.state_label(), "Initializing");

            assert!(matches!(
                store.remove(&StateKey::collection("snap")).await,
                Err(StateError::Io(_))
            ));
            assert_eq!(
                store.get(&StateKey::collection("snap")).await.unwrap(),
                Some(collection())
            );
            assert_eq!(store.list().await.unwrap().len(), 2);
        })
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.json");
            tokio::fs::write(&path, b"not json").await.unwrap();
            match FileStateStore::open(&path).await {
                Err(StateError::Serde(_)) => {}
                Err(other) => panic!("Expected serde error, got {:?}", other),
                Ok(_) => panic!("Expected serde error, got a store"),
            }
        })
    }

    #[test]
    fn test_observation_is_tagged_by_kind() {
        let value = serde_json::to_value(&collection()).unwrap();
        assert_eq!(value["kind"], "collection");
        assert_eq!(value["name"], "snap");
        assert_eq!(collection().key().to_string(), "collection/snap");
    }
}
