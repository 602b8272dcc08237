#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use index_controller::client::{RemoteClient, RemoteError, RemoteErrorKind};
use index_controller::resource::collection::{CollectionDescription, CollectionManifest, CreateCollection};
use index_controller::resource::index::{
    Index, IndexConfigure, IndexManifest, IndexSpec, IndexStatus, Metric, Placement, PlacementManifest, PodSpec,
};
use index_controller::state::{MemoryStateStore, Observation, StateError, StateKey, StateStore};
use index_controller::utils::Timeouts;
use index_controller::{Context, ReconcilerConfig};

/// Describe results handed out in order; the last one repeats forever.
struct Script<T> {
    queue: VecDeque<Result<T, RemoteError>>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<Result<T, RemoteError>> {
        if self.queue.len() > 1 {
            self.queue.pop_front()
        } else {
            self.queue.front().cloned()
        }
    }
}

#[derive(Default)]
struct Inner {
    index_describes: HashMap<String, Script<Index>>,
    collection_describes: HashMap<String, Script<CollectionDescription>>,
    create_index_error: Option<RemoteError>,
    create_collection_error: Option<RemoteError>,
    configure_error: Option<RemoteError>,
    delete_error: Option<RemoteError>,
    listed_indexes: Vec<Index>,
    listed_collections: Vec<CollectionDescription>,
    calls: Vec<String>,
}

/// A control plane whose describe answers are scripted per resource name.
#[derive(Clone, Default)]
pub struct FakeControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_index(&self, name: &str, results: Vec<Result<Index, RemoteError>>) {
        self.inner.lock().unwrap().index_describes.insert(
            name.to_owned(),
            Script {
                queue: results.into(),
            },
        );
    }

    pub fn script_collection(&self, name: &str, results: Vec<Result<CollectionDescription, RemoteError>>) {
        self.inner.lock().unwrap().collection_describes.insert(
            name.to_owned(),
            Script {
                queue: results.into(),
            },
        );
    }

    pub fn fail_create_index(&self, err: RemoteError) {
        self.inner.lock().unwrap().create_index_error = Some(err);
    }

    pub fn fail_create_collection(&self, err: RemoteError) {
        self.inner.lock().unwrap().create_collection_error = Some(err);
    }

    pub fn fail_configure(&self, err: RemoteError) {
        self.inner.lock().unwrap().configure_error = Some(err);
    }

    pub fn fail_delete(&self, err: RemoteError) {
        self.inner.lock().unwrap().delete_error = Some(err);
    }

    pub fn list_indexes_returns(&self, indexes: Vec<Index>) {
        self.inner.lock().unwrap().listed_indexes = indexes;
    }

    pub fn list_collections_returns(&self, collections: Vec<CollectionDescription>) {
        self.inner.lock().unwrap().listed_collections = collections;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of calls whose name starts with `prefix`, e.g. "describe_index".
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

fn not_scripted(name: &str) -> RemoteError {
    RemoteError::not_found(format!("'{}' not found", name)).with_status(404)
}

#[async_trait]
impl RemoteClient for FakeControlPlane {
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), RemoteError> {
        self.record(format!("create_index {}", spec.name));
        match self.inner.lock().unwrap().create_index_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn describe_index(&self, name: &str) -> Result<Index, RemoteError> {
        self.record(format!("describe_index {}", name));
        let mut inner = self.inner.lock().unwrap();
        match inner.index_describes.get_mut(name).and_then(Script::next) {
            Some(result) => result,
            None => Err(not_scripted(name)),
        }
    }

    async fn configure_index(&self, name: &str, changes: &IndexConfigure) -> Result<(), RemoteError> {
        self.record(format!(
            "configure_index {} replicas={} pod_type={}",
            name, changes.replicas, changes.pod_type
        ));
        match self.inner.lock().unwrap().configure_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_index(&self, name: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_index {}", name));
        match self.inner.lock().unwrap().delete_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_indexes(&self) -> Result<Vec<Index>, RemoteError> {
        self.record("list_indexes".to_owned());
        Ok(self.inner.lock().unwrap().listed_indexes.clone())
    }

    async fn create_collection(&self, request: &CreateCollection) -> Result<(), RemoteError> {
        self.record(format!("create_collection {} from {}", request.name, request.source));
        match self.inner.lock().unwrap().create_collection_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, RemoteError> {
        self.record(format!("describe_collection {}", name));
        let mut inner = self.inner.lock().unwrap();
        match inner.collection_describes.get_mut(name).and_then(Script::next) {
            Some(result) => result,
            None => Err(not_scripted(name)),
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_collection {}", name));
        match self.inner.lock().unwrap().delete_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescription>, RemoteError> {
        self.record("list_collections".to_owned());
        Ok(self.inner.lock().unwrap().listed_collections.clone())
    }
}

/// A `MemoryStateStore` which also keeps every persisted observation.
#[derive(Default)]
pub struct RecordingStore {
    store: MemoryStateStore,
    persisted: Mutex<Vec<Observation>>,
}

impl RecordingStore {
    pub fn persisted(&self) -> Vec<Observation> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for RecordingStore {
    async fn persist(&self, observation: &Observation) -> Result<(), StateError> {
        self.persisted.lock().unwrap().push(observation.clone());
        self.store.persist(observation).await
    }

    async fn remove(&self, key: &StateKey) -> Result<(), StateError> {
        self.store.remove(key).await
    }

    async fn get(&self, key: &StateKey) -> Result<Option<Observation>, StateError> {
        self.store.get(key).await
    }

    async fn list(&self) -> Result<Vec<Observation>, StateError> {
        self.store.list().await
    }
}

pub fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval: Duration::from_secs(1),
        ..ReconcilerConfig::default()
    }
}

pub fn context(client: &FakeControlPlane, store: &Arc<RecordingStore>) -> Context {
    Context::new(Arc::new(client.clone()), store.clone(), config())
}

pub fn pod_spec(pod_type: &str, replicas: u32) -> PodSpec {
    PodSpec {
        environment: "us-west4-gcp".to_owned(),
        replicas,
        shard_count: 1,
        pod_type: pod_type.to_owned(),
        pod_count: 1,
        metadata_config: None,
        source_collection: None,
    }
}

pub fn index_manifest(name: &str) -> IndexManifest {
    IndexManifest {
        name: name.to_owned(),
        dimension: 512,
        metric: Some(Metric::Cosine),
        spec: PlacementManifest {
            pod: Some(pod_spec("s1.x1", 1)),
            serverless: None,
        },
        timeouts: Timeouts::default(),
    }
}

pub fn index(name: &str, state: &str, ready: bool) -> Index {
    Index {
        name: name.to_owned(),
        dimension: 512,
        metric: Metric::Cosine,
        host: if ready {
            Some(format!("{}-abc123.svc.us-west4-gcp.example.io", name))
        } else {
            None
        },
        spec: Placement::Pod(pod_spec("s1.x1", 1)),
        status: IndexStatus {
            ready,
            state: state.to_owned(),
        },
    }
}

pub fn collection_manifest(name: &str, source: &str) -> CollectionManifest {
    CollectionManifest {
        name: name.to_owned(),
        source: source.to_owned(),
        timeouts: Timeouts::default(),
    }
}

pub fn collection(name: &str, status: &str, size: Option<u64>) -> CollectionDescription {
    CollectionDescription {
        name: name.to_owned(),
        size,
        status: Some(status.to_owned()),
        dimension: Some(512),
        vector_count: None,
    }
}

pub fn transport_error(message: &str) -> RemoteError {
    RemoteError::new(RemoteErrorKind::Transport, message).with_status(500)
}

pub fn validation_error(message: &str) -> RemoteError {
    RemoteError::new(RemoteErrorKind::Validation, message).with_status(400)
}

pub fn not_found() -> RemoteError {
    RemoteError::not_found("not found").with_status(404)
}
