use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{error, info, warn};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub mod client;
pub mod errors;
pub mod manifest;
pub mod metrics;
pub mod resource;
pub mod state;
pub mod utils;
pub mod views;
pub mod wait;

use crate::client::RemoteClient;
use crate::errors::{Error, ResourceKind};
use crate::manifest::DesiredState;
use crate::resource::collection::Collection;
use crate::resource::index::Index;
use crate::state::{Observation, StateStore};
use crate::utils::resource_names;

pub use crate::resource::{CollectionReconciler, Context, IndexReconciler, ReconcilerConfig};

pub const ENV_PREFIX: &str = "INDEX_CONTROLLER_";

fn default_server_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_server_port() -> u16 {
    8888
}

fn default_state_file() -> String {
    "index-controller-state.json".to_owned()
}

fn default_manifest() -> String {
    "indexes.yaml".to_owned()
}

/// Raw settings read from `INDEX_CONTROLLER_*` environment variables.
#[derive(Deserialize, Debug, Clone)]
pub struct EnvironmentConfig {
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default, with = "utils::optional_duration")]
    pub poll_interval: Option<Duration>,
    #[serde(default, with = "utils::optional_duration")]
    pub resync_interval: Option<Duration>,
    #[serde(default, with = "utils::optional_duration")]
    pub index_create_timeout: Option<Duration>,
    #[serde(default, with = "utils::optional_duration")]
    pub index_delete_timeout: Option<Duration>,
    #[serde(default, with = "utils::optional_duration")]
    pub collection_create_timeout: Option<Duration>,
    #[serde(default, with = "utils::optional_duration")]
    pub collection_delete_timeout: Option<Duration>,
}

impl EnvironmentConfig {
    pub fn from_env() -> Result<Self, Error> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<EnvironmentConfig>()
            .map_err(|err| Error::Config(err.to_string()))
    }
}

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub state_file: PathBuf,
    pub manifest: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub resync_interval: Duration,
    pub reconciler: ReconcilerConfig,
}

impl Config {
    pub fn from_env_config(env_config: EnvironmentConfig) -> Result<Self, Error> {
        if env_config.api_url.trim().is_empty() {
            return Err(Error::Config(format!("{}API_URL is empty", ENV_PREFIX)));
        }
        if env_config.api_key.trim().is_empty() {
            return Err(Error::Config(format!("{}API_KEY is empty", ENV_PREFIX)));
        }
        let defaults = ReconcilerConfig::default();
        let reconciler = ReconcilerConfig {
            index_create_timeout: env_config
                .index_create_timeout
                .unwrap_or(defaults.index_create_timeout),
            index_delete_timeout: env_config
                .index_delete_timeout
                .unwrap_or(defaults.index_delete_timeout),
            collection_create_timeout: env_config
                .collection_create_timeout
                .unwrap_or(defaults.collection_create_timeout),
            collection_delete_timeout: env_config
                .collection_delete_timeout
                .unwrap_or(defaults.collection_delete_timeout),
            poll_interval: env_config.poll_interval.unwrap_or(defaults.poll_interval),
        };
        if reconciler.poll_interval.is_zero() {
            return Err(Error::Config(format!("{}POLL_INTERVAL must be positive", ENV_PREFIX)));
        }

        Ok(Config {
            api_url: env_config.api_url,
            api_key: env_config.api_key,
            state_file: PathBuf::from(env_config.state_file),
            manifest: PathBuf::from(env_config.manifest),
            server_host: env_config.server_host,
            server_port: env_config.server_port,
            resync_interval: env_config.resync_interval.unwrap_or(DEFAULT_RESYNC_INTERVAL),
            reconciler,
        })
    }
}

/// Outcome of one reconcile pass over a `DesiredState`.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub indexes: Vec<(String, Result<Index, Error>)>,
    pub collections: Vec<(String, Result<Collection, Error>)>,
    pub deleted: Vec<(ResourceKind, String, Result<(), Error>)>,
}

impl ReconcileReport {
    pub fn failures(&self) -> usize {
        self.indexes.iter().filter(|(_, result)| result.is_err()).count()
            + self.collections.iter().filter(|(_, result)| result.is_err()).count()
            + self.deleted.iter().filter(|(_, _, result)| result.is_err()).count()
    }
}

/// Both reconcilers plus the durable state they write to.
#[derive(Clone)]
pub struct Controller {
    pub indexes: IndexReconciler,
    pub collections: CollectionReconciler,
    pub state: Arc<dyn StateStore>,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(ctx: Context) -> Self {
        Controller {
            indexes: IndexReconciler::new(ctx.clone()),
            collections: CollectionReconciler::new(ctx.clone()),
            state: ctx.state.clone(),
            cancel: ctx.cancel,
        }
    }

    /// Cancels every wait this controller is running.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current state of indexes, as last observed
    pub async fn index_state(&self) -> Result<Vec<Index>, Error> {
        Ok(self
            .state
            .list()
            .await?
            .into_iter()
            .filter_map(|observation| match observation {
                Observation::Index(index) => Some(index),
                _ => None,
            })
            .collect())
    }

    /// Current state of collections, as last observed
    pub async fn collection_state(&self) -> Result<Vec<Collection>, Error> {
        Ok(self
            .state
            .list()
            .await?
            .into_iter()
            .filter_map(|observation| match observation {
                Observation::Collection(collection) => Some(collection),
                _ => None,
            })
            .collect())
    }

    /// Make the remote state match `desired`.
    ///
    /// Recorded resources missing from `desired` are deleted first, collections
    /// before indexes. Then indexes are reconciled, then collections; resources
    /// of one kind are handled concurrently.
    pub async fn reconcile_desired_state(&self, desired: &DesiredState) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();
        let recorded = self.state.list().await?;

        let stale_collections: Vec<String> = recorded
            .iter()
            .filter_map(|observation| match observation {
                Observation::Collection(c) if desired.collection(&c.name).is_none() => Some(c.name.clone()),
                _ => None,
            })
            .collect();
        let stale_indexes: Vec<String> = recorded
            .iter()
            .filter_map(|observation| match observation {
                Observation::Index(i) if desired.index(&i.name).is_none() => Some(i.name.clone()),
                _ => None,
            })
            .collect();

        if !stale_collections.is_empty() {
            info!("Deleting collections no longer declared: {}", resource_names(stale_collections.iter().map(String::as_str)));
            let results = join_all(stale_collections.iter().map(|name| self.collections.delete(name, None))).await;
            report.deleted.extend(
                stale_collections
                    .into_iter()
                    .zip(results)
                    .map(|(name, result)| (ResourceKind::Collection, name, result)),
            );
        }
        if !stale_indexes.is_empty() {
            info!("Deleting indexes no longer declared: {}", resource_names(stale_indexes.iter().map(String::as_str)));
            let results = join_all(stale_indexes.iter().map(|name| self.indexes.delete(name, None))).await;
            report.deleted.extend(
                stale_indexes
                    .into_iter()
                    .zip(results)
                    .map(|(name, result)| (ResourceKind::Index, name, result)),
            );
        }

        let results = join_all(desired.indexes.iter().map(|index| self.indexes.reconcile(index))).await;
        report.indexes = desired
            .indexes
            .iter()
            .map(|index| index.name.clone())
            .zip(results)
            .collect();

        // A collection can only be taken from an index that made it this pass.
        let failed_indexes: HashSet<&str> = report
            .indexes
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(name, _)| name.as_str())
            .collect();
        let (runnable, blocked): (Vec<_>, Vec<_>) = desired
            .collections
            .iter()
            .partition(|collection| !failed_indexes.contains(collection.source.as_str()));
        for collection in blocked {
            warn!(
                "Skipping collection '{}': source index '{}' failed to reconcile",
                collection.name, collection.source
            );
        }

        let results = join_all(runnable.iter().map(|collection| self.collections.reconcile(collection))).await;
        report.collections = runnable
            .iter()
            .map(|collection| collection.name.clone())
            .zip(results)
            .collect();

        Ok(report)
    }

    /// Reload the manifest and reconcile every `interval` until shut down.
    pub async fn run(&self, manifest: PathBuf, interval: Duration) {
        while !self.is_shut_down() {
            match DesiredState::load(&manifest).await {
                Ok(desired) => match self.reconcile_desired_state(&desired).await {
                    Ok(report) => log_report(&report),
                    Err(err) => error!("Reconcile pass failed: {}", err),
                },
                Err(err) => error!("Failed to load manifest {}: {}", manifest.display(), err),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {},
                _ = tokio::time::sleep(interval) => {},
            }
        }
        info!("Controller stopped");
    }
}

fn log_report(report: &ReconcileReport) {
    for (name, result) in &report.indexes {
        if let Err(err) = result {
            error!("Index '{}': {}", name, err);
        }
    }
    for (name, result) in &report.collections {
        if let Err(err) = result {
            error!("Collection '{}': {}", name, err);
        }
    }
    for (kind, name, result) in &report.deleted {
        if let Err(err) = result {
            error!("Deleting {} '{}': {}", kind, name, err);
        }
    }
    info!(
        "Reconciled {} indexes and {} collections, deleted {}, {} failures",
        report.indexes.len(),
        report.collections.len(),
        report.deleted.len(),
        report.failures()
    );
}

/// Build a `Controller` and start its resync loop in the background.
pub async fn init_controller(
    client: Arc<dyn RemoteClient>,
    state: Arc<dyn StateStore>,
    config: &Config,
    cancel: CancellationToken,
) -> Controller {
    let ctx = Context::new(client, state, config.reconciler.clone()).with_cancellation(cancel);
    let controller = Controller::new(ctx);

    let c1 = controller.clone();
    let manifest = config.manifest.clone();
    let interval = config.resync_interval;
    tokio::spawn(async move {
        c1.run(manifest, interval).await;
    });

    controller
}
