use std::time::Duration;

use log::{debug, error, info};

use crate::errors::{Error, Operation, ResourceKind};
use crate::metrics;
use crate::resource::{describe_failed, Context, Failure};
use crate::state::{Observation, StateKey};
use crate::wait;

pub mod collection;
pub use collection::*;

const KIND: ResourceKind = ResourceKind::Collection;

/// Drives collections through create, read and delete. Collections are
/// immutable once created, so update only refreshes the observation.
#[derive(Clone)]
pub struct CollectionReconciler {
    ctx: Context,
}

impl CollectionReconciler {
    pub fn new(ctx: Context) -> Self {
        CollectionReconciler { ctx }
    }

    /// Create the collection and wait until its status reads `Ready`.
    pub async fn create(&self, desired: &CollectionManifest) -> Result<Collection, Error> {
        let result = self.try_create(desired).await;
        metrics::operation_finished(KIND, Operation::Create, &result);
        result
    }

    async fn try_create(&self, desired: &CollectionManifest) -> Result<Collection, Error> {
        desired.validate()?;
        info!(
            "Creating collection '{}' from index '{}'",
            desired.name, desired.source
        );

        if let Err(source) = self
            .ctx
            .client
            .create_collection(&CreateCollection::from(desired))
            .await
        {
            metrics::remote_error_happened(KIND, "create", &source);
            error!("Failed to create collection '{}': {}", desired.name, source);
            return Err(Error::CreateFailed {
                kind: KIND,
                name: desired.name.clone(),
                last_state: self.ctx.last_state(&StateKey::collection(&desired.name)).await,
                source,
            });
        }

        let timeout = desired
            .timeouts
            .create
            .unwrap_or(self.ctx.config.collection_create_timeout);
        self.await_ready(&desired.name, Some(&desired.source), timeout)
            .await
    }

    /// Poll the collection until it is ready, persisting each observation.
    pub async fn await_ready(
        &self,
        name: &str,
        source: Option<&str>,
        timeout: Duration,
    ) -> Result<Collection, Error> {
        let options = self.ctx.wait_options(timeout);
        let result = wait::until_converged(
            &options,
            || self.probe(name, source, Operation::Create),
            Collection::is_ready,
            |collection: Collection| self.ctx.checkpoint(Observation::Collection(collection)),
        )
        .await;

        match result {
            Ok(collection) => {
                info!(
                    "Collection '{}' is ready ({} bytes)",
                    name,
                    collection.size.unwrap_or_default()
                );
                Ok(collection)
            }
            Err(err) => Err(self.ctx.wait_failed(
                KIND,
                name,
                Operation::Create,
                timeout,
                err.map_last(Observation::Collection),
            )),
        }
    }

    /// One describe call. The source is taken from the previous record.
    pub async fn read(&self, name: &str) -> Result<Collection, Error> {
        let result = self.read_with_source(name, None).await;
        metrics::operation_finished(KIND, Operation::Read, &result);
        result
    }

    async fn read_with_source(&self, name: &str, source: Option<&str>) -> Result<Collection, Error> {
        let source = match source {
            Some(source) => Some(source.to_owned()),
            None => self.known_source(name).await?,
        };
        let description = self
            .ctx
            .client
            .describe_collection(name)
            .await
            .map_err(|err| {
                metrics::remote_error_happened(KIND, "describe", &err);
                describe_failed(KIND, name, Operation::Read, err)
            })?;
        let collection = Collection::observed(description, source);
        debug!(
            "Read collection '{}' with status {}",
            name,
            collection.status.as_deref().unwrap_or("unknown")
        );
        self.ctx
            .persist(&Observation::Collection(collection.clone()))
            .await?;
        Ok(collection)
    }

    /// Adopt a collection which already exists remotely.
    pub async fn import(&self, name: &str) -> Result<Collection, Error> {
        info!("Importing collection '{}'", name);
        self.read(name).await
    }

    /// Collections cannot be changed: this only refreshes the observation.
    /// A source differing from the recorded one is refused, not written.
    pub async fn update(&self, desired: &CollectionManifest) -> Result<Collection, Error> {
        let result = self.try_update(desired).await;
        metrics::operation_finished(KIND, Operation::Update, &result);
        result
    }

    async fn try_update(&self, desired: &CollectionManifest) -> Result<Collection, Error> {
        desired.validate()?;
        self.check_source(desired).await?;
        debug!("Collection '{}' does not support updates", desired.name);
        self.read_with_source(&desired.name, Some(&desired.source))
            .await
    }

    /// Delete the collection and wait until describing it returns not-found.
    pub async fn delete(&self, name: &str, timeout: Option<Duration>) -> Result<(), Error> {
        let result = self.try_delete(name, timeout).await;
        metrics::operation_finished(KIND, Operation::Delete, &result);
        result
    }

    async fn try_delete(&self, name: &str, timeout: Option<Duration>) -> Result<(), Error> {
        let key = StateKey::collection(name);
        let source = self.known_source(name).await?;
        info!("Deleting collection '{}'", name);
        if let Err(err) = self.ctx.client.delete_collection(name).await {
            if err.is_not_found() {
                debug!("Collection '{}' was already gone", name);
            } else {
                metrics::remote_error_happened(KIND, "delete", &err);
                error!("Failed to delete collection '{}': {}", name, err);
                return Err(Error::DeleteFailed {
                    kind: KIND,
                    name: name.to_owned(),
                    last_state: self.ctx.last_state(&key).await,
                    source: err,
                });
            }
        }

        let timeout = timeout.unwrap_or(self.ctx.config.collection_delete_timeout);
        let options = self.ctx.wait_options(timeout);
        wait::until_absent(
            &options,
            || self.probe(name, source.as_deref(), Operation::Delete),
            Failure::is_not_found,
            |collection: Collection| {
                info!(
                    "Deleting collection '{}'. Status: '{}'",
                    name,
                    collection.status.as_deref().unwrap_or("unknown")
                );
                self.ctx.checkpoint(Observation::Collection(collection))
            },
        )
        .await
        .map_err(|err| {
            self.ctx.wait_failed(
                KIND,
                name,
                Operation::Delete,
                timeout,
                err.map_last(Observation::Collection),
            )
        })?;

        self.ctx.state.remove(&key).await?;
        info!("Collection '{}' deleted", name);
        Ok(())
    }

    /// Every collection visible to the client. Nothing is persisted.
    pub async fn list(&self) -> Result<Vec<Collection>, Error> {
        let result = match self.ctx.client.list_collections().await {
            Ok(descriptions) => Ok(descriptions
                .into_iter()
                .map(|description| Collection::observed(description, None))
                .collect()),
            Err(source) => {
                metrics::remote_error_happened(KIND, "list", &source);
                Err(Error::Transport {
                    operation: Operation::List,
                    kind: KIND,
                    name: "*".to_owned(),
                    source,
                })
            }
        };
        metrics::operation_finished(KIND, Operation::List, &result);
        result
    }

    /// Drive the collection towards `desired` starting from its current remote state.
    pub async fn reconcile(&self, desired: &CollectionManifest) -> Result<Collection, Error> {
        desired.validate()?;
        self.check_source(desired).await?;

        let current = match self.read_with_source(&desired.name, Some(&desired.source)).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                info!("Collection '{}' does not exist", desired.name);
                return self.create(desired).await;
            }
            Err(err) => return Err(err),
        };

        if current.is_ready() {
            debug!("Collection '{}' is up to date", desired.name);
            return Ok(current);
        }
        info!(
            "Collection '{}' is {}; waiting for it to become ready",
            desired.name,
            current.status.as_deref().unwrap_or("unknown")
        );
        let timeout = desired
            .timeouts
            .create
            .unwrap_or(self.ctx.config.collection_create_timeout);
        self.await_ready(&desired.name, Some(&desired.source), timeout)
            .await
    }

    async fn check_source(&self, desired: &CollectionManifest) -> Result<(), Error> {
        match self.known_source(&desired.name).await? {
            Some(recorded) if recorded != desired.source => Err(Error::Immutable {
                kind: KIND,
                name: desired.name.clone(),
                field: "source",
                current: recorded,
                desired: desired.source.clone(),
            }),
            _ => Ok(()),
        }
    }

    async fn known_source(&self, name: &str) -> Result<Option<String>, Error> {
        match self.ctx.state.get(&StateKey::collection(name)).await? {
            Some(Observation::Collection(collection)) => Ok(collection.source),
            _ => Ok(None),
        }
    }

    async fn probe(
        &self,
        name: &str,
        source: Option<&str>,
        operation: Operation,
    ) -> Result<Collection, Failure> {
        metrics::probe_happened(KIND, operation);
        match self.ctx.client.describe_collection(name).await {
            Ok(description) => Ok(Collection::observed(description, source.map(str::to_owned))),
            Err(err) => {
                if !err.is_not_found() {
                    metrics::remote_error_happened(KIND, "describe", &err);
                }
                Err(Failure::Remote(err))
            }
        }
    }
}
