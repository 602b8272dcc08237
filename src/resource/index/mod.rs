use std::convert::TryFrom;
use std::time::Duration;

use log::{debug, error, info};

use crate::errors::{Error, Operation, ResourceKind};
use crate::metrics;
use crate::resource::{describe_failed, Context, Failure};
use crate::state::{Observation, StateKey};
use crate::wait;

pub mod index;
pub use index::*;

const KIND: ResourceKind = ResourceKind::Index;

/// Drives indexes through create, read, update and delete.
#[derive(Clone)]
pub struct IndexReconciler {
    ctx: Context,
}

impl IndexReconciler {
    pub fn new(ctx: Context) -> Self {
        IndexReconciler { ctx }
    }

    /// Create the index and wait until the control plane reports it ready.
    ///
    /// Every observation made while waiting is persisted, so a `WaitTimeout`
    /// leaves the last seen state in the store.
    pub async fn create(&self, desired: &IndexManifest) -> Result<Index, Error> {
        let result = self.try_create(desired).await;
        metrics::operation_finished(KIND, Operation::Create, &result);
        result
    }

    async fn try_create(&self, desired: &IndexManifest) -> Result<Index, Error> {
        let spec = IndexSpec::try_from(desired)?;
        info!(
            "Creating index '{}' (dimension {}, metric {}, {} placement)",
            spec.name,
            spec.dimension,
            spec.metric,
            spec.spec.variant()
        );

        if let Err(source) = self.ctx.client.create_index(&spec).await {
            metrics::remote_error_happened(KIND, "create", &source);
            error!("Failed to create index '{}': {}", spec.name, source);
            return Err(Error::CreateFailed {
                kind: KIND,
                last_state: self.ctx.last_state(&StateKey::index(&spec.name)).await,
                name: spec.name,
                source,
            });
        }

        let timeout = desired
            .timeouts
            .create
            .unwrap_or(self.ctx.config.index_create_timeout);
        self.await_ready(&spec.name, timeout).await
    }

    /// Poll the index until it is ready, persisting each observation.
    pub async fn await_ready(&self, name: &str, timeout: Duration) -> Result<Index, Error> {
        let options = self.ctx.wait_options(timeout);
        let result = wait::until_converged(
            &options,
            || self.probe(name, Operation::Create),
            |index: &Index| index.status.ready,
            |index: Index| self.ctx.checkpoint(Observation::Index(index)),
        )
        .await;

        match result {
            Ok(index) => {
                info!("Index '{}' is ready (state: {})", name, index.status.state);
                Ok(index)
            }
            Err(err) => Err(self.ctx.wait_failed(
                KIND,
                name,
                Operation::Create,
                timeout,
                err.map_last(Observation::Index),
            )),
        }
    }

    /// One describe call; not-found is reported as `Error::NotFound`.
    pub async fn read(&self, name: &str) -> Result<Index, Error> {
        let result = self.try_read(name).await;
        metrics::operation_finished(KIND, Operation::Read, &result);
        result
    }

    async fn try_read(&self, name: &str) -> Result<Index, Error> {
        let index = self
            .ctx
            .client
            .describe_index(name)
            .await
            .map_err(|source| {
                metrics::remote_error_happened(KIND, "describe", &source);
                describe_failed(KIND, name, Operation::Read, source)
            })?;
        debug!("Read index '{}' in state {}", name, index.status.state);
        self.ctx.persist(&Observation::Index(index.clone())).await?;
        Ok(index)
    }

    /// Adopt an index which already exists remotely.
    pub async fn import(&self, name: &str) -> Result<Index, Error> {
        info!("Importing index '{}'", name);
        self.read(name).await
    }

    /// Apply replica count and pod type, then read the index once.
    ///
    /// The configure call is not awaited to convergence: the returned index
    /// may still be scaling.
    pub async fn update(&self, desired: &IndexManifest) -> Result<Index, Error> {
        let result = self.try_update(desired).await;
        metrics::operation_finished(KIND, Operation::Update, &result);
        result
    }

    async fn try_update(&self, desired: &IndexManifest) -> Result<Index, Error> {
        let spec = IndexSpec::try_from(desired)?;
        match IndexConfigure::from_spec(&spec) {
            Some(changes) => {
                info!(
                    "Configuring index '{}': {} replicas, pod type {}",
                    spec.name, changes.replicas, changes.pod_type
                );
                if let Err(source) = self.ctx.client.configure_index(&spec.name, &changes).await {
                    metrics::remote_error_happened(KIND, "configure", &source);
                    error!("Failed to configure index '{}': {}", spec.name, source);
                    return Err(Error::UpdateFailed {
                        kind: KIND,
                        name: spec.name,
                        source,
                    });
                }
            }
            None => debug!("Index '{}' has no mutable fields to configure", spec.name),
        }
        self.try_read(&spec.name).await
    }

    /// Delete the index and wait until describing it returns not-found.
    ///
    /// Deleting an index which is already gone succeeds.
    pub async fn delete(&self, name: &str, timeout: Option<Duration>) -> Result<(), Error> {
        let result = self.try_delete(name, timeout).await;
        metrics::operation_finished(KIND, Operation::Delete, &result);
        result
    }

    async fn try_delete(&self, name: &str, timeout: Option<Duration>) -> Result<(), Error> {
        let key = StateKey::index(name);
        info!("Deleting index '{}'", name);
        if let Err(source) = self.ctx.client.delete_index(name).await {
            if source.is_not_found() {
                debug!("Index '{}' was already gone", name);
            } else {
                metrics::remote_error_happened(KIND, "delete", &source);
                error!("Failed to delete index '{}': {}", name, source);
                return Err(Error::DeleteFailed {
                    kind: KIND,
                    name: name.to_owned(),
                    last_state: self.ctx.last_state(&key).await,
                    source,
                });
            }
        }

        let timeout = timeout.unwrap_or(self.ctx.config.index_delete_timeout);
        let options = self.ctx.wait_options(timeout);
        wait::until_absent(
            &options,
            || self.probe(name, Operation::Delete),
            Failure::is_not_found,
            |index: Index| self.ctx.checkpoint(Observation::Index(index)),
        )
        .await
        .map_err(|err| {
            self.ctx
                .wait_failed(KIND, name, Operation::Delete, timeout, err.map_last(Observation::Index))
        })?;

        self.ctx.state.remove(&key).await?;
        info!("Index '{}' deleted", name);
        Ok(())
    }

    /// Every index visible to the client. Nothing is persisted.
    pub async fn list(&self) -> Result<Vec<Index>, Error> {
        let result = self.ctx.client.list_indexes().await.map_err(|source| {
            metrics::remote_error_happened(KIND, "list", &source);
            Error::Transport {
                operation: Operation::List,
                kind: KIND,
                name: "*".to_owned(),
                source,
            }
        });
        metrics::operation_finished(KIND, Operation::List, &result);
        result
    }

    /// Drive the index towards `desired` starting from its current remote state.
    pub async fn reconcile(&self, desired: &IndexManifest) -> Result<Index, Error> {
        let spec = IndexSpec::try_from(desired)?;
        let mut current = match self.read(&spec.name).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                info!("Index '{}' does not exist", spec.name);
                return self.create(desired).await;
            }
            Err(err) => return Err(err),
        };

        spec.check_immutable(&current)?;

        if !current.status.ready {
            info!(
                "Index '{}' is {}; waiting for it to become ready",
                spec.name, current.status.state
            );
            let timeout = desired
                .timeouts
                .create
                .unwrap_or(self.ctx.config.index_create_timeout);
            current = self.await_ready(&spec.name, timeout).await?;
        }

        match IndexConfigure::from_spec(&spec) {
            Some(changes) if !changes.is_applied_to(&current) => self.update(desired).await,
            _ => {
                debug!("Index '{}' is up to date", spec.name);
                Ok(current)
            }
        }
    }

    async fn probe(&self, name: &str, operation: Operation) -> Result<Index, Failure> {
        metrics::probe_happened(KIND, operation);
        self.ctx.client.describe_index(name).await.map_err(|err| {
            if !err.is_not_found() {
                metrics::remote_error_happened(KIND, "describe", &err);
            }
            Failure::Remote(err)
        })
    }
}
