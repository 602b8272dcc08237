use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use tokio_util::sync::CancellationToken;

use crate::client::{RemoteClient, RemoteError};
use crate::errors::{Error, Operation, ResourceKind};
use crate::state::{Observation, StateError, StateKey, StateStore};
use crate::wait::{WaitError, WaitOptions, DEFAULT_POLL_INTERVAL};

pub mod collection;
pub mod index;

pub use collection::CollectionReconciler;
pub use index::IndexReconciler;

pub const DEFAULT_INDEX_CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_INDEX_DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
// Snapshotting an index is much slower than provisioning one.
pub const DEFAULT_COLLECTION_CREATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_COLLECTION_DELETE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Wait budgets used when a manifest does not override them.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcilerConfig {
    pub index_create_timeout: Duration,
    pub index_delete_timeout: Duration,
    pub collection_create_timeout: Duration,
    pub collection_delete_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            index_create_timeout: DEFAULT_INDEX_CREATE_TIMEOUT,
            index_delete_timeout: DEFAULT_INDEX_DELETE_TIMEOUT,
            collection_create_timeout: DEFAULT_COLLECTION_CREATE_TIMEOUT,
            collection_delete_timeout: DEFAULT_COLLECTION_DELETE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Collaborators shared by both reconcilers.
#[derive(Clone)]
pub struct Context {
    pub client: Arc<dyn RemoteClient>,
    pub state: Arc<dyn StateStore>,
    pub config: ReconcilerConfig,
    pub cancel: CancellationToken,
}

/// Why a probe or checkpoint stopped a wait.
pub(crate) enum Failure {
    Remote(RemoteError),
    State(StateError),
}

impl Failure {
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Failure::Remote(err) if err.is_not_found())
    }
}

impl Context {
    pub fn new(client: Arc<dyn RemoteClient>, state: Arc<dyn StateStore>, config: ReconcilerConfig) -> Self {
        Context {
            client,
            state,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort every wait started through this context when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn wait_options(&self, timeout: Duration) -> WaitOptions {
        WaitOptions::new(timeout)
            .interval(self.config.poll_interval)
            .cancel_on(self.cancel.clone())
    }

    pub(crate) async fn persist(&self, observation: &Observation) -> Result<(), Error> {
        self.state.persist(observation).await.map_err(|err| {
            error!("Failed to persist {}: {}", observation.key(), err);
            Error::State(err)
        })
    }

    /// Checkpoint used inside waits.
    pub(crate) async fn checkpoint(&self, observation: Observation) -> Result<(), Failure> {
        self.state.persist(&observation).await.map_err(|err| {
            error!("Failed to checkpoint {}: {}", observation.key(), err);
            Failure::State(err)
        })
    }

    /// State label of the last persisted observation, for error context.
    pub(crate) async fn last_state(&self, key: &StateKey) -> String {
        match self.state.get(key).await {
            Ok(Some(observation)) => observation.state_label().to_owned(),
            _ => "unknown".to_owned(),
        }
    }

    /// Turn a failed wait into the error reported for `operation`.
    pub(crate) fn wait_failed(
        &self,
        kind: ResourceKind,
        name: &str,
        operation: Operation,
        timeout: Duration,
        err: WaitError<Observation, Failure>,
    ) -> Error {
        match err {
            WaitError::Timeout { attempts, last } => {
                warn!(
                    "Gave up waiting on {} of {} '{}' after {:?} and {} attempts",
                    operation, kind, name, timeout, attempts
                );
                Error::WaitTimeout {
                    operation,
                    kind,
                    name: name.to_owned(),
                    timeout,
                    last: last.map(Box::new),
                }
            }
            WaitError::Cancelled { attempts, .. } => {
                warn!(
                    "Wait on {} of {} '{}' cancelled after {} attempts",
                    operation, kind, name, attempts
                );
                Error::Cancelled {
                    operation,
                    kind,
                    name: name.to_owned(),
                }
            }
            WaitError::Failed {
                error: Failure::State(err),
                ..
            } => Error::State(err),
            WaitError::Failed {
                error: Failure::Remote(source),
                last,
                ..
            } => {
                let last_state = last
                    .as_ref()
                    .map(|observation| observation.state_label().to_owned())
                    .unwrap_or_else(|| "unknown".to_owned());
                error!(
                    "Stopped waiting on {} of {} '{}' (last state: {}): {}",
                    operation, kind, name, last_state, source
                );
                match operation {
                    Operation::Create => Error::CreateFailed {
                        kind,
                        name: name.to_owned(),
                        last_state,
                        source,
                    },
                    Operation::Delete => Error::DeleteFailed {
                        kind,
                        name: name.to_owned(),
                        last_state,
                        source,
                    },
                    _ => Error::Transport {
                        operation,
                        kind,
                        name: name.to_owned(),
                        source,
                    },
                }
            }
        }
    }
}

/// Map a failed describe onto `NotFound` or `Transport`.
pub(crate) fn describe_failed(kind: ResourceKind, name: &str, operation: Operation, source: RemoteError) -> Error {
    if source.is_not_found() {
        Error::NotFound {
            kind,
            name: name.to_owned(),
        }
    } else {
        Error::Transport {
            operation,
            kind,
            name: name.to_owned(),
            source,
        }
    }
}
