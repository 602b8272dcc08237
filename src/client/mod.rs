use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::resource::collection::{CollectionDescription, CreateCollection};
use crate::resource::index::{Index, IndexConfigure, IndexSpec};

pub mod http;
pub use http::HttpControlPlane;

/// Classification of a failed remote call, decided by the client
/// implementation rather than by the reconcilers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteErrorKind {
    NotFound,
    Transport,
    Validation,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::Transport => "transport",
            RemoteErrorKind::Validation => "validation",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    /// HTTP status code, when the failure came from a response.
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Calls against the vector database control plane.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), RemoteError>;
    async fn describe_index(&self, name: &str) -> Result<Index, RemoteError>;
    async fn configure_index(&self, name: &str, changes: &IndexConfigure) -> Result<(), RemoteError>;
    async fn delete_index(&self, name: &str) -> Result<(), RemoteError>;
    async fn list_indexes(&self) -> Result<Vec<Index>, RemoteError>;

    async fn create_collection(&self, request: &CreateCollection) -> Result<(), RemoteError>;
    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, RemoteError>;
    async fn delete_collection(&self, name: &str) -> Result<(), RemoteError>;
    async fn list_collections(&self) -> Result<Vec<CollectionDescription>, RemoteError>;
}
