use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::RemoteError;
use crate::state::{Observation, StateError};

/// The two kinds of resources this controller manages.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Index,
    Collection,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Index => f.write_str("index"),
            ResourceKind::Collection => f.write_str("collection"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid {kind} '{name}': {reason}")]
    Validation {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("Failed to {operation} {kind} '{name}': {source}")]
    Transport {
        operation: Operation,
        kind: ResourceKind,
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to create {kind} '{name}' (last state: {last_state}): {source}")]
    CreateFailed {
        kind: ResourceKind,
        name: String,
        last_state: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to update {kind} '{name}': {source}")]
    UpdateFailed {
        kind: ResourceKind,
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to delete {kind} '{name}' (last state: {last_state}): {source}")]
    DeleteFailed {
        kind: ResourceKind,
        name: String,
        last_state: String,
        #[source]
        source: RemoteError,
    },

    #[error(
        "Timed out after {timeout:?} waiting on {operation} of {kind} '{name}' (last state: {})",
        last_state_label(.last)
    )]
    WaitTimeout {
        operation: Operation,
        kind: ResourceKind,
        name: String,
        timeout: Duration,
        last: Option<Box<Observation>>,
    },

    #[error("Wait on {operation} of {kind} '{name}' was cancelled")]
    Cancelled {
        operation: Operation,
        kind: ResourceKind,
        name: String,
    },

    #[error("Field '{field}' of {kind} '{name}' cannot change from {current} to {desired} without recreating it")]
    Immutable {
        kind: ResourceKind,
        name: String,
        field: &'static str,
        current: String,
        desired: String,
    },

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(kind: ResourceKind, name: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            kind,
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Short label used for metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::NotFound { .. } => "not_found",
            Error::Transport { .. } => "transport",
            Error::CreateFailed { .. } => "create_failed",
            Error::UpdateFailed { .. } => "update_failed",
            Error::DeleteFailed { .. } => "delete_failed",
            Error::WaitTimeout { .. } => "wait_timeout",
            Error::Cancelled { .. } => "cancelled",
            Error::Immutable { .. } => "immutable",
            Error::State(_) => "state",
            Error::Config(_) => "config",
            Error::Manifest(_) => "manifest",
            Error::Io(_) => "io",
        }
    }
}

fn last_state_label(last: &Option<Box<Observation>>) -> String {
    last.as_ref()
        .map(|observation| observation.state_label().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteErrorKind;

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::CreateFailed {
            kind: ResourceKind::Collection,
            name: "snap".to_owned(),
            last_state: "unknown".to_owned(),
            source: RemoteError::new(RemoteErrorKind::Validation, "source index 'nope' not found"),
        };
        let message = err.to_string();
        assert!(message.contains("collection 'snap'"));
        assert!(message.contains("source index 'nope' not found"));
    }

    #[test]
    fn test_wait_timeout_without_observation() {
        let err = Error::WaitTimeout {
            operation: Operation::Delete,
            kind: ResourceKind::Index,
            name: "widget".to_owned(),
            timeout: Duration::from_secs(2),
            last: None,
        };
        assert!(err.to_string().ends_with("(last state: unknown)"));
        assert_eq!(err.name(), "wait_timeout");
    }
}
