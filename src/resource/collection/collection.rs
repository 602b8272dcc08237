use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ResourceKind};
use crate::resource::index::validate_name;
use crate::utils::Timeouts;

/// Status label the control plane reports once a collection is usable.
/// Compared case-sensitively.
pub const READY_STATUS: &str = "Ready";

/// Desired state of a collection as read from a manifest.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct CollectionManifest {
    pub name: String,
    /// Name of the index the collection is snapshotted from.
    pub source: String,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl CollectionManifest {
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(ResourceKind::Collection, &self.name)?;
        if self.source.trim().is_empty() {
            return Err(Error::validation(
                ResourceKind::Collection,
                &self.name,
                "source index must not be empty",
            ));
        }
        Ok(())
    }
}

/// Creation request body.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CreateCollection {
    pub name: String,
    pub source: String,
}

impl From<&CollectionManifest> for CreateCollection {
    fn from(manifest: &CollectionManifest) -> Self {
        CreateCollection {
            name: manifest.name.clone(),
            source: manifest.source.clone(),
        }
    }
}

/// A collection as the control plane describes it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CollectionDescription {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub vector_count: Option<u64>,
}

/// Observed collection. The control plane never reports the source index,
/// so it is carried over from the manifest or the previous record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Collection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_count: Option<u64>,
}

impl Collection {
    pub fn observed(description: CollectionDescription, source: Option<String>) -> Self {
        Collection {
            name: description.name,
            source,
            size: description.size,
            status: description.status,
            dimension: description.dimension,
            vector_count: description.vector_count,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_deref() == Some(READY_STATUS)
    }
}
