use std::collections::HashSet;
use std::path::Path;

use log::debug;
use schemars::{schema::RootSchema, schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ResourceKind};
use crate::resource::collection::CollectionManifest;
use crate::resource::index::IndexManifest;

/// Everything the controller should keep in existence.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DesiredState {
    #[serde(default)]
    pub indexes: Vec<IndexManifest>,
    #[serde(default)]
    pub collections: Vec<CollectionManifest>,
}

impl DesiredState {
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let desired: DesiredState = serde_yaml::from_str(contents)?;
        desired.check_unique_names()?;
        Ok(desired)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let desired = Self::from_yaml(&contents)?;
        debug!(
            "Loaded {} indexes and {} collections from {}",
            desired.indexes.len(),
            desired.collections.len(),
            path.display()
        );
        Ok(desired)
    }

    pub fn index(&self, name: &str) -> Option<&IndexManifest> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionManifest> {
        self.collections.iter().find(|collection| collection.name == name)
    }

    // Names are durable-state keys, so two entries of one kind may not share one.
    fn check_unique_names(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(Error::validation(ResourceKind::Index, &index.name, "declared more than once"));
            }
        }
        let mut seen = HashSet::new();
        for collection in &self.collections {
            if !seen.insert(collection.name.as_str()) {
                return Err(Error::validation(
                    ResourceKind::Collection,
                    &collection.name,
                    "declared more than once",
                ));
            }
        }
        Ok(())
    }
}

/// JSON schema of the manifest format.
pub fn desired_state_schema() -> RootSchema {
    schema_for!(DesiredState)
}
