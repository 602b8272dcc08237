use std::convert::TryFrom;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ResourceKind};
use crate::utils::Timeouts;

/// Longest index or collection name the control plane accepts.
pub const MAX_NAME_LENGTH: usize = 45;
pub const DEFAULT_POD_TYPE: &str = "starter";

const POD_FAMILIES: &[&str] = &["s1", "p1", "p2"];
const POD_SIZES: &[&str] = &["x1", "x2", "x4", "x8"];

/// Distance metric used for similarity search.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    Dotproduct,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Cosine
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metric = match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Dotproduct => "dotproduct",
        };
        f.write_str(metric)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Aws,
    Gcp,
    Azure,
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cloud = match self {
            Cloud::Aws => "aws",
            Cloud::Gcp => "gcp",
            Cloud::Azure => "azure",
        };
        f.write_str(cloud)
    }
}

/// Restricts which metadata fields get indexed; all fields are indexed when absent.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MetadataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<Vec<String>>,
}

fn default_count() -> u32 {
    1
}

fn default_pod_type() -> String {
    DEFAULT_POD_TYPE.to_owned()
}

/// Pod based placement: a fixed amount of provisioned capacity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PodSpec {
    pub environment: String,
    #[serde(default = "default_count")]
    pub replicas: u32,
    #[serde(rename = "shards", default = "default_count")]
    pub shard_count: u32,
    #[serde(default = "default_pod_type")]
    pub pod_type: String,
    #[serde(rename = "pods", default = "default_count")]
    pub pod_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_config: Option<MetadataConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collection: Option<String>,
}

/// On-demand placement in a cloud region.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ServerlessSpec {
    pub cloud: Cloud,
    pub region: String,
}

/// Placement as written in a manifest: exactly one of the two must be set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PlacementManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serverless: Option<ServerlessSpec>,
}

/// Validated placement of an index.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Pod(PodSpec),
    Serverless(ServerlessSpec),
}

impl Placement {
    pub fn variant(&self) -> &'static str {
        match self {
            Placement::Pod(_) => "pod",
            Placement::Serverless(_) => "serverless",
        }
    }
}

/// Desired state of an index as read from a manifest.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct IndexManifest {
    pub name: String,
    pub dimension: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    pub spec: PlacementManifest,
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// A validated index specification; serializes as the creation request.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: u32,
    pub metric: Metric,
    pub spec: Placement,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct IndexStatus {
    pub ready: bool,
    pub state: String,
}

/// An index as observed on the control plane.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Index {
    pub name: String,
    pub dimension: u32,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub spec: Placement,
    pub status: IndexStatus,
}

/// The subset of an index which may change after creation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexConfigure {
    pub replicas: u32,
    pub pod_type: String,
}

impl IndexConfigure {
    /// Mutable fields of `spec`, or `None` when its placement has none.
    pub fn from_spec(spec: &IndexSpec) -> Option<Self> {
        match &spec.spec {
            Placement::Pod(pod) => Some(IndexConfigure {
                replicas: pod.replicas,
                pod_type: pod.pod_type.clone(),
            }),
            Placement::Serverless(_) => None,
        }
    }

    /// Whether `index` already runs with these settings.
    pub fn is_applied_to(&self, index: &Index) -> bool {
        match &index.spec {
            Placement::Pod(pod) => pod.replicas == self.replicas && pod.pod_type == self.pod_type,
            Placement::Serverless(_) => true,
        }
    }
}

pub fn validate_name(kind: ResourceKind, name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::validation(kind, name, "name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(
            kind,
            name,
            format!("name must be at most {} characters", MAX_NAME_LENGTH),
        ));
    }
    Ok(())
}

/// `starter`, or one of s1, p1, p2 followed by `.` and one of x1, x2, x4, x8.
pub fn is_valid_pod_type(pod_type: &str) -> bool {
    if pod_type == DEFAULT_POD_TYPE {
        return true;
    }
    match pod_type.split_once('.') {
        Some((family, size)) => POD_FAMILIES.contains(&family) && POD_SIZES.contains(&size),
        None => false,
    }
}

fn validate_pod(name: &str, pod: &PodSpec) -> Result<(), Error> {
    let invalid = |reason: String| Error::validation(ResourceKind::Index, name, reason);
    if pod.environment.trim().is_empty() {
        return Err(invalid("pod environment must not be empty".to_owned()));
    }
    for (field, value) in [
        ("replicas", pod.replicas),
        ("shards", pod.shard_count),
        ("pods", pod.pod_count),
    ] {
        if value == 0 {
            return Err(invalid(format!("{} must be at least 1", field)));
        }
    }
    if !is_valid_pod_type(&pod.pod_type) {
        return Err(invalid(format!(
            "pod type '{}' is not one of s1, p1, or p2 appended with . and one of x1, x2, x4, or x8",
            pod.pod_type
        )));
    }
    Ok(())
}

impl TryFrom<&IndexManifest> for IndexSpec {
    type Error = Error;

    fn try_from(manifest: &IndexManifest) -> Result<Self, Self::Error> {
        let name = manifest.name.as_str();
        validate_name(ResourceKind::Index, name)?;
        if manifest.dimension == 0 {
            return Err(Error::validation(ResourceKind::Index, name, "dimension must be at least 1"));
        }

        let placement = match (&manifest.spec.pod, &manifest.spec.serverless) {
            (Some(pod), None) => {
                validate_pod(name, pod)?;
                Placement::Pod(pod.clone())
            }
            (None, Some(serverless)) => {
                if serverless.region.trim().is_empty() {
                    return Err(Error::validation(
                        ResourceKind::Index,
                        name,
                        "serverless region must not be empty",
                    ));
                }
                Placement::Serverless(serverless.clone())
            }
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    ResourceKind::Index,
                    name,
                    "spec must set exactly one of 'pod' or 'serverless', not both",
                ))
            }
            (None, None) => {
                return Err(Error::validation(
                    ResourceKind::Index,
                    name,
                    "spec must set exactly one of 'pod' or 'serverless'",
                ))
            }
        };

        Ok(IndexSpec {
            name: manifest.name.clone(),
            dimension: manifest.dimension,
            metric: manifest.metric.unwrap_or_default(),
            spec: placement,
        })
    }
}

impl IndexSpec {
    /// Compare fields which are fixed at creation against an observed index.
    pub fn check_immutable(&self, current: &Index) -> Result<(), Error> {
        let immutable = |field: &'static str, current: String, desired: String| Error::Immutable {
            kind: ResourceKind::Index,
            name: self.name.clone(),
            field,
            current,
            desired,
        };

        if self.dimension != current.dimension {
            return Err(immutable(
                "dimension",
                current.dimension.to_string(),
                self.dimension.to_string(),
            ));
        }
        if self.metric != current.metric {
            return Err(immutable("metric", current.metric.to_string(), self.metric.to_string()));
        }
        match (&self.spec, &current.spec) {
            (Placement::Pod(desired), Placement::Pod(observed)) => {
                if desired.environment != observed.environment {
                    return Err(immutable(
                        "spec.pod.environment",
                        observed.environment.clone(),
                        desired.environment.clone(),
                    ));
                }
                if desired.shard_count != observed.shard_count {
                    return Err(immutable(
                        "spec.pod.shards",
                        observed.shard_count.to_string(),
                        desired.shard_count.to_string(),
                    ));
                }
            }
            (Placement::Serverless(desired), Placement::Serverless(observed)) => {
                if desired.cloud != observed.cloud {
                    return Err(immutable(
                        "spec.serverless.cloud",
                        observed.cloud.to_string(),
                        desired.cloud.to_string(),
                    ));
                }
                if desired.region != observed.region {
                    return Err(immutable(
                        "spec.serverless.region",
                        observed.region.clone(),
                        desired.region.clone(),
                    ));
                }
            }
            (desired, observed) => {
                return Err(immutable(
                    "spec",
                    observed.variant().to_owned(),
                    desired.variant().to_owned(),
                ))
            }
        }
        Ok(())
    }
}
