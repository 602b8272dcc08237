use prometheus::{IntCounterVec, Opts, Registry};

use lazy_static::lazy_static;

use crate::client::RemoteError;
use crate::errors::{Error, Operation, ResourceKind};

pub const METRICS_NAMESPACE: &str = "index_controller";

lazy_static! {
    pub static ref REMOTE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("remote_errors", "control plane calls which returned an error")
            .namespace(METRICS_NAMESPACE),
        &["resource", "action", "kind"]
    )
    .unwrap();
    pub static ref OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("operations", "lifecycle operations by outcome").namespace(METRICS_NAMESPACE),
        &["resource", "operation", "outcome"]
    )
    .unwrap();
    pub static ref PROBES: IntCounterVec = IntCounterVec::new(
        Opts::new("probes", "describe calls issued while waiting on a resource")
            .namespace(METRICS_NAMESPACE),
        &["resource", "operation"]
    )
    .unwrap();
}

pub fn custom_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(REMOTE_ERRORS.clone()))?;
    registry.register(Box::new(OPERATIONS.clone()))?;
    registry.register(Box::new(PROBES.clone()))?;
    Ok(())
}

pub fn remote_error_happened(resource: ResourceKind, action: &str, err: &RemoteError) {
    REMOTE_ERRORS
        .with_label_values(&[&resource.to_string(), action, err.kind.as_str()])
        .inc();
}

pub fn probe_happened(resource: ResourceKind, operation: Operation) {
    PROBES
        .with_label_values(&[&resource.to_string(), operation.as_str()])
        .inc();
}

pub fn operation_finished<T>(resource: ResourceKind, operation: Operation, result: &Result<T, Error>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) => err.name(),
    };
    OPERATIONS
        .with_label_values(&[&resource.to_string(), operation.as_str(), outcome])
        .inc();
}
