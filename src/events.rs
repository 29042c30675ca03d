//! Kubernetes Event recording for claim transitions
//!
//! Events show up in `kubectl describe obc`. Publication is fire-and-forget:
//! a failed event is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Publishes Kubernetes Events about claims
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the referenced object. Never fails.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// [`EventPublisher`] backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Claim reached Bound
    pub const CLAIM_BOUND: &str = "ClaimBound";
    /// Store call failed transiently; will retry
    pub const PROVISION_RETRYING: &str = "ProvisionRetrying";
    /// Claim entered Error
    pub const PROVISION_FAILED: &str = "ProvisionFailed";
    /// Bound claim lost its bucket or credentials
    pub const BUCKET_LOST: &str = "BucketLost";
    /// Store-side bucket and artifacts removed
    pub const BUCKET_DELETED: &str = "BucketDeleted";
    /// Deletion failed; finalizer kept, will retry
    pub const DELETE_RETRYING: &str = "DeleteRetrying";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    /// Creating the bucket and artifacts
    pub const PROVISION: &str = "Provision";
    /// Steady-state drift check
    pub const RECONCILE: &str = "Reconcile";
    /// Tearing down the bucket and artifacts
    pub const DELETE: &str = "Delete";
}
