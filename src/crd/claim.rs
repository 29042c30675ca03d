//! ObjectBucketClaim Custom Resource Definition
//!
//! A user creates an ObjectBucketClaim to request a bucket from a storage
//! class. The provisioner answers it with an ObjectBucket plus a Secret and a
//! ConfigMap the user's workloads can mount.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ClaimPhase, Condition, ObjectReference, SecretReference};

/// Longest name Kubernetes accepts for an object
pub const MAX_OBJECT_NAME_LEN: usize = 253;

/// Specification for an ObjectBucketClaim
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "objectbucket.io",
    version = "v1alpha1",
    kind = "ObjectBucketClaim",
    plural = "objectbucketclaims",
    shortname = "obc",
    status = "ObjectBucketClaimStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"StorageClass","type":"string","jsonPath":".spec.storageClass"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketClaimSpec {
    /// Storage class naming the provisioner that should serve this claim
    pub storage_class: String,
}

impl ObjectBucketClaimSpec {
    /// Validate the claim specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.storage_class.trim().is_empty() {
            return Err(crate::Error::validation("storageClass must not be empty"));
        }
        Ok(())
    }
}

/// Status for an ObjectBucketClaim
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketClaimStatus {
    /// Current phase of the claim lifecycle
    #[serde(default)]
    pub phase: ClaimPhase,

    /// ObjectBucket bound to this claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_bucket_ref: Option<ObjectReference>,

    /// ConfigMap carrying the bucket connection info
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ObjectReference>,

    /// Secret carrying the bucket credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the claim state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation of the claim last acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ObjectBucketClaimStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: ClaimPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: ClaimPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Add a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Set the observed generation and return self for chaining
    pub fn observed(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl ObjectBucketClaim {
    /// Current phase, treating a missing status as Pending
    pub fn phase(&self) -> ClaimPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Name of the ObjectBucket generated for this claim
    pub fn bucket_object_name(&self) -> String {
        format!("{}-bucket", self.name_any())
    }

    /// Check that the names derived from this claim are valid object names
    pub fn validate_generated_names(&self) -> Result<(), crate::Error> {
        let bucket = self.bucket_object_name();
        if bucket.len() > MAX_OBJECT_NAME_LEN {
            return Err(crate::Error::validation(format!(
                "ObjectBucket name {bucket:?} is {} characters, longer than {MAX_OBJECT_NAME_LEN}; \
                 shorten the claim name",
                bucket.len()
            )));
        }
        Ok(())
    }

    /// Name shared by the generated Secret and ConfigMap
    pub fn artifact_name(&self) -> String {
        self.name_any()
    }

    /// Namespace/name key used for logging and per-claim bookkeeping
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Current status, or a fresh Pending status if none was written yet
    pub fn status_or_default(&self) -> ObjectBucketClaimStatus {
        self.status.clone().unwrap_or_default()
    }
}
