//! Custom Resource Definitions for the bucket provisioner
//!
//! `ObjectBucketClaim` is the user-facing request; `ObjectBucket` is the
//! provisioner-owned record of the store-side bucket.

mod bucket;
mod claim;
mod types;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub use bucket::{ObjectBucket, ObjectBucketSource, ObjectBucketSpec, ObjectBucketStatus};
pub use claim::{ObjectBucketClaim, ObjectBucketClaimSpec, ObjectBucketClaimStatus};
pub use types::{
    condition_types, BucketPhase, ClaimPhase, Condition, ConditionStatus, ObjectReference,
    SecretReference,
};

/// Every CRD this provisioner serves, in install order
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![ObjectBucket::crd(), ObjectBucketClaim::crd()]
}

/// Render all CRDs as a multi-document YAML stream
pub fn crds_yaml() -> crate::Result<String> {
    let docs = crds()
        .iter()
        .map(|crd| serde_yaml::to_string(crd).map_err(|e| crate::Error::serialization(e.to_string())))
        .collect::<crate::Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}
