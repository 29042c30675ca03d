//! Builders for the objects generated from a claim
//!
//! Everything here is pure so the exact shape of each object can be tested
//! without an API server.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::{
    BucketPhase, ObjectBucket, ObjectBucketClaim, ObjectBucketStatus, ObjectReference,
};
use crate::provisioner::Credentials;
use crate::{Error, CLAIM_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

/// Secret key holding the access key id
pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";

/// Secret key holding the secret access key
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Labels carried by every generated object
pub fn labels(claim: &ObjectBucketClaim) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLAIM_LABEL.to_string(), claim.name_any()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ])
}

/// Controller owner reference pointing at the claim
pub fn owner_reference(claim: &ObjectBucketClaim) -> Result<OwnerReference, Error> {
    let mut owner = claim
        .controller_owner_ref(&())
        .ok_or_else(|| Error::internal(format!("claim {} has no uid", claim.key())))?;
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

fn artifact_meta(claim: &ObjectBucketClaim, name: String) -> Result<ObjectMeta, Error> {
    Ok(ObjectMeta {
        name: Some(name),
        namespace: claim.namespace(),
        labels: Some(labels(claim)),
        owner_references: Some(vec![owner_reference(claim)?]),
        ..Default::default()
    })
}

/// Whether `owners` names the claim as its controller
pub fn is_owned_by(owners: &[OwnerReference], claim: &ObjectBucketClaim) -> bool {
    let Some(uid) = claim.uid() else {
        return false;
    };
    owners
        .iter()
        .any(|o| o.uid == uid && o.controller == Some(true))
}

/// Stamp identity, labels and ownership onto a bucket returned by a provisioner
pub fn prepare_bucket(
    claim: &ObjectBucketClaim,
    mut bucket: ObjectBucket,
) -> Result<ObjectBucket, Error> {
    let meta = artifact_meta(claim, claim.bucket_object_name())?;
    bucket.metadata.name = meta.name;
    bucket.metadata.namespace = meta.namespace;
    bucket
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(meta.labels.unwrap_or_default());
    bucket.metadata.owner_references = meta.owner_references;
    bucket.metadata.resource_version = None;
    bucket.metadata.uid = None;
    bucket.status = None;
    Ok(bucket)
}

/// Bound status for a bucket controlled by the claim
pub fn bound_bucket_status(claim: &ObjectBucketClaim) -> ObjectBucketStatus {
    ObjectBucketStatus {
        phase: BucketPhase::Bound,
        controller_ref: Some(ObjectReference::from_resource(claim)),
    }
}

/// Secret holding the bucket credentials
pub fn build_secret(claim: &ObjectBucketClaim, credentials: &Credentials) -> Result<Secret, Error> {
    Ok(Secret {
        metadata: artifact_meta(claim, claim.artifact_name())?,
        string_data: Some(BTreeMap::from([
            (ACCESS_KEY_ID.to_string(), credentials.access_key_id.clone()),
            (
                SECRET_ACCESS_KEY.to_string(),
                credentials.secret_access_key.clone(),
            ),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })
}

/// ConfigMap holding the bucket connection info
pub fn build_config_map(
    claim: &ObjectBucketClaim,
    bucket: &ObjectBucket,
) -> Result<ConfigMap, Error> {
    Ok(ConfigMap {
        metadata: artifact_meta(claim, claim.artifact_name())?,
        data: Some(bucket.spec.connection_data()),
        ..Default::default()
    })
}
