//! Store client abstraction
//!
//! A [`Provisioner`] creates and deletes store-side buckets for claims. The
//! engine only ever talks to the store through this trait, so backends can be
//! swapped without touching reconciliation.
//!
//! Implementations must be idempotent: provisioning an already-provisioned
//! claim returns the same bucket, and deleting a bucket that is already gone
//! succeeds.

mod s3;

use std::fmt;

use async_trait::async_trait;
use kube::ResourceExt;
use sha2::{Digest, Sha256};

#[cfg(test)]
use mockall::automock;

use crate::crd::{ObjectBucket, ObjectBucketClaim};
use crate::error::ProvisionError;

pub use s3::{classify_code, S3Api, S3Provisioner, SdkS3Api};

#[cfg(test)]
pub use s3::MockS3Api;

/// Longest bucket name S3 accepts
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Access key pair issued for a bucket
///
/// Only ever materialized into the claim's Secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
}

impl Credentials {
    /// Create a key pair
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Result of a successful provision call
#[derive(Clone, Debug)]
pub struct ProvisionedBucket {
    /// Bucket record to persist; owner metadata is filled in by the engine
    pub bucket: ObjectBucket,
    /// Credentials for the bucket
    pub credentials: Credentials,
}

/// Capability set over a concrete object store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create (or find) the bucket for a claim and issue credentials for it
    async fn provision(&self, claim: &ObjectBucketClaim)
        -> Result<ProvisionedBucket, ProvisionError>;

    /// Delete the claim's bucket; succeeds if it is already gone
    async fn delete(&self, claim: &ObjectBucketClaim) -> Result<(), ProvisionError>;
}

/// Hex digits of the claim digest appended to every bucket name
const DIGEST_LEN: usize = 8;

/// Derive the store-side bucket name for a claim
///
/// The name is a readable `<namespace>-<claim>` prefix followed by the first
/// eight hex digits of the SHA-256 of `<namespace>/<claim>`. The prefix is
/// lowercased, every character outside `[a-z0-9-]` becomes `-`, and it is
/// clipped so the whole name fits in 63 characters. Two claims only share a
/// name if their digests collide. A result that still breaks S3 naming rules
/// is a terminal error.
pub fn bucket_name_for(claim: &ObjectBucketClaim) -> Result<String, ProvisionError> {
    let namespace = claim.namespace().unwrap_or_default();
    let claim_name = claim.name_any();
    let raw = format!("{namespace}/{claim_name}");

    let prefix: String = format!("{namespace}-{claim_name}")
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_BUCKET_NAME_LEN - DIGEST_LEN - 1)
        .collect();
    let prefix = prefix.trim_matches('-');
    let digest = claim_digest(&raw);
    let name = if prefix.is_empty() {
        digest
    } else {
        format!("{prefix}-{digest}")
    };

    validate_bucket_name(&name).map_err(|reason| {
        ProvisionError::terminal(format!("invalid bucket name {name:?} for claim {raw}: {reason}"))
    })?;
    Ok(name)
}

fn claim_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DIGEST_LEN);
    digest
}

fn validate_bucket_name(name: &str) -> Result<(), &'static str> {
    if name.len() < 3 {
        return Err("must be at least 3 characters");
    }
    if name.len() > MAX_BUCKET_NAME_LEN {
        return Err("must be at most 63 characters");
    }
    if name.starts_with("xn--") {
        return Err("must not start with the reserved prefix xn--");
    }
    Ok(())
}
