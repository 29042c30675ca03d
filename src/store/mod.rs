//! Durable storage for claims, buckets and their generated artifacts
//!
//! [`ResourceStore`] is the engine's only path to the API server. Claim writes
//! carry the observed `resourceVersion`, so a concurrent modification comes
//! back as [`Error::Conflict`] instead of silently overwriting newer state.
//! Deletes treat 404 as success.

pub mod artifacts;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ObjectBucket, ObjectBucketClaim, ObjectBucketClaimStatus, ObjectBucketStatus};
use crate::error::{is_already_exists, is_not_found};
use crate::{Error, FIELD_MANAGER, FINALIZER};

/// Kubernetes operations the reconciler performs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Replace the claim's status, guarded by the claim's resourceVersion
    async fn patch_claim_status(
        &self,
        claim: &ObjectBucketClaim,
        status: &ObjectBucketClaimStatus,
    ) -> Result<(), Error>;

    /// Add our finalizer to the claim, guarded by its resourceVersion
    async fn add_finalizer(&self, claim: &ObjectBucketClaim) -> Result<(), Error>;

    /// Remove our finalizer from the claim, guarded by its resourceVersion
    async fn remove_finalizer(&self, claim: &ObjectBucketClaim) -> Result<(), Error>;

    /// Fetch an ObjectBucket, `None` if it does not exist
    async fn get_bucket(&self, namespace: &str, name: &str)
        -> Result<Option<ObjectBucket>, Error>;

    /// Create an ObjectBucket; if one already exists it is returned unchanged
    async fn create_bucket(&self, bucket: &ObjectBucket) -> Result<ObjectBucket, Error>;

    /// Replace an ObjectBucket's status
    async fn patch_bucket_status(
        &self,
        bucket: &ObjectBucket,
        status: &ObjectBucketStatus,
    ) -> Result<(), Error>;

    /// Delete an ObjectBucket; absent is success
    async fn delete_bucket(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Fetch a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Server-side apply a Secret the claim owns
    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Delete a Secret; absent is success
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Fetch a ConfigMap, `None` if it does not exist
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Server-side apply a ConfigMap the claim owns
    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), Error>;

    /// Delete a ConfigMap; absent is success
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Create a store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn claims(&self, claim: &ObjectBucketClaim) -> Api<ObjectBucketClaim> {
        Api::namespaced(self.client.clone(), &claim.namespace().unwrap_or_default())
    }

    async fn patch_claim_finalizers(
        &self,
        claim: &ObjectBucketClaim,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": claim.resource_version(),
                "finalizers": finalizers,
            }
        });
        self.claims(claim)
            .patch(
                &claim.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| conflict_or(e, &claim.key()))?;
        Ok(())
    }
}

/// Map HTTP 409 on an update to [`Error::Conflict`]
fn conflict_or(err: kube::Error, what: &str) -> Error {
    match &err {
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(what),
        _ => Error::Kube(err),
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    Ok(api.get_opt(name).await?)
}

async fn delete_ignoring_missing<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => {
            debug!(name, "already deleted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Server-side apply without forcing, so fields another manager set are
/// reported as a conflict rather than taken over
async fn server_side_apply<K>(api: &Api<K>, obj: &K) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    let name = obj.meta().name.clone().unwrap_or_default();
    api.patch(&name, &apply_params(), &Patch::Apply(obj)).await?;
    Ok(())
}

fn apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER)
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn patch_claim_status(
        &self,
        claim: &ObjectBucketClaim,
        status: &ObjectBucketClaimStatus,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": claim.resource_version() },
            "status": status,
        });
        self.claims(claim)
            .patch_status(
                &claim.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| conflict_or(e, &claim.key()))?;
        Ok(())
    }

    async fn add_finalizer(&self, claim: &ObjectBucketClaim) -> Result<(), Error> {
        let mut finalizers = claim.finalizers().to_vec();
        if finalizers.iter().any(|f| f == FINALIZER) {
            return Ok(());
        }
        finalizers.push(FINALIZER.to_string());
        self.patch_claim_finalizers(claim, finalizers).await
    }

    async fn remove_finalizer(&self, claim: &ObjectBucketClaim) -> Result<(), Error> {
        let finalizers: Vec<String> = claim
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        self.patch_claim_finalizers(claim, finalizers).await
    }

    async fn get_bucket(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObjectBucket>, Error> {
        get_opt(&Api::namespaced(self.client.clone(), namespace), name).await
    }

    async fn create_bucket(&self, bucket: &ObjectBucket) -> Result<ObjectBucket, Error> {
        let namespace = bucket.namespace().unwrap_or_default();
        let api: Api<ObjectBucket> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&PostParams::default(), bucket).await {
            Ok(created) => Ok(created),
            Err(e) if is_already_exists(&e) => {
                debug!(bucket = %bucket.name_any(), "ObjectBucket already exists");
                Ok(api.get(&bucket.name_any()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_bucket_status(
        &self,
        bucket: &ObjectBucket,
        status: &ObjectBucketStatus,
    ) -> Result<(), Error> {
        let namespace = bucket.namespace().unwrap_or_default();
        let api: Api<ObjectBucket> = Api::namespaced(self.client.clone(), &namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            &bucket.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn delete_bucket(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<ObjectBucket> = Api::namespaced(self.client.clone(), namespace);
        delete_ignoring_missing(&api, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        get_opt(&Api::namespaced(self.client.clone(), namespace), name).await
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        let namespace = secret.namespace().unwrap_or_default();
        server_side_apply(&Api::namespaced(self.client.clone(), &namespace), secret).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        delete_ignoring_missing(&api, name).await
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        get_opt(&Api::namespaced(self.client.clone(), namespace), name).await
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        let namespace = config_map.namespace().unwrap_or_default();
        server_side_apply(&Api::namespaced(self.client.clone(), &namespace), config_map).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        delete_ignoring_missing(&api, name).await
    }
}
