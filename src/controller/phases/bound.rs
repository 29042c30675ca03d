//! Bound phase handler.
//!
//! Checks that everything the claim was bound to still exists and still
//! belongs to it.

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info};

use super::lose_claim;
use crate::controller::Context;
use crate::crd::ObjectBucketClaim;
use crate::store::artifacts;
use crate::Error;

/// Handle a claim in the Bound phase.
///
/// A missing or re-owned ObjectBucket, or a missing Secret, moves the claim to
/// Lost. A missing ConfigMap holds nothing secret and is rebuilt from the
/// ObjectBucket.
pub async fn handle_bound(claim: &ObjectBucketClaim, ctx: &Context) -> Result<Action, Error> {
    let namespace = claim.namespace().unwrap_or_default();
    let status = claim.status_or_default();
    let uid = claim.uid().unwrap_or_default();

    let bucket_name = status
        .object_bucket_ref
        .as_ref()
        .map(|r| r.name.clone())
        .unwrap_or_else(|| claim.bucket_object_name());

    let bucket = match ctx.store.get_bucket(&namespace, &bucket_name).await? {
        None => {
            let reason = format!("ObjectBucket {bucket_name} no longer exists");
            return lose_claim(claim, ctx, &reason).await;
        }
        Some(bucket) if !bucket.is_controlled_by(&uid) => {
            let reason = format!("ObjectBucket {bucket_name} is not controlled by this claim");
            return lose_claim(claim, ctx, &reason).await;
        }
        Some(bucket) => bucket,
    };

    let secret_name = status
        .secret_ref
        .as_ref()
        .map(|r| r.name.clone())
        .unwrap_or_else(|| claim.artifact_name());
    if ctx.store.get_secret(&namespace, &secret_name).await?.is_none() {
        let reason =
            format!("Secret {secret_name} no longer exists and its credentials cannot be recovered");
        return lose_claim(claim, ctx, &reason).await;
    }

    let config_map_name = status
        .config_map_ref
        .as_ref()
        .map(|r| r.name.clone())
        .unwrap_or_else(|| claim.artifact_name());
    if ctx
        .store
        .get_config_map(&namespace, &config_map_name)
        .await?
        .is_none()
    {
        let config_map = artifacts::build_config_map(claim, &bucket)?;
        ctx.store.apply_config_map(&config_map).await?;
        info!(config_map = %config_map_name, "recreated missing ConfigMap");
    }

    debug!("claim is bound and consistent");
    ctx.backoff.reset(&claim.key());
    Ok(Action::requeue(ctx.config.resync_interval))
}
