//! Pending phase handler.
//!
//! Provisions the store-side bucket, persists the ObjectBucket, Secret and
//! ConfigMap, then binds the claim.

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use super::{fail_claim, retry_pending, update_claim_status};
use crate::controller::Context;
use crate::crd::{
    condition_types, ClaimPhase, Condition, ConditionStatus, ObjectBucketClaim,
    ObjectBucketClaimStatus, ObjectReference, SecretReference,
};
use crate::events::{actions, reasons};
use crate::provisioner::ProvisionedBucket;
use crate::store::artifacts;
use crate::Error;

/// Handle a claim in the Pending phase.
///
/// The finalizer is already in place when this runs. Validation failures and
/// terminal store errors move the claim to Error; transient store errors keep
/// it Pending with a backoff requeue, as does a Secret or ConfigMap of the
/// same name that belongs to someone else.
pub async fn handle_pending(claim: &ObjectBucketClaim, ctx: &Context) -> Result<Action, Error> {
    if let Err(e) = claim
        .spec
        .validate()
        .and_then(|()| claim.validate_generated_names())
    {
        return fail_claim(claim, ctx, &e.to_string()).await;
    }

    if let Some(reason) = blocking_object(claim, ctx).await? {
        return retry_pending(claim, ctx, &reason).await;
    }

    debug!("provisioning bucket");
    let provisioned = match ctx
        .call_store("provision", ctx.provisioner.provision(claim))
        .await
    {
        Ok(provisioned) => provisioned,
        Err(e) if e.is_retryable() => return retry_pending(claim, ctx, e.reason()).await,
        Err(e) => return fail_claim(claim, ctx, e.reason()).await,
    };

    bind(claim, ctx, provisioned).await
}

/// Describe an object with one of the claim's generated names that the claim
/// does not own; such objects are never overwritten
async fn blocking_object(
    claim: &ObjectBucketClaim,
    ctx: &Context,
) -> Result<Option<String>, Error> {
    let namespace = claim.namespace().unwrap_or_default();

    let bucket_name = claim.bucket_object_name();
    if let Some(bucket) = ctx.store.get_bucket(&namespace, &bucket_name).await? {
        if !artifacts::is_owned_by(bucket.owner_references(), claim) {
            return Ok(Some(leftover_bucket_reason(&bucket_name)));
        }
    }

    let name = claim.artifact_name();

    if let Some(secret) = ctx.store.get_secret(&namespace, &name).await? {
        if !artifacts::is_owned_by(secret.owner_references(), claim) {
            return Ok(Some(format!(
                "Secret {name} already exists and is not owned by this claim"
            )));
        }
    }
    if let Some(config_map) = ctx.store.get_config_map(&namespace, &name).await? {
        if !artifacts::is_owned_by(config_map.owner_references(), claim) {
            return Ok(Some(format!(
                "ConfigMap {name} already exists and is not owned by this claim"
            )));
        }
    }
    Ok(None)
}

/// A leftover from an earlier claim with the same name; GC will remove it
fn leftover_bucket_reason(bucket_name: &str) -> String {
    format!("ObjectBucket {bucket_name} belongs to another claim, waiting for it to be removed")
}

async fn bind(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    provisioned: ProvisionedBucket,
) -> Result<Action, Error> {
    let namespace = claim.namespace().unwrap_or_default();
    let desired = artifacts::prepare_bucket(claim, provisioned.bucket)?;
    let bucket_name = desired.name_any();

    let bucket = match ctx.store.get_bucket(&namespace, &bucket_name).await? {
        Some(existing) => existing,
        None => {
            let created = ctx.store.create_bucket(&desired).await?;
            info!(bucket = %bucket_name, "created ObjectBucket");
            created
        }
    };

    // Created by an earlier claim of the same name since the check above
    if !artifacts::is_owned_by(bucket.owner_references(), claim) {
        return retry_pending(claim, ctx, &leftover_bucket_reason(&bucket_name)).await;
    }

    let uid = claim.uid().unwrap_or_default();
    if !bucket.is_controlled_by(&uid) {
        ctx.store
            .patch_bucket_status(&bucket, &artifacts::bound_bucket_status(claim))
            .await?;
    }

    let secret = artifacts::build_secret(claim, &provisioned.credentials)?;
    ctx.store.apply_secret(&secret).await?;

    let config_map = artifacts::build_config_map(claim, &bucket)?;
    ctx.store.apply_config_map(&config_map).await?;

    let message = format!("bound to bucket {}", bucket.spec.bucket_name);
    let status = claim
        .status_or_default()
        .phase(ClaimPhase::Bound)
        .message(message.clone())
        .condition(Condition::new(
            condition_types::PROVISIONED,
            ConditionStatus::True,
            "BucketProvisioned",
            format!("store bucket {} exists", bucket.spec.bucket_name),
        ))
        .condition(Condition::new(
            condition_types::BOUND,
            ConditionStatus::True,
            reasons::CLAIM_BOUND,
            message.clone(),
        ));
    let status = ObjectBucketClaimStatus {
        object_bucket_ref: Some(ObjectReference::from_resource(&bucket)),
        config_map_ref: Some(ObjectReference::from_resource(&config_map)),
        secret_ref: Some(SecretReference {
            name: claim.artifact_name(),
            namespace: Some(namespace),
        }),
        ..status
    };
    update_claim_status(claim, ctx, status).await?;

    ctx.events
        .publish(
            &claim.object_ref(&()),
            EventType::Normal,
            reasons::CLAIM_BOUND,
            actions::PROVISION,
            Some(message),
        )
        .await;

    ctx.backoff.reset(&claim.key());
    info!(bucket = %bucket.spec.bucket_name, "claim bound");
    Ok(Action::requeue(ctx.config.resync_interval))
}
