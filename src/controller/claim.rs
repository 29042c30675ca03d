//! ObjectBucketClaim controller implementation
//!
//! Every reconcile recomputes the desired state from fresh reads and
//! performs at most one write to the claim itself, so a stale read can only
//! ever cost a conflict and a quick requeue.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::phases::{handle_bound, handle_pending, update_claim_status};
use super::Context;
use crate::config::CONFLICT_REQUEUE;
use crate::crd::{condition_types, ClaimPhase, Condition, ConditionStatus, ObjectBucketClaim};
use crate::events::{actions, reasons};
use crate::store::artifacts;
use crate::{Error, FINALIZER};

/// Requeue delay when another worker already holds the claim
const IN_FLIGHT_REQUEUE: Duration = Duration::from_secs(2);

/// Requeue delay right after adding the finalizer
const FINALIZER_REQUEUE: Duration = Duration::from_secs(1);

/// Whether the claim carries our finalizer
pub fn has_finalizer(claim: &ObjectBucketClaim) -> bool {
    claim.finalizers().iter().any(|f| f == FINALIZER)
}

/// Reconcile an ObjectBucketClaim
///
/// Returns an `Action` indicating when to requeue the claim, or an error for
/// [`error_policy`] to turn into a requeue.
#[instrument(
    skip(claim, ctx),
    fields(claim = %claim.name_any(), namespace = %claim.namespace().unwrap_or_default())
)]
pub async fn reconcile(claim: Arc<ObjectBucketClaim>, ctx: Arc<Context>) -> Result<Action, Error> {
    if !ctx.config.serves(&claim.spec.storage_class) && !has_finalizer(&claim) {
        debug!(storage_class = %claim.spec.storage_class, "claim is for another provisioner");
        return Ok(Action::await_change());
    }

    let key = claim.key();
    let Some(_guard) = ctx.try_acquire(&key) else {
        debug!("claim already being reconciled");
        return Ok(Action::requeue(IN_FLIGHT_REQUEUE));
    };

    if claim.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&claim, &ctx).await;
    }

    let phase = claim.phase();
    debug!(%phase, "reconciling claim");

    if phase.awaits_user() {
        debug!(%phase, "claim awaits user action");
        return Ok(Action::await_change());
    }

    if !has_finalizer(&claim) {
        info!("adding finalizer");
        ctx.store.add_finalizer(&claim).await?;
        return Ok(Action::requeue(FINALIZER_REQUEUE));
    }

    match phase {
        ClaimPhase::Pending => handle_pending(&claim, &ctx).await,
        ClaimPhase::Bound => handle_bound(&claim, &ctx).await,
        ClaimPhase::Error | ClaimPhase::Lost => Ok(Action::await_change()),
    }
}

/// Tear down a deleted claim's bucket and artifacts, then release it.
///
/// Works from any phase. The store bucket is only deleted when the claim
/// recorded one, and only objects the claim owns are removed. The finalizer
/// stays until every step has succeeded.
async fn handle_deletion(claim: &ObjectBucketClaim, ctx: &Context) -> Result<Action, Error> {
    if !has_finalizer(claim) {
        debug!("claim deleting without our finalizer");
        return Ok(Action::await_change());
    }

    let namespace = claim.namespace().unwrap_or_default();
    let status = claim.status_or_default();
    let bucket_name = match &status.object_bucket_ref {
        Some(r) => Some(r.name.clone()),
        None => claim
            .validate_generated_names()
            .ok()
            .map(|()| claim.bucket_object_name()),
    };
    let owned_bucket = match &bucket_name {
        Some(name) => ctx
            .store
            .get_bucket(&namespace, name)
            .await?
            .filter(|b| artifacts::is_owned_by(b.owner_references(), claim)),
        None => None,
    };
    let provisioned = status.object_bucket_ref.is_some() || owned_bucket.is_some();

    if provisioned {
        info!("deleting store bucket");
        if let Err(e) = ctx
            .call_store("delete", ctx.provisioner.delete(claim))
            .await
        {
            return retry_deletion(claim, ctx, e.reason()).await;
        }
    } else {
        debug!("claim never recorded a store bucket");
    }

    if let Some(bucket) = &owned_bucket {
        ctx.store.delete_bucket(&namespace, &bucket.name_any()).await?;
    }
    delete_owned_artifacts(claim, ctx, &namespace).await?;

    let message = match bucket_name.filter(|_| provisioned) {
        Some(name) => format!("deleted ObjectBucket {name} and its artifacts"),
        None => "released claim that never had a bucket".to_string(),
    };
    ctx.events
        .publish(
            &claim.object_ref(&()),
            EventType::Normal,
            reasons::BUCKET_DELETED,
            actions::DELETE,
            Some(message),
        )
        .await;

    ctx.store.remove_finalizer(claim).await?;
    ctx.backoff.reset(&claim.key());
    info!("claim released");
    Ok(Action::await_change())
}

/// Record a failed store delete and back off; the finalizer stays
async fn retry_deletion(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    cause: &str,
) -> Result<Action, Error> {
    let delay = ctx.backoff.next_delay(&claim.key());
    let reason = format!("delete failed: {cause}");
    warn!(error = %cause, delay_secs = delay.as_secs(), "store delete failed, will retry");

    let status = claim.status_or_default().message(reason.clone()).condition(
        Condition::new(
            condition_types::DELETING,
            ConditionStatus::False,
            reasons::DELETE_RETRYING,
            reason.clone(),
        ),
    );
    update_claim_status(claim, ctx, status).await?;

    ctx.events
        .publish(
            &claim.object_ref(&()),
            EventType::Warning,
            reasons::DELETE_RETRYING,
            actions::DELETE,
            Some(reason),
        )
        .await;
    Ok(Action::requeue(delay))
}

/// Delete the claim's Secret and ConfigMap if the claim owns them
async fn delete_owned_artifacts(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    namespace: &str,
) -> Result<(), Error> {
    let name = claim.artifact_name();

    match ctx.store.get_secret(namespace, &name).await? {
        Some(secret) if artifacts::is_owned_by(secret.owner_references(), claim) => {
            ctx.store.delete_secret(namespace, &name).await?;
        }
        Some(_) => debug!(secret = %name, "leaving Secret the claim does not own"),
        None => {}
    }

    match ctx.store.get_config_map(namespace, &name).await? {
        Some(config_map) if artifacts::is_owned_by(config_map.owner_references(), claim) => {
            ctx.store.delete_config_map(namespace, &name).await?;
        }
        Some(_) => debug!(config_map = %name, "leaving ConfigMap the claim does not own"),
        None => {}
    }
    Ok(())
}

/// Error policy for the controller
///
/// Conflicts requeue almost immediately and are never written to status.
/// Everything else backs off per claim.
pub fn error_policy(claim: Arc<ObjectBucketClaim>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(claim = %claim.key(), "conflict writing claim, requeueing");
        return Action::requeue(CONFLICT_REQUEUE);
    }

    let delay = ctx.backoff.next_delay(&claim.key());
    error!(
        ?error,
        claim = %claim.key(),
        retryable = error.is_retryable(),
        delay_secs = delay.as_secs(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}
