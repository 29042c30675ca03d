//! Phase handlers for the ObjectBucketClaim controller.
//!
//! Each phase a claim can act on has its own module. The helpers here write
//! status and publish the matching Event so every transition looks the same.

mod bound;
mod pending;

pub use bound::handle_bound;
pub use pending::handle_pending;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{debug, info, warn};

use crate::controller::Context;
use crate::crd::{
    condition_types, ClaimPhase, Condition, ConditionStatus, ObjectBucketClaim,
    ObjectBucketClaimStatus,
};
use crate::events::{actions, reasons};
use crate::Error;

/// Write the claim's status if it differs from what is stored.
///
/// Conditions whose status did not change keep their original
/// `lastTransitionTime`, so a retry loop that reports the same failure does
/// not produce a fresh write (and a fresh watch event) every time.
pub async fn update_claim_status(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    status: ObjectBucketClaimStatus,
) -> Result<(), Error> {
    let status = preserve_transition_times(
        claim.status.as_ref(),
        status.observed(claim.metadata.generation),
    );

    if claim.status.as_ref() == Some(&status) {
        debug!(phase = %status.phase, "status unchanged");
        return Ok(());
    }

    ctx.store.patch_claim_status(claim, &status).await?;
    debug!(phase = %status.phase, "updated claim status");
    Ok(())
}

fn preserve_transition_times(
    old: Option<&ObjectBucketClaimStatus>,
    mut new: ObjectBucketClaimStatus,
) -> ObjectBucketClaimStatus {
    let Some(old) = old else {
        return new;
    };
    for condition in &mut new.conditions {
        if let Some(prev) = old.get_condition(&condition.type_) {
            if prev.status == condition.status {
                condition.last_transition_time = prev.last_transition_time;
            }
        }
    }
    new
}

/// Record a transient failure and schedule a backoff retry.
///
/// The claim stays Pending with the reason in its message and a
/// `Provisioned=False` condition.
pub async fn retry_pending(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    reason: &str,
) -> Result<Action, Error> {
    let delay = ctx.backoff.next_delay(&claim.key());
    warn!(
        reason,
        delay_secs = delay.as_secs(),
        "provisioning failed transiently, will retry"
    );

    let status = claim
        .status_or_default()
        .phase(ClaimPhase::Pending)
        .message(reason)
        .condition(Condition::new(
            condition_types::PROVISIONED,
            ConditionStatus::False,
            reasons::PROVISION_RETRYING,
            reason,
        ));
    update_claim_status(claim, ctx, status).await?;

    ctx.events
        .publish(
            &claim.object_ref(&()),
            EventType::Warning,
            reasons::PROVISION_RETRYING,
            actions::PROVISION,
            Some(reason.to_string()),
        )
        .await;

    Ok(Action::requeue(delay))
}

/// Move the claim to Error. Nothing is retried until the claim changes.
pub async fn fail_claim(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    reason: &str,
) -> Result<Action, Error> {
    warn!(reason, "claim failed");
    ctx.backoff.reset(&claim.key());

    let status = claim
        .status_or_default()
        .phase(ClaimPhase::Error)
        .message(reason)
        .condition(Condition::new(
            condition_types::PROVISIONED,
            ConditionStatus::False,
            reasons::PROVISION_FAILED,
            reason,
        ));
    update_claim_status(claim, ctx, status).await?;

    ctx.events
        .publish(
            &claim.object_ref(&()),
            EventType::Warning,
            reasons::PROVISION_FAILED,
            actions::PROVISION,
            Some(reason.to_string()),
        )
        .await;

    Ok(Action::await_change())
}

/// Move a Bound claim to Lost. The engine never re-provisions on its own.
pub async fn lose_claim(
    claim: &ObjectBucketClaim,
    ctx: &Context,
    reason: &str,
) -> Result<Action, Error> {
    info!(reason, "claim lost its bucket");
    ctx.backoff.reset(&claim.key());

    let status = claim
        .status_or_default()
        .phase(ClaimPhase::Lost)
        .message(reason)
        .condition(Condition::new(
            condition_types::BOUND,
            ConditionStatus::False,
            reasons::BUCKET_LOST,
            reason,
        ));
    update_claim_status(claim, ctx, status).await?;

    ctx.events
        .publish(
            &claim.object_ref(&()),
            EventType::Warning,
            reasons::BUCKET_LOST,
            actions::RECONCILE,
            Some(reason.to_string()),
        )
        .await;

    Ok(Action::await_change())
}
