//! Controller for ObjectBucketClaims
//!
//! The reconciler follows the observe-diff-act loop: every pass reads the
//! claim and everything it points at, then moves it one step towards Bound
//! (or towards release when it is being deleted).

mod claim;
mod context;
mod phases;
#[cfg(test)]
mod testing;

pub use claim::{error_policy, has_finalizer, reconcile};
pub use context::{Context, ContextBuilder, InFlightGuard};
