//! objectbucket-provisioner - CRD-driven Kubernetes operator for S3-compatible buckets
//!
//! Users request storage with an `ObjectBucketClaim`. The provisioner creates a
//! bucket through a pluggable [`provisioner::Provisioner`], records it as an
//! `ObjectBucket`, and publishes credentials and connection info as a Secret
//! and ConfigMap named after the claim.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ObjectBucket, ObjectBucketClaim)
//! - [`provisioner`] - Store client abstraction and the S3 backend
//! - [`store`] - Kubernetes persistence for claims, buckets and artifacts
//! - [`controller`] - Claim reconciliation state machine
//! - [`bucket_provisioner`] - Composition root that runs the controller
//! - [`events`] - Kubernetes Event publishing
//! - [`retry`] - Backoff helpers
//! - [`config`] - Runtime configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod bucket_provisioner;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod provisioner;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use bucket_provisioner::BucketProvisioner;
pub use error::{Error, ProvisionError};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Finalizer that keeps a claim around until its bucket is gone
pub const FINALIZER: &str = "objectbucket.io/finalizer";

/// Label naming the claim a generated object belongs to
pub const CLAIM_LABEL: &str = "objectbucket.io/claim";

/// Standard managed-by label key
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on every generated object
pub const MANAGED_BY_VALUE: &str = "objectbucket-provisioner";

/// Field manager for server-side apply and Event reporting
pub const FIELD_MANAGER: &str = "objectbucket-provisioner";
