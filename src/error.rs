//! Error types for the ObjectBucketClaim provisioner
//!
//! Every failure the engine can observe is folded into [`Error`]. Backend
//! failures arrive as [`ProvisionError`], which carries the retry
//! classification chosen by the adapter.

use thiserror::Error;

/// Failure reported by a [`Provisioner`](crate::provisioner::Provisioner) backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    /// Network, timeout or throttling failure; the call may succeed later
    #[error("transient store error: {0}")]
    Transient(String),

    /// Invalid name, quota exceeded, policy violation; retrying cannot help
    #[error("terminal store error: {0}")]
    Terminal(String),
}

impl ProvisionError {
    /// Create a transient (retryable) error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a terminal (non-retryable) error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Whether the engine should retry the call
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The human-readable reason without the classification prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Terminal(msg) => msg,
        }
    }
}

/// Main error type for provisioner operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for a claim spec
    #[error("validation error: {0}")]
    Validation(String),

    /// Object store backend error
    #[error("provision error: {0}")]
    Provision(#[from] ProvisionError),

    /// Optimistic concurrency conflict on a read-modify-write
    #[error("conflict updating {0}")]
    Conflict(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error for the named resource
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict(resource.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was caused by a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Kubernetes 4xx responses other than conflicts need a spec or RBAC fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(ae)) => ae.code == 409 || !(400..500).contains(&ae.code),
            Error::Kube(_) => true,
            Error::Validation(_) => false,
            Error::Provision(e) => e.is_retryable(),
            Error::Conflict(_) => true,
            Error::Serialization(_) => false,
            Error::Internal(_) => true,
        }
    }
}

/// Returns true if the kube error is an HTTP 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Returns true if the kube error is an HTTP 409 AlreadyExists on create
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}
