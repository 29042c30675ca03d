//! Runtime configuration
//!
//! [`ProvisionerConfig`] holds the engine knobs and [`S3Config`] describes the
//! backend. Both are plain values built once in `main` from CLI flags.

use std::fmt;
use std::time::Duration;

use url::{Host, Url};

use crate::crd::ObjectBucketSource;
use crate::retry::BackoffPolicy;
use crate::Error;

/// Default number of claims reconciled in parallel
pub const DEFAULT_CONCURRENCY: u16 = 4;

/// Default bound on a single provision/delete call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default steady-state resync for Bound claims
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue delay after an optimistic concurrency conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Engine configuration
#[derive(Clone, Debug)]
pub struct ProvisionerConfig {
    /// Only claims with this storageClass are served; `None` serves all
    pub storage_class: Option<String>,
    /// Maximum claims reconciled in parallel
    pub concurrency: u16,
    /// Per-call timeout for the store backend
    pub call_timeout: Duration,
    /// Requeue backoff for transient failures
    pub backoff: BackoffPolicy,
    /// How often Bound claims are re-checked without an event
    pub resync_interval: Duration,
    /// Name reported on Events and used as field manager
    pub controller_name: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            storage_class: None,
            concurrency: DEFAULT_CONCURRENCY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            backoff: BackoffPolicy::default(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            controller_name: crate::FIELD_MANAGER.to_string(),
        }
    }
}

impl ProvisionerConfig {
    /// Whether a claim with `storage_class` belongs to this provisioner
    pub fn serves(&self, storage_class: &str) -> bool {
        match &self.storage_class {
            Some(class) => class == storage_class,
            None => true,
        }
    }
}

/// Connection and credential settings for an S3-compatible store
#[derive(Clone)]
pub struct S3Config {
    /// Endpoint URL, e.g. `https://s3.internal:9000`
    pub endpoint: String,
    /// Region used for signing and bucket location
    pub region: String,
    /// Static access key issued to claims
    pub access_key_id: String,
    /// Static secret key issued to claims
    pub secret_access_key: String,
    /// Use path-style addressing (required by most self-hosted stores)
    pub force_path_style: bool,
    /// Enable object versioning on new buckets
    pub versioned: bool,
    /// Store tenant recorded on every ObjectBucket
    pub tenant: Option<String>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("force_path_style", &self.force_path_style)
            .field("versioned", &self.versioned)
            .field("tenant", &self.tenant)
            .finish()
    }
}

impl S3Config {
    /// Connection descriptor published on every ObjectBucket
    pub fn source(&self) -> Result<ObjectBucketSource, Error> {
        let endpoint = Endpoint::parse(&self.endpoint)?;
        let (port, secure_port) = if endpoint.ssl {
            (80, endpoint.port.unwrap_or(443))
        } else {
            (endpoint.port.unwrap_or(80), 443)
        };
        Ok(ObjectBucketSource {
            host: endpoint.host,
            region: self.region.clone(),
            port,
            secure_port,
            ssl: endpoint.ssl,
            tenant: self.tenant.clone(),
            namespace: None,
            versioned: self.versioned,
        })
    }
}

/// Scheme, host and optional port of an endpoint URL
#[derive(Debug, PartialEq, Eq)]
struct Endpoint {
    ssl: bool,
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    fn parse(endpoint: &str) -> Result<Self, Error> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::validation(format!("endpoint {endpoint:?} is not a URL: {e}")))?;

        let ssl = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(Error::validation(format!(
                    "endpoint {endpoint:?} has scheme {other:?}, expected http or https"
                )))
            }
        };

        let host = match url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => return Err(Error::validation(format!("endpoint {endpoint:?} has no host"))),
        };

        Ok(Self {
            ssl,
            host,
            port: url.port(),
        })
    }
}
