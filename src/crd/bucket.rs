//! ObjectBucket Custom Resource Definition
//!
//! An ObjectBucket records a store-side bucket and how to reach it. Credentials
//! never live here; they are written to the claim's Secret.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BucketPhase, ObjectReference};

/// Specification for an ObjectBucket
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "objectbucket.io",
    version = "v1alpha1",
    kind = "ObjectBucket",
    plural = "objectbuckets",
    shortname = "ob",
    status = "ObjectBucketStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Bucket","type":"string","jsonPath":".spec.bucketName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketSpec {
    /// Store-side bucket name
    pub bucket_name: String,

    /// Connection descriptor for the store holding the bucket
    pub source: ObjectBucketSource,
}

/// Where and how to reach the object store
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketSource {
    /// Store endpoint host
    pub host: String,

    /// Store region
    pub region: String,

    /// Plain HTTP port
    pub port: u16,

    /// HTTPS port
    pub secure_port: u16,

    /// Whether clients should use TLS
    pub ssl: bool,

    /// Store tenant, for multi-tenant backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Store-side namespace, for backends that scope buckets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Whether object versioning is enabled
    #[serde(default)]
    pub versioned: bool,
}

/// Status for an ObjectBucket
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketStatus {
    /// Current phase of the bucket
    #[serde(default)]
    pub phase: BucketPhase,

    /// Back-reference to the owning claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_ref: Option<ObjectReference>,
}

impl ObjectBucket {
    /// UID of the claim recorded in `status.controllerRef`
    pub fn controller_uid(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.controller_ref.as_ref())
            .and_then(|r| r.uid.as_deref())
    }

    /// Whether this bucket's controllerRef names the claim with `uid`
    pub fn is_controlled_by(&self, uid: &str) -> bool {
        self.controller_uid() == Some(uid)
    }
}

impl ObjectBucketSpec {
    /// Connection info published in the claim's ConfigMap
    pub fn connection_data(&self) -> BTreeMap<String, String> {
        let src = &self.source;
        let mut data = BTreeMap::from([
            ("BUCKET_NAME".to_string(), self.bucket_name.clone()),
            ("BUCKET_HOST".to_string(), src.host.clone()),
            ("BUCKET_PORT".to_string(), src.port.to_string()),
            ("BUCKET_SECURE_PORT".to_string(), src.secure_port.to_string()),
            ("BUCKET_REGION".to_string(), src.region.clone()),
            ("BUCKET_SSL".to_string(), src.ssl.to_string()),
            ("BUCKET_VERSIONED".to_string(), src.versioned.to_string()),
        ]);
        if let Some(tenant) = &src.tenant {
            data.insert("BUCKET_TENANT".to_string(), tenant.clone());
        }
        if let Some(ns) = &src.namespace {
            data.insert("BUCKET_NAMESPACE".to_string(), ns.clone());
        }
        data
    }
}
