//! In-memory fakes for reconcile tests
//!
//! `FakeStore` behaves like a tiny API server: it bumps resourceVersions,
//! rejects stale claim writes and finishes a delete once the last finalizer
//! is gone. `FakeS3` keeps a set of bucket names with injectable failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::runtime::controller::Action;
use kube::ResourceExt;

use crate::config::S3Config;
use crate::crd::{
    ObjectBucket, ObjectBucketClaim, ObjectBucketClaimSpec, ObjectBucketClaimStatus,
    ObjectBucketSource, ObjectBucketSpec, ObjectBucketStatus,
};
use crate::error::ProvisionError;
use crate::provisioner::{ProvisionedBucket, Provisioner, S3Api, S3Provisioner};
use crate::store::{artifacts, ResourceStore};
use crate::{Error, FINALIZER};

/// Claim `name` in namespace `default` with uid `uid-<name>`
pub fn claim(name: &str, storage_class: &str) -> ObjectBucketClaim {
    let mut c = ObjectBucketClaim::new(
        name,
        ObjectBucketClaimSpec {
            storage_class: storage_class.to_string(),
        },
    );
    c.metadata.namespace = Some("default".to_string());
    c.metadata.uid = Some(format!("uid-{name}"));
    c.metadata.generation = Some(1);
    c
}

/// Mark a claim as deleted, optionally carrying our finalizer
pub fn deleting(mut claim: ObjectBucketClaim, with_finalizer: bool) -> ObjectBucketClaim {
    claim.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    if with_finalizer {
        claim.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    }
    claim
}

/// Final result of driving a claim through reconcile
pub enum ReconcileOutcome {
    /// Reconcile returned an action
    Action(Action),
    /// Reconcile returned an error
    Error(Error),
    /// The claim no longer exists
    Gone,
}

impl ReconcileOutcome {
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Action(a) => Some(a.clone()),
            _ => None,
        }
    }

    #[allow(dead_code)]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

fn key_of<K: ResourceExt>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

fn next_version(current: Option<&str>) -> String {
    let n: u64 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

#[derive(Default)]
pub struct FakeStore {
    claims: Mutex<HashMap<String, ObjectBucketClaim>>,
    buckets: Mutex<HashMap<String, ObjectBucket>>,
    secrets: Mutex<HashMap<String, Secret>>,
    config_maps: Mutex<HashMap<String, ConfigMap>>,
    status_writes: AtomicUsize,
}

impl FakeStore {
    pub fn insert_claim(&self, mut claim: ObjectBucketClaim) {
        claim.metadata.resource_version = Some("1".to_string());
        self.claims.lock().unwrap().insert(key_of(&claim), claim);
    }

    pub fn claim(&self, key: &str) -> Option<ObjectBucketClaim> {
        self.claims.lock().unwrap().get(key).cloned()
    }

    /// Drop the claim's status, as if the status write never landed
    pub fn reset_status(&self, key: &str) {
        self.mutate_claim(key, |c| c.status = None);
    }

    /// Simulate `kubectl delete` on a claim
    pub fn mark_deleted(&self, key: &str) {
        self.mutate_claim(key, |c| {
            c.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        });
    }

    fn mutate_claim(&self, key: &str, f: impl FnOnce(&mut ObjectBucketClaim)) {
        let mut claims = self.claims.lock().unwrap();
        let claim = claims.get_mut(key).unwrap();
        f(claim);
        claim.metadata.resource_version =
            Some(next_version(claim.metadata.resource_version.as_deref()));
    }

    /// Guarded write to a stored claim, failing on a stale resourceVersion
    fn write_claim(
        &self,
        claim: &ObjectBucketClaim,
        f: impl FnOnce(&mut ObjectBucketClaim),
    ) -> Result<(), Error> {
        let key = key_of(claim);
        let mut claims = self.claims.lock().unwrap();
        let stored = claims
            .get_mut(&key)
            .ok_or_else(|| Error::internal(format!("claim {key} not found")))?;
        if stored.metadata.resource_version != claim.metadata.resource_version {
            return Err(Error::conflict(key));
        }
        f(stored);
        stored.metadata.resource_version =
            Some(next_version(stored.metadata.resource_version.as_deref()));

        let released = stored.metadata.deletion_timestamp.is_some()
            && stored.finalizers().is_empty();
        if released {
            claims.remove(&key);
        }
        Ok(())
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn bucket(&self, key: &str) -> Option<ObjectBucket> {
        self.buckets.lock().unwrap().get(key).cloned()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }

    pub fn remove_bucket(&self, key: &str) {
        self.buckets.lock().unwrap().remove(key);
    }

    pub fn set_bucket_status(&self, key: &str, status: ObjectBucketStatus) {
        if let Some(b) = self.buckets.lock().unwrap().get_mut(key) {
            b.status = Some(status);
        }
    }

    /// Store an ObjectBucket owned and controlled by `owner`
    pub fn insert_bucket_for(&self, owner: &ObjectBucketClaim) {
        let bucket = ObjectBucket::new(
            &owner.bucket_object_name(),
            ObjectBucketSpec {
                bucket_name: "leftover".to_string(),
                source: ObjectBucketSource::default(),
            },
        );
        let mut bucket = artifacts::prepare_bucket(owner, bucket).unwrap();
        bucket.status = Some(artifacts::bound_bucket_status(owner));
        self.buckets.lock().unwrap().insert(key_of(&bucket), bucket);
    }

    pub fn secret(&self, key: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(key).cloned()
    }

    pub fn remove_secret(&self, key: &str) {
        self.secrets.lock().unwrap().remove(key);
    }

    pub fn config_map(&self, key: &str) -> Option<ConfigMap> {
        self.config_maps.lock().unwrap().get(key).cloned()
    }

    pub fn remove_config_map(&self, key: &str) {
        self.config_maps.lock().unwrap().remove(key);
    }

    /// Store a Secret created by a user, owned by no claim
    pub fn insert_user_secret(&self, namespace: &str, name: &str) {
        let secret = Secret {
            metadata: user_meta(namespace, name),
            string_data: Some(BTreeMap::from([(
                "password".to_string(),
                "hunter2".to_string(),
            )])),
            ..Default::default()
        };
        self.secrets.lock().unwrap().insert(key_of(&secret), secret);
    }

    /// Store a ConfigMap created by a user, owned by no claim
    pub fn insert_user_config_map(&self, namespace: &str, name: &str) {
        let config_map = ConfigMap {
            metadata: user_meta(namespace, name),
            data: Some(BTreeMap::from([("app.conf".to_string(), "debug=1".to_string())])),
            ..Default::default()
        };
        self.config_maps
            .lock()
            .unwrap()
            .insert(key_of(&config_map), config_map);
    }
}

fn user_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-user-{name}")),
        ..Default::default()
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn patch_claim_status(
        &self,
        claim: &ObjectBucketClaim,
        status: &ObjectBucketClaimStatus,
    ) -> Result<(), Error> {
        self.write_claim(claim, |c| c.status = Some(status.clone()))?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_finalizer(&self, claim: &ObjectBucketClaim) -> Result<(), Error> {
        self.write_claim(claim, |c| {
            c.metadata
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(FINALIZER.to_string());
        })
    }

    async fn remove_finalizer(&self, claim: &ObjectBucketClaim) -> Result<(), Error> {
        self.write_claim(claim, |c| {
            if let Some(finalizers) = c.metadata.finalizers.as_mut() {
                finalizers.retain(|f| f != FINALIZER);
            }
        })
    }

    async fn get_bucket(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObjectBucket>, Error> {
        Ok(self.bucket(&format!("{namespace}/{name}")))
    }

    async fn create_bucket(&self, bucket: &ObjectBucket) -> Result<ObjectBucket, Error> {
        let key = key_of(bucket);
        let mut buckets = self.buckets.lock().unwrap();
        let stored = buckets.entry(key).or_insert_with(|| {
            let mut created = bucket.clone();
            created.metadata.uid = Some(format!("uid-{}", bucket.name_any()));
            created.metadata.resource_version = Some("1".to_string());
            created
        });
        Ok(stored.clone())
    }

    async fn patch_bucket_status(
        &self,
        bucket: &ObjectBucket,
        status: &ObjectBucketStatus,
    ) -> Result<(), Error> {
        let key = key_of(bucket);
        let mut buckets = self.buckets.lock().unwrap();
        let stored = buckets
            .get_mut(&key)
            .ok_or_else(|| Error::internal(format!("ObjectBucket {key} not found")))?;
        stored.status = Some(status.clone());
        Ok(())
    }

    async fn delete_bucket(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.remove_bucket(&format!("{namespace}/{name}"));
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secret(&format!("{namespace}/{name}")))
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        self.secrets
            .lock()
            .unwrap()
            .insert(key_of(secret), secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.remove_secret(&format!("{namespace}/{name}"));
        Ok(())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        Ok(self.config_map(&format!("{namespace}/{name}")))
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        self.config_maps
            .lock()
            .unwrap()
            .insert(key_of(config_map), config_map.clone());
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.remove_config_map(&format!("{namespace}/{name}"));
        Ok(())
    }
}

/// Object store holding bucket names in memory
#[derive(Default)]
pub struct FakeS3 {
    buckets: Mutex<HashSet<String>>,
    create_failure: Mutex<Option<ProvisionError>>,
    delete_failure: Mutex<Option<ProvisionError>>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FakeS3 {
    /// An [`S3Provisioner`] talking to this fake
    pub fn provisioner(self: &Arc<Self>) -> Arc<dyn Provisioner> {
        let config = S3Config {
            endpoint: "https://s3.internal".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            force_path_style: true,
            versioned: false,
            tenant: None,
        };
        let api: Arc<dyn S3Api> = self.clone();
        Arc::new(S3Provisioner::new(api, &config).unwrap())
    }

    pub fn fail_create(&self, err: ProvisionError) {
        *self.create_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_delete(&self, err: ProvisionError) {
        *self.delete_failure.lock().unwrap() = Some(err);
    }

    pub fn clear_failures(&self) {
        *self.create_failure.lock().unwrap() = None;
        *self.delete_failure.lock().unwrap() = None;
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains(name)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProvisionError> {
        Ok(self.has_bucket(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ProvisionError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn enable_versioning(&self, _bucket: &str) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), ProvisionError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.delete_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.buckets.lock().unwrap().remove(bucket);
        Ok(())
    }
}

/// Provisioner that takes a while and then reports the store as busy
///
/// Tracks how many calls overlapped.
pub struct SlowProvisioner {
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl SlowProvisioner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for SlowProvisioner {
    async fn provision(
        &self,
        _claim: &ObjectBucketClaim,
    ) -> Result<ProvisionedBucket, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Err(ProvisionError::transient("store busy"))
    }

    async fn delete(&self, _claim: &ObjectBucketClaim) -> Result<(), ProvisionError> {
        Ok(())
    }
}
