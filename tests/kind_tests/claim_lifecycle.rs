//! Integration tests for the claim lifecycle
//!
//! These tests drive the real reconciler against a real API server. The
//! object store is an in-memory provisioner so no S3 endpoint is needed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use objectbucket_provisioner::config::ProvisionerConfig;
use objectbucket_provisioner::controller::{reconcile, Context};
use objectbucket_provisioner::crd::{
    ClaimPhase, ObjectBucket, ObjectBucketClaim, ObjectBucketClaimSpec, ObjectBucketSource,
    ObjectBucketSpec,
};
use objectbucket_provisioner::events::NoopEventPublisher;
use objectbucket_provisioner::provisioner::{
    bucket_name_for, Credentials, ProvisionedBucket, Provisioner,
};
use objectbucket_provisioner::ProvisionError;

use super::helpers::{ensure_test_cluster, TEST_NAMESPACE};

/// Object store that only remembers bucket names
#[derive(Default)]
struct InMemoryProvisioner {
    buckets: Mutex<HashSet<String>>,
}

#[async_trait]
impl Provisioner for InMemoryProvisioner {
    async fn provision(
        &self,
        claim: &ObjectBucketClaim,
    ) -> Result<ProvisionedBucket, ProvisionError> {
        let name = bucket_name_for(claim)?;
        self.buckets.lock().unwrap().insert(name.clone());
        Ok(ProvisionedBucket {
            bucket: ObjectBucket::new(
                "ignored",
                ObjectBucketSpec {
                    bucket_name: name,
                    source: ObjectBucketSource {
                        host: "memory.local".to_string(),
                        region: "us-east-1".to_string(),
                        port: 80,
                        secure_port: 443,
                        ..Default::default()
                    },
                },
            ),
            credentials: Credentials::new("AKIA", "secret"),
        })
    }

    async fn delete(&self, claim: &ObjectBucketClaim) -> Result<(), ProvisionError> {
        let name = bucket_name_for(claim)?;
        self.buckets.lock().unwrap().remove(&name);
        Ok(())
    }
}

fn context(client: Client, provisioner: Arc<InMemoryProvisioner>) -> Arc<Context> {
    Arc::new(
        Context::builder(client, provisioner)
            .config(ProvisionerConfig::default())
            .events(Arc::new(NoopEventPublisher))
            .build(),
    )
}

/// Reconcile the claim a few times, re-reading it between passes
async fn drive(api: &Api<ObjectBucketClaim>, ctx: &Arc<Context>, name: &str) {
    for _ in 0..5 {
        let Some(claim) = api.get_opt(name).await.expect("failed to read claim") else {
            return;
        };
        let _ = reconcile(Arc::new(claim), ctx.clone()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Story: a team requests a bucket and later gives it back
///
/// Expected behavior:
/// - The claim becomes Bound with an ObjectBucket, Secret and ConfigMap
/// - Deleting the claim removes the store bucket and releases the claim
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_claim_is_bound_and_released() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let claims: Api<ObjectBucketClaim> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "lifecycle-c1";
    let _ = claims.delete(name, &DeleteParams::default()).await;

    let provisioner = Arc::new(InMemoryProvisioner::default());
    let ctx = context(client.clone(), provisioner.clone());

    let claim = ObjectBucketClaim::new(
        name,
        ObjectBucketClaimSpec {
            storage_class: "s3-fast".to_string(),
        },
    );
    claims
        .create(&PostParams::default(), &claim)
        .await
        .expect("failed to create claim");

    drive(&claims, &ctx, name).await;

    let bound = claims.get(name).await.expect("failed to get claim");
    assert_eq!(bound.phase(), ClaimPhase::Bound);
    let store_bucket = bucket_name_for(&bound).expect("claim name should map to a bucket");
    assert!(store_bucket.starts_with("obc-test-lifecycle-c1-"));
    let status = bound.status.expect("status should be set");
    assert_eq!(
        status.object_bucket_ref.map(|r| r.name).as_deref(),
        Some("lifecycle-c1-bucket")
    );

    let buckets: Api<ObjectBucket> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    assert!(buckets.get_opt("lifecycle-c1-bucket").await.unwrap().is_some());
    assert!(secrets.get_opt(name).await.unwrap().is_some());
    assert!(config_maps.get_opt(name).await.unwrap().is_some());
    assert!(provisioner
        .buckets
        .lock()
        .unwrap()
        .contains(&store_bucket));

    claims
        .delete(name, &DeleteParams::default())
        .await
        .expect("failed to delete claim");
    drive(&claims, &ctx, name).await;

    assert!(claims.get_opt(name).await.unwrap().is_none());
    assert!(provisioner.buckets.lock().unwrap().is_empty());
    assert!(buckets.get_opt("lifecycle-c1-bucket").await.unwrap().is_none());
}
