//! S3-compatible [`Provisioner`] backend

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials as StaticCredentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    VersioningConfiguration,
};
use aws_sdk_s3::Client as S3Client;
use kube::ResourceExt;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::{bucket_name_for, Credentials, ProvisionedBucket, Provisioner};
use crate::config::S3Config;
use crate::crd::{ObjectBucket, ObjectBucketClaim, ObjectBucketSource, ObjectBucketSpec};
use crate::error::ProvisionError;

/// Region S3 treats as the default location; it must not be sent as a
/// LocationConstraint
const DEFAULT_REGION: &str = "us-east-1";

/// Bucket-level S3 calls the provisioner needs
///
/// Every method has already classified its failure as transient or terminal.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait S3Api: Send + Sync {
    /// HeadBucket; `Ok(false)` when the bucket does not exist
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProvisionError>;

    /// CreateBucket; succeeds if we already own the bucket
    async fn create_bucket(&self, bucket: &str) -> Result<(), ProvisionError>;

    /// PutBucketVersioning with status Enabled
    async fn enable_versioning(&self, bucket: &str) -> Result<(), ProvisionError>;

    /// DeleteBucket; succeeds if the bucket is already gone
    async fn delete_bucket(&self, bucket: &str) -> Result<(), ProvisionError>;
}

/// [`S3Api`] over the AWS SDK client
pub struct SdkS3Api {
    client: S3Client,
    region: String,
}

impl SdkS3Api {
    /// Build a client for the configured endpoint with static credentials
    pub async fn connect(config: &S3Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(StaticCredentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                "objectbucket-provisioner",
            ))
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self {
            client: S3Client::from_conf(s3_config),
            region: config.region.clone(),
        }
    }
}

#[async_trait]
impl S3Api for SdkS3Api {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProvisionError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err.raw_response().map(|r| r.status().as_u16()) == Some(404);
                if not_found {
                    Ok(false)
                } else {
                    Err(sdk_error("HeadBucket", bucket, err))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ProvisionError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                debug!(bucket, "bucket already owned by us");
                Ok(())
            }
            Err(err) => Err(sdk_error("CreateBucket", bucket, err)),
        }
    }

    async fn enable_versioning(&self, bucket: &str) -> Result<(), ProvisionError> {
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map(|_| ())
            .map_err(|err| sdk_error("PutBucketVersioning", bucket, err))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), ProvisionError> {
        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("NoSuchBucket") => {
                debug!(bucket, "bucket already deleted");
                Ok(())
            }
            Err(err) => Err(sdk_error("DeleteBucket", bucket, err)),
        }
    }
}

/// Turn an SDK failure into a classified [`ProvisionError`]
fn sdk_error<E>(op: &str, bucket: &str, err: SdkError<E, HttpResponse>) -> ProvisionError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProvisionError::transient(format!("{op} {bucket}: {}", DisplayErrorContext(&err)))
        }
        _ => {
            let status = err.raw_response().map(|r| r.status().as_u16());
            let detail = format!("{op} {bucket}: {}", err.message().unwrap_or("no message"));
            classify_code(err.code(), status, detail)
        }
    }
}

/// Classify an S3 error code and HTTP status
///
/// Known codes decide on their own. Without a recognised code, 408, 429 and
/// 5xx are transient and every other 4xx is terminal.
pub fn classify_code(code: Option<&str>, status: Option<u16>, detail: String) -> ProvisionError {
    let label = code.unwrap_or("Unknown");
    let msg = format!("{label}: {detail}");

    match code {
        Some(
            "InvalidBucketName"
            | "BucketAlreadyExists"
            | "TooManyBuckets"
            | "QuotaExceeded"
            | "AccessDenied"
            | "AllAccessDisabled"
            | "AccountProblem"
            | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch"
            | "InvalidLocationConstraint"
            | "IllegalLocationConstraintException"
            | "MethodNotAllowed"
            | "NotImplemented",
        ) => ProvisionError::terminal(msg),
        Some(
            "BucketNotEmpty"
            | "SlowDown"
            | "Throttling"
            | "ThrottlingException"
            | "RequestTimeout"
            | "RequestTimeTooSkewed"
            | "InternalError"
            | "ServiceUnavailable"
            | "OperationAborted",
        ) => ProvisionError::transient(msg),
        _ => match status {
            Some(408 | 429) => ProvisionError::transient(msg),
            Some(s) if (400..500).contains(&s) => ProvisionError::terminal(msg),
            _ => ProvisionError::transient(msg),
        },
    }
}

/// [`Provisioner`] that creates one bucket per claim on an S3-compatible store
///
/// Every claim receives the configured static key pair.
pub struct S3Provisioner {
    api: Arc<dyn S3Api>,
    source: ObjectBucketSource,
    credentials: Credentials,
}

impl S3Provisioner {
    /// Create a provisioner over an existing [`S3Api`]
    pub fn new(api: Arc<dyn S3Api>, config: &S3Config) -> crate::Result<Self> {
        Ok(Self {
            api,
            source: config.source()?,
            credentials: Credentials::new(&config.access_key_id, &config.secret_access_key),
        })
    }

    /// Connect to the configured endpoint with the AWS SDK
    pub async fn connect(config: &S3Config) -> crate::Result<Self> {
        let api = SdkS3Api::connect(config).await;
        Self::new(Arc::new(api), config)
    }
}

#[async_trait]
impl Provisioner for S3Provisioner {
    async fn provision(
        &self,
        claim: &ObjectBucketClaim,
    ) -> Result<ProvisionedBucket, ProvisionError> {
        let bucket_name = bucket_name_for(claim)?;

        if self.api.bucket_exists(&bucket_name).await? {
            debug!(bucket = %bucket_name, "store bucket already exists");
        } else {
            self.api.create_bucket(&bucket_name).await?;
            info!(bucket = %bucket_name, claim = %claim.name_any(), "created store bucket");
        }

        if self.source.versioned {
            self.api.enable_versioning(&bucket_name).await?;
        }

        let mut bucket = ObjectBucket::new(
            &claim.bucket_object_name(),
            ObjectBucketSpec {
                bucket_name,
                source: self.source.clone(),
            },
        );
        bucket.metadata.namespace = claim.namespace();

        Ok(ProvisionedBucket {
            bucket,
            credentials: self.credentials.clone(),
        })
    }

    async fn delete(&self, claim: &ObjectBucketClaim) -> Result<(), ProvisionError> {
        // A claim whose name cannot map to a bucket never had one created
        let Ok(bucket_name) = bucket_name_for(claim) else {
            debug!(claim = %claim.name_any(), "no valid bucket name, nothing to delete");
            return Ok(());
        };

        self.api.delete_bucket(&bucket_name).await?;
        info!(bucket = %bucket_name, claim = %claim.name_any(), "deleted store bucket");
        Ok(())
    }
}
