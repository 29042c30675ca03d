//! objectbucket-provisioner - provisions S3-compatible buckets for ObjectBucketClaims

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::Client;

use objectbucket_provisioner::config::{ProvisionerConfig, S3Config};
use objectbucket_provisioner::crd::crds_yaml;
use objectbucket_provisioner::provisioner::S3Provisioner;
use objectbucket_provisioner::telemetry::init_telemetry;
use objectbucket_provisioner::BucketProvisioner;

/// objectbucket-provisioner - CRD-driven bucket provisioning for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "objectbucket-provisioner", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ObjectBucketClaim controller
    ///
    /// Watches claims in every namespace and binds each one to a bucket on
    /// the configured S3-compatible store.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// S3 endpoint URL, e.g. https://s3.example.com:9000
    #[arg(long, env = "S3_ENDPOINT")]
    s3_endpoint: String,

    /// Region buckets are created in
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    s3_region: String,

    /// Access key handed to every claim
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    access_key: String,

    /// Secret key handed to every claim
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_key: String,

    /// Use path-style addressing (required by most self-hosted stores)
    #[arg(long, env = "S3_PATH_STYLE")]
    path_style: bool,

    /// Enable object versioning on new buckets
    #[arg(long, env = "S3_VERSIONED")]
    versioned: bool,

    /// Tenant published in connection info, for multi-tenant stores
    #[arg(long, env = "S3_TENANT")]
    tenant: Option<String>,

    /// Only serve claims with this storage class (default: all)
    #[arg(long, env = "OBC_STORAGE_CLASS")]
    storage_class: Option<String>,

    /// Claims reconciled in parallel
    #[arg(long, env = "OBC_CONCURRENCY", default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Timeout for each object store call, in seconds
    #[arg(long, default_value_t = 30)]
    call_timeout_secs: u64,

    /// Interval between consistency checks of bound claims, in seconds
    #[arg(long, default_value_t = 300)]
    resync_secs: u64,

    /// Install or update the CRDs on startup
    #[arg(long, env = "OBC_INSTALL_CRDS")]
    install_crds: bool,

    /// Emit logs as JSON
    #[arg(long, env = "OBC_JSON_LOGS")]
    json_logs: bool,
}

impl ControllerArgs {
    fn s3_config(&self) -> S3Config {
        S3Config {
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key_id: self.access_key.clone(),
            secret_access_key: self.secret_key.clone(),
            force_path_style: self.path_style,
            versioned: self.versioned,
            tenant: self.tenant.clone(),
        }
    }

    fn provisioner_config(&self) -> ProvisionerConfig {
        ProvisionerConfig {
            storage_class: self.storage_class.clone(),
            concurrency: self.concurrency,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            resync_interval: Duration::from_secs(self.resync_secs),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube and the S3 client share one process-wide rustls provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crds_yaml()?);
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => anyhow::bail!("no command given, see `objectbucket-provisioner --help`"),
    }
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    init_telemetry(args.json_logs)?;

    let s3 = args.s3_config();
    tracing::info!(?s3, "connecting to object store");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {e}"))?;
    let provisioner = Arc::new(S3Provisioner::connect(&s3).await?);

    BucketProvisioner::new(client, provisioner, args.provisioner_config())
        .with_crds(args.install_crds)
        .run()
        .await?;
    Ok(())
}
