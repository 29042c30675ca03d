//! Composition root: wires a [`Provisioner`] into the claim controller
//!
//! ```ignore
//! let provisioner = Arc::new(S3Provisioner::connect(&s3).await?);
//! BucketProvisioner::new(client, provisioner, config)
//!     .with_crds(true)
//!     .run()
//!     .await?;
//! ```

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{watcher, Controller};
use kube::{Client, ResourceExt};
use tracing::{debug, error, info};

use crate::config::ProvisionerConfig;
use crate::controller::{error_policy, reconcile, Context};
use crate::crd::{crds, ObjectBucket, ObjectBucketClaim};
use crate::provisioner::Provisioner;
use crate::retry::{retry_transient, StartupRetry};
use crate::{Error, FIELD_MANAGER, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

/// Watch timeout in seconds; must stay below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Attempts for installing CRDs at startup
const CRD_INSTALL_ATTEMPTS: u32 = 5;

/// Runs the ObjectBucketClaim controller against one backend
pub struct BucketProvisioner {
    client: Client,
    provisioner: Arc<dyn Provisioner>,
    config: ProvisionerConfig,
    manage_crds: bool,
}

impl BucketProvisioner {
    /// Create a provisioner engine for `provisioner`
    pub fn new(
        client: Client,
        provisioner: Arc<dyn Provisioner>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            client,
            provisioner,
            config,
            manage_crds: false,
        }
    }

    /// Install or update the CRDs before starting the controller
    pub fn with_crds(mut self, install: bool) -> Self {
        self.manage_crds = install;
        self
    }

    /// Server-side apply every CRD this engine serves
    pub async fn install_crds(&self) -> Result<(), Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let retry = StartupRetry::new(CRD_INSTALL_ATTEMPTS);

        for crd in crds() {
            let name = crd.name_any();
            info!(crd = %name, "installing CRD");
            retry_transient(&retry, "install_crd", || {
                let api = api.clone();
                let params = params.clone();
                let crd = crd.clone();
                let name = name.clone();
                async move {
                    api.patch(&name, &params, &Patch::Apply(&crd))
                        .await
                        .map_err(Error::from)
                }
            })
            .await?;
        }
        info!("CRDs installed/updated");
        Ok(())
    }

    /// Run the controller until a shutdown signal arrives
    pub async fn run(self) -> Result<(), Error> {
        if self.manage_crds {
            self.install_crds().await?;
        }

        let client = self.client.clone();
        let concurrency = self.config.concurrency;
        log_startup(&self.config);

        let ctx = Arc::new(
            Context::builder(client.clone(), self.provisioner)
                .config(self.config)
                .build(),
        );

        let watcher_config = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);
        let artifacts_config = || watcher_config().labels(&artifact_selector());

        Controller::new(Api::<ObjectBucketClaim>::all(client.clone()), watcher_config())
            .owns(Api::<ObjectBucket>::all(client.clone()), watcher_config())
            .owns(Api::<Secret>::all(client.clone()), artifacts_config())
            .owns(Api::<ConfigMap>::all(client), artifacts_config())
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result)
            .await;

        info!("controller stopped");
        Ok(())
    }
}

fn log_startup(config: &ProvisionerConfig) {
    info!(
        storage_class = config.storage_class.as_deref().unwrap_or("*"),
        concurrency = config.concurrency,
        call_timeout_secs = config.call_timeout.as_secs(),
        "starting ObjectBucketClaim controller"
    );
}

/// Label selector matching the Secrets and ConfigMaps we generate
fn artifact_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}

type ReconcileResult =
    Result<(ObjectRef<ObjectBucketClaim>, Action), controller::Error<Error, watcher::Error>>;

async fn log_reconcile_result(result: ReconcileResult) {
    match result {
        Ok((obj, action)) => debug!(claim = %obj, ?action, "claim reconciliation completed"),
        Err(e) => error!(error = ?e, "claim reconciliation error"),
    }
}
