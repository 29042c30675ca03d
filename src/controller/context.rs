//! Shared state for claim reconciliation

use std::future::Future;
use std::sync::Arc;

use dashmap::DashSet;
use kube::Client;

use crate::config::ProvisionerConfig;
use crate::error::ProvisionError;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::provisioner::Provisioner;
use crate::retry::Backoff;
use crate::store::{KubeResourceStore, ResourceStore};

/// Controller context containing shared state and clients
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client, provisioner)
///     .config(config)
///     .build();
/// ```
pub struct Context {
    /// Kubernetes persistence (trait object for testability)
    pub store: Arc<dyn ResourceStore>,
    /// Object store backend
    pub provisioner: Arc<dyn Provisioner>,
    /// Event publisher for claim transitions
    pub events: Arc<dyn EventPublisher>,
    /// Engine configuration
    pub config: ProvisionerConfig,
    /// Consecutive failure counts per claim
    pub backoff: Backoff,
    in_flight: DashSet<String>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, provisioner: Arc<dyn Provisioner>) -> ContextBuilder {
        ContextBuilder::new(client, provisioner)
    }

    /// Mark `key` as being reconciled
    ///
    /// Returns `None` if another reconcile for the same claim is running. The
    /// mark is released when the guard is dropped.
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard<'_>> {
        if self.in_flight.insert(key.to_string()) {
            Some(InFlightGuard {
                set: &self.in_flight,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    /// Run a backend call under the configured timeout
    ///
    /// Hitting the timeout is a transient failure.
    pub async fn call_store<T, F>(&self, op: &str, call: F) -> Result<T, ProvisionError>
    where
        F: Future<Output = Result<T, ProvisionError>>,
    {
        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::transient(format!(
                "{op} timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Create a context for testing with custom mock clients
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn ResourceStore>,
        provisioner: Arc<dyn Provisioner>,
        events: Arc<dyn EventPublisher>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            events,
            backoff: Backoff::new(config.backoff),
            config,
            in_flight: DashSet::new(),
        }
    }
}

/// Marks a claim as in flight until dropped
pub struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    provisioner: Arc<dyn Provisioner>,
    store: Option<Arc<dyn ResourceStore>>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ProvisionerConfig,
}

impl ContextBuilder {
    fn new(client: Client, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            client,
            provisioner,
            store: None,
            events: None,
            config: ProvisionerConfig::default(),
        }
    }

    /// Set the engine configuration
    pub fn config(mut self, config: ProvisionerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the resource store (primarily for testing)
    pub fn store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let events = self.events.unwrap_or_else(|| {
            Arc::new(KubeEventPublisher::new(
                self.client.clone(),
                &self.config.controller_name,
            ))
        });
        Context {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(KubeResourceStore::new(self.client.clone()))),
            provisioner: self.provisioner,
            events,
            backoff: Backoff::new(self.config.backoff),
            config: self.config,
            in_flight: DashSet::new(),
        }
    }
}
