//! # Batch Engine
//!
//! The composition root: a shared store provider, the lock manager, the
//! callback registry, and the installed invocation channel. All protocol
//! operations hang off [`BatchEngine`]; the struct is a cheap handle
//! (`Arc` inside) made to be cloned into every context that reports on
//! work items.

use crate::batch::{Batch, BatchStatus};
use crate::callback::channel::{CallbackChannel, InProcessChannel};
use crate::callback::registry::CallbackRegistry;
use crate::config::BatcherConfig;
use crate::error::{BatcherError, Result};
use crate::lock::LockManager;
use crate::store::{StoreProvider, StoreService};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

pub(crate) struct EngineInner {
    pub(crate) store: StoreProvider,
    pub(crate) config: BatcherConfig,
    pub(crate) locks: LockManager,
    pub(crate) registry: Arc<CallbackRegistry>,
    pub(crate) channel: OnceLock<Arc<dyn CallbackChannel>>,
}

/// Handle to the batch completion tracking engine.
#[derive(Clone)]
pub struct BatchEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEngine")
            .field("store", &self.inner.store.provider_name())
            .field("registry", &self.inner.registry)
            .field("channel_installed", &self.inner.channel.get().is_some())
            .finish()
    }
}

impl BatchEngine {
    /// Create an engine over an already-constructed store provider.
    pub fn new(store: StoreProvider, config: BatcherConfig) -> Self {
        Self::with_registry(store, config, Arc::new(CallbackRegistry::new()))
    }

    /// Create an engine with a pre-populated callback registry.
    pub fn with_registry(
        store: StoreProvider,
        config: BatcherConfig,
        registry: Arc<CallbackRegistry>,
    ) -> Self {
        let locks = LockManager::new(store.clone(), config.lock_timeout, config.lock_max_wait);
        Self {
            inner: Arc::new(EngineInner {
                store,
                config,
                locks,
                registry,
                channel: OnceLock::new(),
            }),
        }
    }

    /// Connect the store named by the configuration and build an engine
    /// over it.
    pub async fn from_config(config: BatcherConfig) -> Result<Self> {
        let store = StoreProvider::from_config(&config).await?;
        Ok(Self::new(store, config))
    }

    /// Install the callback invocation channel. One-shot; a second install
    /// is a configuration error.
    pub fn install_channel(&self, channel: Arc<dyn CallbackChannel>) -> Result<()> {
        self.inner.channel.set(channel).map_err(|_| {
            BatcherError::ConfigurationError("callback channel already installed".to_string())
        })
    }

    /// Install the in-process channel, which resolves descriptors against
    /// this engine's registry on spawned tasks.
    pub fn install_in_process_channel(&self) -> Result<()> {
        self.install_channel(Arc::new(InProcessChannel::new(self)))
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.inner.registry
    }

    /// Open a new top-level batch.
    pub fn create_batch(&self) -> Batch {
        Batch::new(self.clone(), None, None)
    }

    /// Re-attach to an existing batch by id.
    pub fn attach(&self, bid: &str) -> Batch {
        Batch::new(self.clone(), Some(bid.to_string()), None)
    }

    /// Live status view for a batch.
    pub fn status(&self, bid: &str) -> BatchStatus {
        BatchStatus::new(self.inner.store.clone(), bid.to_string())
    }

    /// Health of the underlying store.
    pub async fn health_check(&self) -> Result<bool> {
        Ok(self.inner.store.health_check().await?)
    }

    pub(crate) fn store(&self) -> &StoreProvider {
        &self.inner.store
    }

    pub(crate) fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    pub(crate) fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    pub(crate) fn channel(&self) -> Result<Arc<dyn CallbackChannel>> {
        self.inner
            .channel
            .get()
            .cloned()
            .ok_or(BatcherError::ChannelNotInstalled)
    }

    pub(crate) fn downgrade(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_install_is_one_shot() {
        let engine = BatchEngine::new(StoreProvider::memory(), BatcherConfig::default());
        engine.install_in_process_channel().unwrap();
        assert!(matches!(
            engine.install_in_process_channel(),
            Err(BatcherError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_attach_reuses_bid() {
        let engine = BatchEngine::new(StoreProvider::memory(), BatcherConfig::default());
        let batch = engine.attach("existing-bid");
        assert_eq!(batch.bid(), "existing-bid");
    }
}
