//! # Callback Registry
//!
//! Maps stable descriptor strings to callables. The descriptor is the full
//! key ("target#method" by convention); resolution is an explicit lookup,
//! never reflection, so a deployment can verify at startup that every
//! descriptor it registers on batches actually has a handler.

use crate::batch::status::FinalStatusSnapshot;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// User-facing hook invoked when a batch event fires.
///
/// Handlers receive the immutable status snapshot captured at dispatch time
/// together with the options the registration carried. Both hooks default
/// to no-ops so a handler only implements the events it cares about.
#[async_trait]
pub trait BatchCallback: Send + Sync {
    async fn on_complete(&self, status: &FinalStatusSnapshot, options: &Value) -> Result<()> {
        let _ = (status, options);
        Ok(())
    }

    async fn on_success(&self, status: &FinalStatusSnapshot, options: &Value) -> Result<()> {
        let _ = (status, options);
        Ok(())
    }
}

/// Descriptor → handler lookup table
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: DashMap<String, Arc<dyn BatchCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a descriptor key. Replaces any previous
    /// handler for the same key.
    pub fn register(&self, descriptor: impl Into<String>, handler: Arc<dyn BatchCallback>) {
        self.handlers.insert(descriptor.into(), handler);
    }

    pub fn resolve(&self, descriptor: &str) -> Option<Arc<dyn BatchCallback>> {
        self.handlers.get(descriptor).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, descriptor: &str) -> bool {
        self.handlers.contains_key(descriptor)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl BatchCallback for Noop {}

    #[test]
    fn test_register_and_resolve() {
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        registry.register("reports.weekly#finished", Arc::new(Noop));
        assert!(registry.contains("reports.weekly#finished"));
        assert!(registry.resolve("reports.weekly#finished").is_some());
        assert!(registry.resolve("reports.daily#finished").is_none());
        assert_eq!(registry.len(), 1);
    }
}
