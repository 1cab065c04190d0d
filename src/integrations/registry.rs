// Integration Registry (spec §4.10): maps a unique name to a live
// instance or a factory, with the same double-checked-lock shape as
// `resilience::registry::BreakerRegistry`. Optional capabilities are
// modeled as a capability struct of optional function pointers (spec
// §9): the base trait exposes `as_lifecycle()` / `as_health_checkable()`
// / etc., each defaulting to `None`; a concrete integration overrides the
// ones it implements to return `Some(self)`.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait LifecycleAware: Send + Sync {
    async fn initialize(&self) -> CoreResult<()>;
    async fn shutdown(&self) -> CoreResult<()>;
}

#[async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> CoreResult<()>;
}

#[async_trait]
pub trait Refreshable: Send + Sync {
    async fn refresh_credentials(&self) -> CoreResult<()>;
}

#[async_trait]
pub trait Configurable: Send + Sync {
    async fn update_config(&self, config: Json) -> CoreResult<()>;
}

/// Base contract every registered integration satisfies. The `as_*`
/// methods are the capability-probe points; a concrete type overrides
/// the ones it supports to return `Some(self)`.
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;

    fn as_lifecycle(&self) -> Option<&dyn LifecycleAware> {
        None
    }
    fn as_health_checkable(&self) -> Option<&dyn HealthCheckable> {
        None
    }
    fn as_refreshable(&self) -> Option<&dyn Refreshable> {
        None
    }
    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

type Factory = Box<dyn Fn() -> Arc<dyn Integration> + Send + Sync>;

/// `name -> instance` plus `name -> factory` map, guarded by one RwLock
/// (reads on the hot lookup path, writes only on registration/creation).
pub struct IntegrationRegistry {
    instances: RwLock<HashMap<String, Arc<dyn Integration>>>,
    factories: RwLock<HashMap<String, Factory>>,
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a live instance under its own name. Fails if the name is
    /// already taken by either an instance or a factory.
    pub fn register(&self, instance: Arc<dyn Integration>) -> CoreResult<()> {
        let name = instance.name().to_string();
        let mut instances = self.instances.write();
        if instances.contains_key(&name) || self.factories.read().contains_key(&name) {
            return Err(CoreError::validation("name", format!("integration '{name}' is already registered")));
        }
        instances.insert(name, instance);
        Ok(())
    }

    /// Registers a factory under `name`, deferring construction until the
    /// first [`IntegrationRegistry::get_or_create`] call.
    pub fn register_factory(&self, name: impl Into<String>, factory: impl Fn() -> Arc<dyn Integration> + Send + Sync + 'static) -> CoreResult<()> {
        let name = name.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) || self.instances.read().contains_key(&name) {
            return Err(CoreError::validation("name", format!("integration '{name}' is already registered")));
        }
        factories.insert(name, Box::new(factory));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Integration>> {
        self.instances.read().get(name).cloned()
    }

    /// Returns the existing instance for `name`, or invokes its
    /// registered factory under a double-checked write lock.
    pub fn get_or_create(&self, name: &str) -> CoreResult<Arc<dyn Integration>> {
        if let Some(existing) = self.instances.read().get(name) {
            return Ok(existing.clone());
        }
        let mut instances = self.instances.write();
        // Double-checked: another writer may have created it while we
        // waited for the write lock.
        if let Some(existing) = instances.get(name) {
            return Ok(existing.clone());
        }
        let factories = self.factories.read();
        let factory = factories
            .get(name)
            .ok_or_else(|| CoreError::validation("name", format!("no integration or factory registered for '{name}'")))?;
        let instance = factory();
        instances.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().keys().cloned().collect();
        names.extend(self.factories.read().keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Shuts down every `LifecycleAware` instance sequentially, in
    /// arbitrary-but-stable map order, recording (and continuing past)
    /// the last error rather than aborting the sweep.
    pub async fn shutdown_all(&self) -> CoreResult<()> {
        let instances: Vec<Arc<dyn Integration>> = self.instances.read().values().cloned().collect();
        let mut last_error = None;
        for instance in instances {
            let Some(lifecycle) = instance.as_lifecycle() else { continue };
            let start = Instant::now();
            if let Err(e) = lifecycle.shutdown().await {
                tracing::warn!(integration = instance.name(), error = %e, elapsed = ?start.elapsed(), "integration shutdown failed");
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Probe {
        name: String,
        shutdown_called: AtomicBool,
        fail_shutdown: bool,
    }

    impl Integration for Probe {
        fn name(&self) -> &str {
            &self.name
        }
        fn as_lifecycle(&self) -> Option<&dyn LifecycleAware> {
            Some(self)
        }
    }

    #[async_trait]
    impl LifecycleAware for Probe {
        async fn initialize(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn shutdown(&self) -> CoreResult<()> {
            self.shutdown_called.store(true, Ordering::SeqCst);
            if self.fail_shutdown {
                Err(CoreError::Internal("shutdown failed".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Plain {
        name: String,
    }
    impl Integration for Plain {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = IntegrationRegistry::new();
        registry.register(Arc::new(Plain { name: "slack".into() })).unwrap();
        let err = registry.register(Arc::new(Plain { name: "slack".into() })).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn get_or_create_invokes_factory_once() {
        let registry = IntegrationRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry
            .register_factory("github", move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Arc::new(Plain { name: "github".into() })
            })
            .unwrap();

        let a = registry.get_or_create("github").unwrap();
        let b = registry.get_or_create("github").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_or_create_unknown_name_errors() {
        let registry = IntegrationRegistry::new();
        assert!(registry.get_or_create("missing").is_err());
    }

    #[tokio::test]
    async fn shutdown_all_records_last_error_and_continues() {
        let registry = IntegrationRegistry::new();
        let ok_probe = Arc::new(Probe {
            name: "a".into(),
            shutdown_called: AtomicBool::new(false),
            fail_shutdown: false,
        });
        let failing_probe = Arc::new(Probe {
            name: "b".into(),
            shutdown_called: AtomicBool::new(false),
            fail_shutdown: true,
        });
        registry.register(ok_probe.clone()).unwrap();
        registry.register(failing_probe.clone()).unwrap();

        let result = registry.shutdown_all().await;
        assert!(result.is_err());
        assert!(ok_probe.shutdown_called.load(Ordering::SeqCst));
        assert!(failing_probe.shutdown_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn integrations_without_lifecycle_are_skipped_on_shutdown() {
        let registry = IntegrationRegistry::new();
        registry.register(Arc::new(Plain { name: "plain".into() })).unwrap();
        assert!(registry.shutdown_all().await.is_ok());
    }
}
