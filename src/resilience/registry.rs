// Breaker registry keyed by name (typically `method+host`), with
// double-checked lazy construction so concurrent first-uses of the same
// name never construct two breakers (spec §4.4).

use super::{CircuitBreaker, CircuitBreakerConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
        }
    }

    /// Returns the existing breaker for `name`, or constructs one with
    /// this registry's default config.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, || self.default_config.clone())
    }

    /// Returns the existing breaker for `name`, or constructs one with a
    /// caller-supplied config (used only on first creation).
    pub fn get_or_create_with(
        &self,
        name: &str,
        make_config: impl FnOnce() -> CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write();
        // Double-checked: another writer may have created it while we
        // waited for the write lock.
        if let Some(existing) = breakers.get(name) {
            return existing.clone();
        }
        let breaker = Arc::new(CircuitBreaker::new(make_config()));
        breakers.insert(name.to_string(), breaker.clone());
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("POST:api.example.com");
        let b = registry.get_or_create("POST:api.example.com");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_names_get_distinct_breakers() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
