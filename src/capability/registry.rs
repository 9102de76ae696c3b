use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::Specialist;

/// Lookup from a specialist name to its executor. Cloning shares the
/// underlying table; `restrict_to` produces an independent, narrower copy.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    specialists: Arc<RwLock<HashMap<String, Arc<dyn Specialist>>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, specialist: Arc<dyn Specialist>) {
        let name = specialist.name().to_string();
        debug!(capability = %name, "Specialist registered");
        self.specialists.write().insert(name, specialist);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Specialist>> {
        self.specialists.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specialists.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specialists.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.specialists.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.read().is_empty()
    }

    /// A new registry holding the intersection of this registry and
    /// `subset`. Names absent here are silently dropped, so a capability
    /// surface can only ever shrink when delegating downward.
    pub fn restrict_to(&self, subset: &[String]) -> CapabilityRegistry {
        let current = self.specialists.read();
        let restricted: HashMap<String, Arc<dyn Specialist>> = subset
            .iter()
            .filter_map(|name| {
                current
                    .get(name)
                    .map(|s| (name.clone(), Arc::clone(s)))
            })
            .collect();

        CapabilityRegistry {
            specialists: Arc::new(RwLock::new(restricted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::EchoSpecialist;

    fn registry_with(names: &[&str]) -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        for name in names {
            registry.register(Arc::new(EchoSpecialist::new(*name)));
        }
        registry
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry_with(&["search", "code_review"]);

        assert!(registry.contains("search"));
        assert!(registry.get("code_review").is_some());
        assert!(registry.get("deploy").is_none());
        assert_eq!(registry.names(), vec!["code_review", "search"]);
    }

    #[test]
    fn test_restriction_intersects() {
        let registry = registry_with(&["search", "code_review"]);

        // "deploy" is not in the parent, so it cannot be granted.
        let restricted =
            registry.restrict_to(&["code_review".to_string(), "deploy".to_string()]);

        assert_eq!(restricted.len(), 1);
        assert!(restricted.contains("code_review"));
        assert!(!restricted.contains("deploy"));
        assert!(!restricted.contains("search"));
    }

    #[test]
    fn test_restriction_is_independent() {
        let registry = registry_with(&["search"]);
        let restricted = registry.restrict_to(&["search".to_string()]);

        registry.register(Arc::new(EchoSpecialist::new("deploy")));
        assert!(!restricted.contains("deploy"));
    }
}
