//! Type-keyed capability storage
//!
//! A [`FeatureSet`] holds at most one value per Rust type. Sources register
//! transport capabilities into a context's feature set; middleware looks them
//! up by type without knowing which transport produced the message.
//!
//! Absence is a normal outcome: lookups return `Option`, never panic.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Heterogeneous, type-keyed container with at most one value per type.
#[derive(Default)]
pub struct FeatureSet {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl FeatureSet {
    /// Create an empty feature set
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register the unique value for type `T`.
    ///
    /// Replacement is explicit: the displaced value, if any, is returned to
    /// the caller rather than silently dropped.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Look up the value registered for type `T`
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Look up the value registered for type `T`, mutably
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut())
    }

    /// Remove and return the value registered for type `T`
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|prev| prev.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Check whether a value is registered for type `T`
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registered value
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values are opaque; only the count is meaningful here.
        f.debug_struct("FeatureSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct RetryBudget(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct TraceId(String);

    #[test]
    fn test_insert_and_get() {
        let mut features = FeatureSet::new();
        assert!(features.insert(RetryBudget(3)).is_none());

        assert_eq!(features.get::<RetryBudget>(), Some(&RetryBudget(3)));
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn test_absent_type_returns_none() {
        let features = FeatureSet::new();
        assert!(features.get::<RetryBudget>().is_none());
        assert!(!features.contains::<RetryBudget>());
    }

    #[test]
    fn test_replacement_returns_displaced_value() {
        let mut features = FeatureSet::new();
        features.insert(RetryBudget(3));

        let displaced = features.insert(RetryBudget(5));
        assert_eq!(displaced, Some(RetryBudget(3)));
        assert_eq!(features.get::<RetryBudget>(), Some(&RetryBudget(5)));
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn test_distinct_types_coexist() {
        let mut features = FeatureSet::new();
        features.insert(RetryBudget(3));
        features.insert(TraceId("abc".to_string()));

        assert_eq!(features.get::<RetryBudget>(), Some(&RetryBudget(3)));
        assert_eq!(features.get::<TraceId>(), Some(&TraceId("abc".to_string())));
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut features = FeatureSet::new();
        features.insert(RetryBudget(3));

        if let Some(budget) = features.get_mut::<RetryBudget>() {
            budget.0 = 10;
        }
        assert_eq!(features.get::<RetryBudget>(), Some(&RetryBudget(10)));

        assert_eq!(features.remove::<RetryBudget>(), Some(RetryBudget(10)));
        assert!(features.is_empty());
        assert!(features.remove::<RetryBudget>().is_none());
    }

    #[test]
    fn test_trait_object_values() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> &'static str;
        }
        struct English;
        impl Greeter for English {
            fn greet(&self) -> &'static str {
                "hello"
            }
        }

        let mut features = FeatureSet::new();
        features.insert::<Arc<dyn Greeter>>(Arc::new(English));

        let greeter = features.get::<Arc<dyn Greeter>>().cloned();
        assert_eq!(greeter.map(|g| g.greet()), Some("hello"));
    }

    #[test]
    fn test_clear() {
        let mut features = FeatureSet::new();
        features.insert(RetryBudget(1));
        features.insert(TraceId("t".to_string()));

        features.clear();
        assert!(features.is_empty());
        assert!(features.get::<TraceId>().is_none());
    }
}
