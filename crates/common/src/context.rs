//! Context containers threaded through tests and capabilities
//!
//! - [`FixtureContext`] is the author-facing value handed to test
//!   implementations and fixture steps.
//! - [`Extensions`] is a type-keyed map where capabilities keep their own
//!   per-topic declarations and per-run transient state.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// String-keyed bag of shared values built up by fixture steps.
///
/// Cloning is cheap: values are reference counted, so a test and the cleanup
/// steps that follow it observe the same objects.
#[derive(Clone, Default)]
pub struct FixtureContext {
    values: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl FixtureContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Insert an already shared value without re-wrapping it.
    pub fn insert_shared<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: Arc<T>) {
        self.values.insert(key.into(), value);
    }

    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref::<T>()
    }

    /// Shared handle to a value, for moving into spawned work.
    pub fn get_shared<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.values.get(key)?.clone().downcast::<T>().ok()
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for FixtureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Type-keyed storage for capability state.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one it replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok().map(|boxed| *boxed))
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    pub fn get_or_insert_default<T: Default + Send + Sync + 'static>(&mut self) -> &mut T {
        self.map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("extension slot holds the type it is keyed by")
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok().map(|boxed| *boxed))
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions").field("len", &self.map.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_context_shares_values_between_clones() {
        let context = FixtureContext::new().with("count", 3usize);
        let copy = context.clone();
        assert_eq!(copy.get::<usize>("count"), Some(&3));
        assert!(copy.get::<String>("count").is_none());
        assert!(Arc::ptr_eq(
            &context.get_shared::<usize>("count").unwrap(),
            &copy.get_shared::<usize>("count").unwrap()
        ));
    }

    #[test]
    fn test_extensions_are_keyed_by_type() {
        #[derive(Debug, Default, PartialEq)]
        struct Marker(u8);

        let mut extensions = Extensions::new();
        assert!(extensions.insert(Marker(1)).is_none());
        assert_eq!(extensions.insert(Marker(2)), Some(Marker(1)));
        extensions.get_or_insert_default::<Vec<u8>>().push(7);
        assert_eq!(extensions.get::<Vec<u8>>(), Some(&vec![7]));
        assert_eq!(extensions.remove::<Marker>(), Some(Marker(2)));
        assert!(!extensions.contains::<Marker>());
    }
}
