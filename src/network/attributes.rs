use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

/// Key/value bag scoped to one session.
///
/// Applications stash per-connection state here (user id after login, room,
/// ...); the heart wheel keeps the index of the slot holding the session.
#[derive(Default)]
pub struct Attributes {
    values: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Returns `None` when the key is missing or holds a different type.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.values
            .read()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.write().insert(key.into(), Box::new(value));
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.read();
        f.debug_set().entries(values.keys()).finish()
    }
}
