//! Watch cache: a locally indexed, eventually consistent copy of the watched
//! objects, and the informer that keeps it current and feeds the queue.

pub mod informer;

pub use informer::{Informer, ObjectList, WatchEvent, WatchSource};

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::error::Result;
use crate::model::{Key, Resource};

/// Read side of the watch cache, as seen by the reconciler.
pub trait ObjectStore<T>: Send + Sync {
    /// Latest known state of the object, or `None` if it is gone.
    fn get_by_key(&self, key: &Key) -> Result<Option<T>>;

    /// True once the initial list has been loaded.
    fn has_synced(&self) -> bool;
}

/// In-memory store indexed by [`Key`].
pub struct Store<T> {
    items: RwLock<HashMap<Key, T>>,
    synced: AtomicBool,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            synced: AtomicBool::new(false),
        }
    }
}

impl<T: Resource> Store<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a complete listing and mark the store synced.
    pub fn replace(&self, objects: impl IntoIterator<Item = T>) {
        let mut fresh = HashMap::new();
        for obj in objects {
            match obj.key() {
                Ok(key) => {
                    fresh.insert(key, obj);
                }
                Err(e) => warn!(error = %e, "skipping unkeyable object in listing"),
            }
        }
        *self
            .items
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = fresh;
        self.synced.store(true, Ordering::Release);
    }

    /// Apply one watch event. Returns the key it touched.
    pub fn apply(&self, event: &WatchEvent<T>) -> Result<Key> {
        let obj = event.object();
        let key = obj.key()?;
        let mut items = self
            .items
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match event {
            WatchEvent::Added(_) | WatchEvent::Modified(_) => {
                items.insert(key.clone(), obj.clone());
            }
            WatchEvent::Deleted(_) => {
                items.remove(&key);
            }
        }
        Ok(key)
    }

    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .items
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Resource> ObjectStore<T> for Store<T> {
    fn get_by_key(&self, key: &Key) -> Result<Option<T>> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
