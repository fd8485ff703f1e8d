use std::sync::{Arc, Mutex, RwLock};

/// Holds the current immutable version of a catalog.
///
/// Readers take a cheap `Arc` clone and keep evaluating against it even while a reload
/// swaps in a new version. Reloads are serialized by an exclusive lock so two reloads
/// never interleave.
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
    reload_lock: Mutex<()>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Snapshot {
            current: RwLock::new(Arc::new(value)),
            reload_lock: Mutex::new(()),
        }
    }

    /// Returns the version that is current right now.
    pub fn load(&self) -> Arc<T> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A panicking writer cannot leave a torn value behind: the swap is a single store.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the current version wholesale and returns the previous one.
    pub fn replace(&self, value: T) -> Arc<T> {
        let _reload = match self.reload_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = Arc::new(value);
        let mut slot = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, next)
    }
}
