use std::collections::{HashMap, hash_map::Entry};

use crate::foundation::error::FrameResult;

/// Resources cached per distinct plane geometry, keyed by `(stride, height)`.
///
/// Each inserted value gets a stable id so callers can tell whether two lookups returned the
/// same allocation.
#[derive(Debug)]
pub struct GeometryCache<T> {
    entries: HashMap<(u32, u32), CacheEntry<T>>,
    next_id: u64,
}

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub id: u64,
    pub value: T,
}

impl<T> Default for GeometryCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> GeometryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: (u32, u32)) -> Option<&CacheEntry<T>> {
        self.entries.get(&key)
    }

    /// Return the entry for `key`, building it with `make` on first use.
    pub fn get_or_try_insert_with<F>(&mut self, key: (u32, u32), make: F) -> FrameResult<&CacheEntry<T>>
    where
        F: FnOnce() -> FrameResult<T>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(slot) => {
                let value = make()?;
                let id = self.next_id;
                self.next_id += 1;
                tracing::debug!(stride = key.0, height = key.1, id, "allocated geometry entry");
                Ok(slot.insert(CacheEntry { id, value }))
            }
        }
    }

    /// Number of entries ever allocated; stays flat while geometry repeats.
    pub fn allocations(&self) -> usize {
        (self.next_id - 1) as usize
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::FrameError;

    #[test]
    fn repeated_geometry_reuses_entry() {
        let mut cache = GeometryCache::new();
        let a = cache.get_or_try_insert_with((64, 8), || Ok("luma")).unwrap().id;
        let b = cache.get_or_try_insert_with((32, 4), || Ok("chroma")).unwrap().id;
        let again = cache
            .get_or_try_insert_with((64, 8), || panic!("must not rebuild"))
            .unwrap()
            .id;
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(cache.allocations(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_build_allocates_nothing() {
        let mut cache: GeometryCache<u8> = GeometryCache::new();
        let err = cache
            .get_or_try_insert_with((1, 1), || Err(FrameError::device_init("nope")))
            .unwrap_err();
        assert!(matches!(err, FrameError::DeviceInit(_)));
        assert!(cache.is_empty());
        assert_eq!(cache.allocations(), 0);
    }
}
