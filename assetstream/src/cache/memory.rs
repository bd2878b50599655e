//! In-memory tier using moka.
//!
//! Entries are weighted by payload size. With no size limit configured the
//! tier never evicts; a limit turns it into a size-bounded LRU.

use moka::sync::Cache;

use crate::asset::AssetHandle;

/// Memory tier of the asset cache.
pub struct MemoryStore {
    cache: Cache<String, AssetHandle>,
}

impl MemoryStore {
    /// Create a memory store. `max_size_bytes == 0` means unbounded.
    pub fn new(max_size_bytes: u64) -> Self {
        let mut builder = Cache::builder().weigher(|_id: &String, asset: &AssetHandle| -> u32 {
            // moka uses u32 weights, cap very large entries
            asset.size().min(u32::MAX as usize) as u32
        });
        if max_size_bytes > 0 {
            builder = builder.max_capacity(max_size_bytes);
        }

        Self {
            cache: builder.build(),
        }
    }

    pub fn get(&self, id: &str) -> Option<AssetHandle> {
        self.cache.get(id)
    }

    /// Insert or replace the entry for the asset's id.
    pub fn insert(&self, asset: AssetHandle) {
        self.cache.insert(asset.id().to_string(), asset);
    }

    pub fn remove(&self, id: &str) -> bool {
        self.cache.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn size_bytes(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.weighted_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use std::sync::Arc;

    fn asset(id: &str, len: usize) -> AssetHandle {
        Arc::new(Asset::new(id, "Texture", vec![0u8; len]))
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryStore::new(0);
        store.insert(asset("a1", 10));

        let found = store.get("a1").unwrap();
        assert_eq!(found.size(), 10);
        assert!(store.get("a2").is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let store = MemoryStore::new(0);
        store.insert(asset("a1", 10));
        store.insert(asset("a1", 20));

        assert_eq!(store.get("a1").unwrap().size(), 20);
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::new(0);
        store.insert(asset("a1", 10));
        assert!(store.remove("a1"));
        assert!(!store.remove("a1"));
        assert!(!store.contains("a1"));
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let store = MemoryStore::new(0);
        for i in 0..50 {
            store.insert(asset(&format!("a{}", i), 1000));
        }
        assert_eq!(store.entry_count(), 50);
        assert_eq!(store.size_bytes(), 50_000);
    }

    #[test]
    fn test_bounded_evicts() {
        let store = MemoryStore::new(2500);
        store.insert(asset("a1", 1000));
        store.insert(asset("a2", 1000));
        store.insert(asset("a3", 1000));

        assert!(
            store.size_bytes() <= 2500,
            "Expected size <= 2500, got {}",
            store.size_bytes()
        );
    }
}
