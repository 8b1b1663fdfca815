use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use function_authz_sdk::AuthorizationFilter;

/// Write-once store of resolved authorization filters.
pub trait FilterCache<K>: Send + Sync {
    fn try_get(&self, key: &K) -> Option<Arc<AuthorizationFilter>>;

    /// Inserts `filter` unless `key` is already present. An existing value is
    /// never replaced; returns whether the insert happened.
    fn set(&self, key: K, filter: Arc<AuthorizationFilter>) -> bool;
}

/// In-process [`FilterCache`] that lives as long as the runtime.
#[derive(Debug)]
pub struct AuthorizationFilterCache<K>
where
    K: Eq + Hash,
{
    filters: DashMap<K, Arc<AuthorizationFilter>>,
}

impl<K> Default for AuthorizationFilterCache<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            filters: DashMap::new(),
        }
    }
}

impl<K> AuthorizationFilterCache<K>
where
    K: Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl<K> FilterCache<K> for AuthorizationFilterCache<K>
where
    K: Eq + Hash + Send + Sync,
{
    fn try_get(&self, key: &K) -> Option<Arc<AuthorizationFilter>> {
        self.filters.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn set(&self, key: K, filter: Arc<AuthorizationFilter>) -> bool {
        match self.filters.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(filter);
                true
            }
        }
    }
}
