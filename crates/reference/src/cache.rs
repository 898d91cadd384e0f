//! Process-wide reference data cache.
//!
//! Readers grab an `Arc` to the current snapshot and never see a partially
//! populated list. Writers build a complete new snapshot and swap it in.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::source::{ReferenceDataSource, ReferenceError};
use crate::ReferenceItem;

type Scope = (String, String);

#[derive(Debug, Default)]
struct Snapshot {
    /// `(type, module)` -> items ordered by `sort_order`.
    scoped: HashMap<Scope, Vec<ReferenceItem>>,
}

impl Snapshot {
    fn build(items: Vec<ReferenceItem>) -> Self {
        let mut scoped: HashMap<Scope, Vec<ReferenceItem>> = HashMap::new();
        for item in items.into_iter().filter(|i| i.is_active) {
            scoped
                .entry((item.item_type.clone(), item.module.clone()))
                .or_default()
                .push(item);
        }
        for list in scoped.values_mut() {
            list.sort_by_key(|i| (i.sort_order, i.id));
        }
        Self { scoped }
    }

    fn items(&self, item_type: &str, module: &str) -> &[ReferenceItem] {
        self.scoped
            .get(&(item_type.to_string(), module.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct ReferenceDataCache {
    current: RwLock<Arc<Snapshot>>,
}

impl ReferenceDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-filled with `items`.
    pub fn with_items(items: Vec<ReferenceItem>) -> Self {
        let cache = Self::new();
        cache.replace(items);
        cache
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        // A poisoned lock still holds a complete snapshot.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap(&self, next: Snapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(next);
    }

    /// Load `types` x `modules` from `source`, replacing the current contents.
    ///
    /// On failure the previous snapshot stays in place and the error is
    /// returned for the caller to log or ignore.
    pub fn preload(
        &self,
        source: &dyn ReferenceDataSource,
        types: &[String],
        modules: &[String],
    ) -> Result<usize, ReferenceError> {
        match source.fetch(types, modules) {
            Ok(items) => {
                let count = items.len();
                self.replace(items);
                tracing::info!(items = count, ?types, ?modules, "reference data preloaded");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(error = %err, "reference data preload failed; keeping previous data");
                Err(err)
            }
        }
    }

    /// Swap in a new complete item list. Inactive items are dropped.
    pub fn replace(&self, items: Vec<ReferenceItem>) {
        self.swap(Snapshot::build(items));
    }

    /// Drop everything; lookups fall back to the static tiers until the next
    /// preload.
    pub fn invalidate(&self) {
        self.swap(Snapshot::default());
        tracing::debug!("reference data cache invalidated");
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().scoped.is_empty()
    }

    /// True when nothing is loaded for `(item_type, module)`.
    pub fn is_scope_empty(&self, item_type: &str, module: &str) -> bool {
        self.snapshot().items(item_type, module).is_empty()
    }

    /// Ordered items for the scope; empty if never loaded.
    pub fn get_items(&self, item_type: &str, module: &str) -> Vec<ReferenceItem> {
        self.snapshot().items(item_type, module).to_vec()
    }

    pub fn get_item_by_code(&self, item_type: &str, code: &str, module: &str) -> Option<ReferenceItem> {
        self.snapshot()
            .items(item_type, module)
            .iter()
            .find(|i| i.code == code)
            .cloned()
    }

    pub fn get_item_by_id(&self, item_type: &str, id: i64, module: &str) -> Option<ReferenceItem> {
        self.snapshot()
            .items(item_type, module)
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    /// Display name for `code`, or the code itself when unknown.
    pub fn display_name(&self, item_type: &str, code: &str, module: &str) -> String {
        self.get_item_by_code(item_type, code, module)
            .map(|i| i.display_name)
            .unwrap_or_else(|| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::default_items;
    use crate::source::StaticSource;

    struct Failing;

    impl ReferenceDataSource for Failing {
        fn fetch(&self, _: &[String], _: &[String]) -> Result<Vec<ReferenceItem>, ReferenceError> {
            Err(ReferenceError::Unavailable("down".to_string()))
        }
    }

    fn scope() -> (Vec<String>, Vec<String>) {
        (
            vec!["role".to_string(), "status".to_string()],
            vec!["users".to_string()],
        )
    }

    #[test]
    fn empty_cache_degrades_to_empty_results() {
        let cache = ReferenceDataCache::new();
        assert!(cache.get_items("role", "users").is_empty());
        assert!(cache.get_item_by_code("role", "admin", "users").is_none());
        assert_eq!(cache.display_name("role", "admin", "users"), "admin");
    }

    #[test]
    fn preload_orders_by_sort_order_and_scopes_by_module() {
        let mut items = default_items();
        items.reverse();
        let cache = ReferenceDataCache::new();
        let (types, modules) = scope();
        let loaded = cache.preload(&StaticSource::new(items), &types, &modules).unwrap();
        assert_eq!(loaded, 7);

        let codes: Vec<String> = cache.get_items("role", "users").into_iter().map(|i| i.code).collect();
        assert_eq!(codes, vec!["admin", "user", "operator", "viewer"]);
        assert!(cache.get_items("role", "billing").is_empty());
        assert_eq!(cache.display_name("status", "suspended", "users"), "Suspended");
        assert_eq!(cache.get_item_by_id("role", 3, "users").unwrap().code, "operator");
    }

    #[test]
    fn failed_preload_keeps_previous_snapshot() {
        let cache = ReferenceDataCache::with_items(default_items());
        let (types, modules) = scope();
        assert!(cache.preload(&Failing, &types, &modules).is_err());
        assert_eq!(cache.get_items("role", "users").len(), 4);
    }

    #[test]
    fn inactive_items_are_not_served() {
        let mut items = default_items();
        items[0].is_active = false;
        let cache = ReferenceDataCache::with_items(items);
        assert!(cache.get_item_by_code("role", "admin", "users").is_none());
    }

    #[test]
    fn invalidate_clears_everything() {
        let cache = ReferenceDataCache::with_items(default_items());
        assert!(!cache.is_empty());
        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.is_scope_empty("role", "users"));
    }

    #[test]
    fn readers_keep_their_snapshot_across_replace() {
        let cache = ReferenceDataCache::with_items(default_items());
        let before = cache.snapshot();
        cache.replace(Vec::new());
        assert_eq!(before.items("role", "users").len(), 4);
        assert!(cache.get_items("role", "users").is_empty());
    }
}
