//! Per-run category index
//!
//! Filled by the mapper, sealed, then shared read-only with every page task.

use crate::category::CategoryPath;
use crate::storage::CategoryRecord;
use crate::HarvestError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::warn;

/// Category a page resolved to, and the path it was found under
#[derive(Debug, Clone)]
pub struct ResolvedCategory {
    pub path: CategoryPath,
    pub category: CategoryRecord,
    /// True when the page's own path was unknown and the root was used instead
    pub fell_back: bool,
}

/// Per-run map from joined category path to its persisted category
///
/// Written only by the mapper. Once `seal` is called (before dispatch starts)
/// every further insert is rejected, so concurrent extraction tasks only ever
/// read.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    entries: RwLock<HashMap<String, CategoryRecord>>,
    sealed: AtomicBool,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `category` under `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Category path; its joined form is the key
    /// * `category` - The persisted category record
    ///
    /// # Returns
    ///
    /// * `Ok(Some(previous))` - Another category was registered under the same key and was replaced
    /// * `Ok(None)` - The key was new
    /// * `Err(HarvestError::IndexSealed)` - The index was already sealed
    pub fn insert(
        &self,
        path: &CategoryPath,
        category: CategoryRecord,
    ) -> Result<Option<CategoryRecord>, HarvestError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if self.sealed.load(Ordering::Acquire) {
            return Err(HarvestError::IndexSealed);
        }

        let key = path.key();
        let replaced = entries.insert(key.clone(), category);
        if replaced.is_some() {
            warn!("Category path collision, keeping the latest: {}", key);
        }
        Ok(replaced)
    }

    /// Freezes the index; called once mapping is done
    pub fn seal(&self) {
        let _entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn get(&self, path: &CategoryPath) -> Option<CategoryRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path.key())
            .cloned()
    }

    pub fn contains(&self, path: &CategoryPath) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&path.key())
    }

    /// Looks up `path`, falling back to `root` when the path is not indexed
    ///
    /// Returns `None` only when neither is present.
    pub fn resolve(&self, path: &CategoryPath, root: &CategoryPath) -> Option<ResolvedCategory> {
        if let Some(category) = self.get(path) {
            return Some(ResolvedCategory {
                path: path.clone(),
                category,
                fell_back: false,
            });
        }

        self.get(root).map(|category| ResolvedCategory {
            path: root.clone(),
            category,
            fell_back: true,
        })
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered joined path, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn indexed_root() -> (CategoryIndex, CategoryRecord) {
        let index = CategoryIndex::new();
        let root = CategoryRecord::new_root("Docs");
        index
            .insert(&CategoryPath::root("Docs"), root.clone())
            .unwrap();
        (index, root)
    }

    #[test]
    fn test_insert_and_get() {
        let (index, root) = indexed_root();
        assert_eq!(index.get(&CategoryPath::root("Docs")), Some(root));
        assert!(index.get(&CategoryPath::root("Other")).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_collision_last_write_wins() {
        let (index, root) = indexed_root();
        let path = CategoryPath::under("Docs", ["Setup"]);
        let first = CategoryRecord::new_child("Setup", root.id, String::new());
        let second = CategoryRecord::new_child("Setup", root.id, String::new());

        assert!(index.insert(&path, first.clone()).unwrap().is_none());
        let replaced = index.insert(&path, second.clone()).unwrap();

        assert_eq!(replaced, Some(first));
        assert_eq!(index.get(&path).unwrap().id, second.id);
    }

    #[test]
    fn test_sealed_index_rejects_inserts() {
        let (index, root) = indexed_root();
        index.seal();
        assert!(index.is_sealed());

        let result = index.insert(
            &CategoryPath::under("Docs", ["Late"]),
            CategoryRecord::new_child("Late", root.id, String::new()),
        );
        assert!(matches!(result, Err(HarvestError::IndexSealed)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_resolve_falls_back_to_root() {
        let (index, root) = indexed_root();
        let resolved = index
            .resolve(
                &CategoryPath::under("Docs", ["Unknown"]),
                &CategoryPath::root("Docs"),
            )
            .unwrap();

        assert!(resolved.fell_back);
        assert_eq!(resolved.category.id, root.id);
        assert_eq!(resolved.path.key(), "Docs");
    }

    #[test]
    fn test_resolve_without_root() {
        let index = CategoryIndex::new();
        let resolved = index.resolve(
            &CategoryPath::under("Docs", ["Setup"]),
            &CategoryPath::root("Docs"),
        );
        assert!(resolved.is_none());
    }

    #[test]
    fn test_concurrent_readers_after_seal() {
        let (index, root) = indexed_root();
        index.seal();
        let index = Arc::new(index);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    index
                        .resolve(&CategoryPath::root("Docs"), &CategoryPath::root("Docs"))
                        .map(|r| r.category.id)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(root.id));
        }
    }
}
