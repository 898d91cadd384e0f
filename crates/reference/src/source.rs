//! Where reference data comes from.

use std::path::PathBuf;

use thiserror::Error;

use crate::ReferenceItem;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed reference data: {0}")]
    Malformed(String),
}

/// Pluggable provider consulted by [`crate::ReferenceDataCache::preload`].
pub trait ReferenceDataSource: Send + Sync {
    /// Items whose type is in `types` and module in `modules`.
    fn fetch(&self, types: &[String], modules: &[String]) -> Result<Vec<ReferenceItem>, ReferenceError>;
}

fn in_scope(item: &ReferenceItem, types: &[String], modules: &[String]) -> bool {
    types.iter().any(|t| *t == item.item_type) && modules.iter().any(|m| *m == item.module)
}

/// Fixed in-process list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<ReferenceItem>,
}

impl StaticSource {
    pub fn new(items: Vec<ReferenceItem>) -> Self {
        Self { items }
    }
}

impl ReferenceDataSource for StaticSource {
    fn fetch(&self, types: &[String], modules: &[String]) -> Result<Vec<ReferenceItem>, ReferenceError> {
        Ok(self
            .items
            .iter()
            .filter(|i| in_scope(i, types, modules))
            .cloned()
            .collect())
    }
}

/// JSON array of items on disk, re-read on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReferenceDataSource for JsonFileSource {
    fn fetch(&self, types: &[String], modules: &[String]) -> Result<Vec<ReferenceItem>, ReferenceError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| ReferenceError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let items: Vec<ReferenceItem> =
            serde_json::from_str(&raw).map_err(|e| ReferenceError::Malformed(e.to_string()))?;
        Ok(items.into_iter().filter(|i| in_scope(i, types, modules)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::default_items;

    #[test]
    fn static_source_filters_by_scope() {
        let source = StaticSource::new(default_items());
        let roles = source
            .fetch(&["role".to_string()], &["users".to_string()])
            .unwrap();
        assert_eq!(roles.len(), 4);
        assert!(source
            .fetch(&["role".to_string()], &["billing".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let source = JsonFileSource::new("/nonexistent/reference.json");
        let err = source.fetch(&["role".to_string()], &["users".to_string()]).unwrap_err();
        assert!(matches!(err, ReferenceError::Unavailable(_)));
    }
}
