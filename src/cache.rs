use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{CanonicalTree, OutcomeStatus, WorkItem};
use crate::writer;

pub const CACHE_VERSION: u32 = 2;

/// Parsed sidebar persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureCache {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub source_url: String,
    pub structured_data: CanonicalTree,
    pub items: Vec<WorkItem>,
}

impl StructureCache {
    pub fn new(source_url: &str, structured_data: CanonicalTree, items: Vec<WorkItem>) -> Self {
        StructureCache {
            version: CACHE_VERSION,
            generated_at: Utc::now(),
            source_url: source_url.to_string(),
            structured_data,
            items,
        }
    }

    pub fn processable_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_processable()).count()
    }

    /// `None` when forced, missing, unreadable, stale or empty.
    pub fn load(path: &Path, force: bool) -> Option<Self> {
        if force {
            info!("Re-parse forced, ignoring {}", path.display());
            return None;
        }
        if !path.exists() {
            info!("No structure cache at {}", path.display());
            return None;
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                return None;
            }
        };
        let cache: StructureCache = match serde_json::from_str(&raw) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Structure cache {} is invalid: {}", path.display(), e);
                return None;
            }
        };
        if cache.version != CACHE_VERSION {
            warn!(
                "Structure cache version {} != {}, re-parsing",
                cache.version, CACHE_VERSION
            );
            return None;
        }
        let usable = cache.processable_count();
        if usable == 0 {
            warn!("Structure cache {} has no processable items", path.display());
            return None;
        }

        info!(
            "Loaded structure cache from {} ({} items, generated {})",
            path.display(),
            usable,
            cache.generated_at.to_rfc3339()
        );
        Some(cache)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let result = writer::commit(&json, path, true);
        if result.status != OutcomeStatus::Processed {
            return Err(std::io::Error::other(format!("could not write {}", path.display())).into());
        }
        info!("Saved structure cache to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeaderGroup, NavNode, NodeKind};

    fn sample() -> StructureCache {
        let mut group = HeaderGroup::new("Storage");
        group.children.push(NavNode::item(Some("n1".into()), "Create volume"));
        let items = vec![WorkItem {
            id: Some("n1".into()),
            text: "Create volume".into(),
            kind: NodeKind::Item,
            header: "Storage".into(),
            menu: None,
            parent_menu_text: None,
            level: 0,
            menu_path: Vec::new(),
        }];
        StructureCache::new("https://developer.example.com/apis", vec![group], items)
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sidebar_structure.json");
        let cache = sample();
        cache.save(&path).unwrap();
        let loaded = StructureCache::load(&path, false).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn force_and_missing_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sidebar_structure.json");
        assert!(StructureCache::load(&path, false).is_none());
        sample().save(&path).unwrap();
        assert!(StructureCache::load(&path, true).is_none());
    }

    #[test]
    fn corrupt_or_stale_cache_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sidebar_structure.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(StructureCache::load(&path, false).is_none());

        let mut stale = sample();
        stale.version = CACHE_VERSION + 1;
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();
        assert!(StructureCache::load(&path, false).is_none());
    }

    #[test]
    fn cache_without_processable_items_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sidebar_structure.json");
        let mut cache = sample();
        cache.items[0].id = None;
        cache.save(&path).unwrap();
        assert!(StructureCache::load(&path, false).is_none());
    }

    #[test]
    fn items_without_menu_path_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sidebar_structure.json");
        let mut value = serde_json::to_value(sample()).unwrap();
        value["items"][0].as_object_mut().unwrap().remove("menu_path");
        fs::write(&path, value.to_string()).unwrap();
        let loaded = StructureCache::load(&path, false).unwrap();
        assert!(loaded.items[0].menu_path.is_empty());
    }
}
