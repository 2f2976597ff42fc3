use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::model::WorkItem;
use crate::paths;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    pub to_process: Vec<WorkItem>,
    pub already_existing: Vec<WorkItem>,
}

impl Selection {
    pub fn is_noop(&self) -> bool {
        self.to_process.is_empty()
    }
}

pub fn item_output_path(item: &WorkItem, base_dir: &Path) -> PathBuf {
    paths::output_path(&item.header, item.menu.as_deref(), &item.text, base_dir)
}

/// Narrow the candidates (id filter, else first `max_items`, else all), then
/// bucket them by whether their output file already exists.
pub fn select(
    valid_items: &[WorkItem],
    max_items: Option<usize>,
    explicit_id: Option<&str>,
    base_dir: &Path,
    force: bool,
) -> Selection {
    let candidates: Vec<&WorkItem> = match (explicit_id, max_items) {
        (Some(id), _) => {
            warn!("Selecting by item id is deprecated; prefer --max-items");
            let found: Vec<_> = valid_items.iter().filter(|i| i.id.as_deref() == Some(id)).collect();
            if found.is_empty() {
                warn!("No item with id {} in the structure", id);
            }
            found
        }
        (None, Some(n)) => valid_items.iter().take(n).collect(),
        (None, None) => valid_items.iter().collect(),
    };

    let mut selection = Selection::default();
    for item in candidates {
        let exists = item_output_path(item, base_dir).exists();
        if exists {
            selection.already_existing.push(item.clone());
        }
        if force || !exists {
            selection.to_process.push(item.clone());
        }
    }

    info!(
        pending = selection.to_process.len(),
        existing = selection.already_existing.len(),
        force,
        "Resume selection"
    );
    selection
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumeInfo {
    pub output_directory: PathBuf,
    pub total_items: usize,
    pub existing_items: usize,
    pub pending_items: usize,
}

impl ResumeInfo {
    /// Same bucketing as a real run, without side effects.
    pub fn from_items(valid_items: &[WorkItem], base_dir: &Path) -> Self {
        let selection = select(valid_items, None, None, base_dir, false);
        ResumeInfo {
            output_directory: base_dir.to_path_buf(),
            total_items: valid_items.len(),
            existing_items: selection.already_existing.len(),
            pending_items: selection.to_process.len(),
        }
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        self.existing_items as f64 / self.total_items as f64 * 100.0
    }

    pub fn print(&self) {
        println!("Output directory: {}", self.output_directory.display());
        println!("Total items:      {}", self.total_items);
        println!("Existing:         {}", self.existing_items);
        println!("Pending:          {}", self.pending_items);
        println!("Complete:         {:.1}%", self.completion_percentage());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn item(id: &str, text: &str) -> WorkItem {
        WorkItem {
            id: Some(id.to_string()),
            text: text.to_string(),
            kind: NodeKind::Item,
            header: "Storage".into(),
            menu: Some("Volumes".into()),
            parent_menu_text: Some("Volumes".into()),
            level: 1,
            menu_path: vec!["Volumes".into()],
        }
    }

    fn items() -> Vec<WorkItem> {
        vec![item("n1", "Create"), item("n2", "Delete"), item("n3", "List")]
    }

    fn touch(base: &Path, wi: &WorkItem) {
        let p = item_output_path(wi, base);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, "done").unwrap();
    }

    #[test]
    fn buckets_by_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let all = items();
        touch(dir.path(), &all[1]);
        let sel = select(&all, None, None, dir.path(), false);
        let pending: Vec<_> = sel.to_process.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(pending, vec!["Create", "List"]);
        assert_eq!(sel.already_existing.len(), 1);
    }

    #[test]
    fn max_items_takes_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let sel = select(&items(), Some(2), None, dir.path(), false);
        let ids: Vec<_> = sel.to_process.iter().map(|i| i.id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[test]
    fn explicit_id_beats_max_items() {
        let dir = tempfile::tempdir().unwrap();
        let sel = select(&items(), Some(1), Some("n3"), dir.path(), false);
        assert_eq!(sel.to_process.len(), 1);
        assert_eq!(sel.to_process[0].id.as_deref(), Some("n3"));

        let missing = select(&items(), None, Some("nope"), dir.path(), false);
        assert!(missing.is_noop());
        assert!(missing.already_existing.is_empty());
    }

    #[test]
    fn force_reprocesses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let all = items();
        for wi in &all {
            touch(dir.path(), wi);
        }
        assert!(select(&all, None, None, dir.path(), false).is_noop());
        let forced = select(&all, None, None, dir.path(), true);
        assert_eq!(forced.to_process.len(), 3);
        assert_eq!(forced.already_existing.len(), 3);
    }

    #[test]
    fn resume_info_percentages() {
        let dir = tempfile::tempdir().unwrap();
        let all = items();
        touch(dir.path(), &all[0]);
        let info = ResumeInfo::from_items(&all, dir.path());
        assert_eq!(info.total_items, 3);
        assert_eq!(info.existing_items, 1);
        assert_eq!(info.pending_items, 2);
        assert!((info.completion_percentage() - 33.333).abs() < 0.01);
        assert_eq!(ResumeInfo::from_items(&[], dir.path()).completion_percentage(), 0.0);
    }
}
