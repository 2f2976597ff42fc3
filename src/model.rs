use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Item,
    Menu,
}

/// One entry of the canonical navigation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavNode {
    pub id: Option<String>,
    pub text: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub expandable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavNode>,
}

impl NavNode {
    pub fn item(id: Option<String>, text: impl Into<String>) -> Self {
        NavNode {
            id,
            text: text.into(),
            kind: NodeKind::Item,
            expandable: false,
            children: Vec::new(),
        }
    }

    pub fn menu(id: Option<String>, text: impl Into<String>, children: Vec<NavNode>) -> Self {
        NavNode {
            id,
            text: text.into(),
            kind: NodeKind::Menu,
            expandable: true,
            children,
        }
    }
}

/// A named top-level section of the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderGroup {
    pub header_text: String,
    #[serde(default)]
    pub children: Vec<NavNode>,
}

impl HeaderGroup {
    pub fn new(header_text: impl Into<String>) -> Self {
        HeaderGroup {
            header_text: header_text.into(),
            children: Vec::new(),
        }
    }
}

pub type CanonicalTree = Vec<HeaderGroup>;

/// Flattened sidebar entry. Position in the list is its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Option<String>,
    pub text: String,
    pub kind: NodeKind,
    pub header: String,
    pub menu: Option<String>,
    pub parent_menu_text: Option<String>,
    pub level: usize,
    #[serde(default)]
    pub menu_path: Vec<String>,
}

impl WorkItem {
    pub fn is_processable(&self) -> bool {
        self.kind == NodeKind::Item && self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn id_or_placeholder(&self) -> &str {
        self.id.as_deref().unwrap_or("<no id>")
    }

    /// Menu texts to expand before this item becomes clickable, outermost first.
    pub fn reveal_chain(&self) -> Vec<String> {
        if !self.menu_path.is_empty() {
            return self.menu_path.clone();
        }
        self.parent_menu_text.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Processed,
    Skipped,
    Failed,
    NoContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub item_id: String,
    pub status: OutcomeStatus,
    pub output_path: Option<PathBuf>,
    pub checksum: Option<String>,
}

impl ExtractionOutcome {
    pub fn new(item: &WorkItem, status: OutcomeStatus) -> Self {
        ExtractionOutcome {
            item_id: item.id_or_placeholder().to_string(),
            status,
            output_path: None,
            checksum: None,
        }
    }

    pub fn at(mut self, path: PathBuf) -> Self {
        self.output_path = Some(path);
        self
    }

    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_content: usize,
}

impl RunStats {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed + self.no_content
    }

    pub fn record(mut self, status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Processed => self.processed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::NoContent => self.no_content += 1,
        }
        self
    }

    pub fn print(&self) {
        println!(
            "Done: {} items ({} processed, {} skipped, {} failed, {} no content).",
            self.total(),
            self.processed,
            self.skipped,
            self.failed,
            self.no_content,
        );
    }
}

impl FromIterator<OutcomeStatus> for RunStats {
    fn from_iter<I: IntoIterator<Item = OutcomeStatus>>(iter: I) -> Self {
        iter.into_iter().fold(RunStats::default(), RunStats::record)
    }
}
