use scraper::ElementRef;
use tracing::{debug, warn};

use super::SidebarSelectors;
use crate::model::{CanonicalTree, HeaderGroup};

/// Headers open a group; every following entry belongs to the latest group.
pub fn parse(sel: &SidebarSelectors, root: ElementRef) -> CanonicalTree {
    let mut groups: CanonicalTree = Vec::new();

    for entry in sel.entries(root) {
        if let Some(header) = sel.header_text(entry) {
            debug!("Found header group: {}", header);
            groups.push(HeaderGroup::new(header));
            continue;
        }

        let Some(node) = sel.parse_entry(entry, 0) else {
            continue;
        };
        match groups.last_mut() {
            Some(group) => group.children.push(node),
            None => warn!(text = %node.text, "Sidebar entry before the first header, skipping"),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutSetting, Selectors};
    use crate::model::NodeKind;
    use crate::parser::StructureParser;

    fn parse_fixture() -> CanonicalTree {
        let html = std::fs::read_to_string("tests/fixtures/hierarchical.html").unwrap();
        StructureParser::new(&Selectors::default(), LayoutSetting::Hierarchical)
            .unwrap()
            .parse(&html)
    }

    #[test]
    fn groups_follow_headers() {
        let tree = parse_fixture();
        let headers: Vec<_> = tree.iter().map(|g| g.header_text.as_str()).collect();
        assert_eq!(headers, vec!["Storage", "Hosts"]);
    }

    #[test]
    fn entry_before_header_dropped() {
        let tree = parse_fixture();
        assert!(tree.iter().all(|g| g.children.iter().all(|n| n.text != "Orphan entry")));
    }

    #[test]
    fn menus_carry_sibling_list_children() {
        let tree = parse_fixture();
        let storage = &tree[0];
        let volumes = storage.children.iter().find(|n| n.text == "Volumes").unwrap();
        assert_eq!(volumes.kind, NodeKind::Menu);
        assert!(volumes.expandable);
        let texts: Vec<_> = volumes.children.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Create volume", "Delete volume", "Snapshots"]);

        let snapshots = &volumes.children[2];
        assert_eq!(snapshots.kind, NodeKind::Menu);
        assert_eq!(snapshots.children.len(), 1);
        assert_eq!(snapshots.children[0].text, "List snapshots");
    }

    #[test]
    fn overview_skipped_at_every_level() {
        let tree = parse_fixture();
        let storage = &tree[0];
        assert_eq!(storage.children[0].text, "Volumes");
        let volumes = &storage.children[0];
        assert!(volumes.children.iter().all(|n| n.text != "Overview"));
    }
}
