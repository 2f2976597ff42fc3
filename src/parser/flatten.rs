use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::model::{CanonicalTree, NavNode, NodeKind, WorkItem};

/// Ancestry handed down while walking one header group.
struct Lineage<'a> {
    header: &'a str,
    menu_path: Vec<String>,
    level: usize,
}

/// Pre-order walk of every header group into an ordered work list.
pub fn flatten(tree: &CanonicalTree) -> Vec<WorkItem> {
    let mut out = Vec::new();
    for group in tree {
        let lineage = Lineage {
            header: &group.header_text,
            menu_path: Vec::new(),
            level: 0,
        };
        for node in &group.children {
            walk(node, &lineage, &mut out);
        }
    }
    info!("Flattened structure contains {} entries", out.len());
    out
}

fn walk(node: &NavNode, lineage: &Lineage, out: &mut Vec<WorkItem>) {
    if let Err(e) = validate(node) {
        warn!("{}", e);
        return;
    }

    let parent = lineage.menu_path.last().cloned();
    out.push(WorkItem {
        id: node.id.clone(),
        text: node.text.clone(),
        kind: node.kind,
        header: lineage.header.to_string(),
        menu: parent.clone(),
        parent_menu_text: parent,
        level: lineage.level,
        menu_path: lineage.menu_path.clone(),
    });

    if node.kind == NodeKind::Menu && node.expandable && !node.children.is_empty() {
        let mut menu_path = lineage.menu_path.clone();
        menu_path.push(node.text.clone());
        let child_lineage = Lineage {
            header: lineage.header,
            menu_path,
            level: lineage.level + 1,
        };
        for child in &node.children {
            walk(child, &child_lineage, out);
        }
    }
}

/// Items need id and text; menus need text. A rejected menu takes its
/// subtree with it.
pub fn validate(node: &NavNode) -> Result<()> {
    if node.text.trim().is_empty() {
        return Err(ScrapeError::Validation(format!(
            "{:?} without text (id {}), dropped",
            node.kind,
            node.id.as_deref().unwrap_or("-")
        )));
    }
    if node.kind == NodeKind::Item && node.id.as_deref().map_or(true, str::is_empty) {
        return Err(ScrapeError::Validation(format!(
            "item {:?} has no id, dropped",
            node.text
        )));
    }
    if node.kind == NodeKind::Menu && node.id.is_none() {
        debug!(menu = %node.text, "Menu without id");
    }
    Ok(())
}

/// Processable entries only, sequence order kept.
pub fn valid_items(items: &[WorkItem]) -> Vec<WorkItem> {
    items.iter().filter(|i| i.is_processable()).cloned().collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutSetting, Selectors};
    use crate::model::HeaderGroup;
    use crate::parser::StructureParser;

    fn item(id: &str, text: &str) -> NavNode {
        NavNode::item(Some(id.to_string()), text)
    }

    fn parse(name: &str) -> CanonicalTree {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        StructureParser::new(&Selectors::default(), LayoutSetting::Auto)
            .unwrap()
            .parse(&html)
    }

    #[test]
    fn empty_tree() {
        assert!(flatten(&Vec::new()).is_empty());
    }

    #[test]
    fn header_menu_child() {
        let mut group = HeaderGroup::new("H");
        group.children.push(NavNode::menu(None, "M", vec![item("c1", "Child")]));
        let items = valid_items(&flatten(&vec![group]));
        assert_eq!(items.len(), 1);
        let only = &items[0];
        assert_eq!(only.text, "Child");
        assert_eq!(only.header, "H");
        assert_eq!(only.menu.as_deref(), Some("M"));
        assert_eq!(only.parent_menu_text.as_deref(), Some("M"));
        assert_eq!(only.level, 1);
    }

    #[test]
    fn overview_child_not_processable() {
        let html = r##"<div class="filter-api-sidebar-wrapper"><ul>
          <app-api-doc-item><li class="toc-item-divider"><a href="#">Storage</a></li></app-api-doc-item>
          <app-api-doc-item>
            <li class="toc-item-highlight" id="m-1">
              <i class="dds__icon dds__icon--chevron-down"></i>
              <div class="align-middle">Volumes</div>
            </li>
          </app-api-doc-item>
          <ul>
            <app-api-doc-item><li class="toc-item-highlight" id="n-1"><span>Overview</span></li></app-api-doc-item>
            <app-api-doc-item><li class="toc-item-highlight" id="n-2"><span>Create volume</span></li></app-api-doc-item>
          </ul>
        </ul></div>"##;
        let tree = StructureParser::new(&Selectors::default(), LayoutSetting::Auto)
            .unwrap()
            .parse(html);
        let items = valid_items(&flatten(&tree));
        assert_eq!(items.len(), 1);
        let only = &items[0];
        assert_eq!(only.id.as_deref(), Some("n-2"));
        assert_eq!(only.header, "Storage");
        assert_eq!(only.menu.as_deref(), Some("Volumes"));
        assert_eq!(only.level, 1);
    }

    #[test]
    fn idless_item_dropped_menu_kept() {
        let mut group = HeaderGroup::new("H");
        group.children.push(NavNode::item(None, "No id"));
        group.children.push(NavNode::menu(None, "Menu", vec![item("a", "A")]));
        let items = flatten(&vec![group]);
        let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Menu", "A"]);
    }

    #[test]
    fn textless_menu_drops_subtree() {
        let mut group = HeaderGroup::new("H");
        group.children.push(NavNode::menu(Some("m".into()), "  ", vec![item("a", "A")]));
        group.children.push(item("b", "B"));
        let items = flatten(&vec![group]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "B");
    }

    #[test]
    fn non_expandable_menu_not_entered() {
        let mut menu = NavNode::menu(None, "Menu", vec![item("a", "A")]);
        menu.expandable = false;
        let mut group = HeaderGroup::new("H");
        group.children.push(menu);
        assert_eq!(flatten(&vec![group]).len(), 1);
    }

    #[test]
    fn lineage_holds_on_fixtures() {
        for name in ["hierarchical", "flat", "nested"] {
            let tree = parse(name);
            let items = flatten(&tree);
            for (i, wi) in items.iter().enumerate() {
                if wi.level == 0 {
                    assert!(wi.menu.is_none());
                    continue;
                }
                assert_eq!(wi.menu, wi.parent_menu_text);
                assert_eq!(wi.menu_path.len(), wi.level);
                assert_eq!(wi.menu.as_ref(), wi.menu_path.last());
                let parent = items[..i]
                    .iter()
                    .rev()
                    .find(|p| p.level + 1 == wi.level)
                    .unwrap();
                assert_eq!(parent.kind, NodeKind::Menu);
                assert_eq!(Some(&parent.text), wi.menu.as_ref());
                assert_eq!(parent.header, wi.header);
            }
        }
    }

    #[test]
    fn flatten_is_deterministic() {
        let tree = parse("nested");
        assert_eq!(flatten(&tree), flatten(&tree));
    }

    #[test]
    fn nested_fixture_order_and_paths() {
        let items = flatten(&parse("nested"));
        let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Sessions",
                "Remote systems",
                "Links",
                "Create link",
                "Query remote system",
                "Pause session",
                "Failover",
            ]
        );
        let create = &items[3];
        assert_eq!(create.level, 3);
        assert_eq!(create.menu_path, vec!["Sessions", "Remote systems", "Links"]);
        assert_eq!(create.reveal_chain(), create.menu_path);

        let valid: Vec<_> = valid_items(&items).into_iter().map(|i| i.id.unwrap()).collect();
        assert_eq!(valid, vec!["rep-4", "rep-6", "rep-7", "rep-8"]);
    }
}
