use scraper::ElementRef;
use tracing::{debug, info};

use super::SidebarSelectors;
use crate::model::{CanonicalTree, HeaderGroup, NavNode};

pub const DEFAULT_HEADER: &str = "API Documentation";

/// Entries precede their header. Each header claims the unclaimed entries
/// before it; entries after the last header go to the last header.
pub fn parse(sel: &SidebarSelectors, root: ElementRef) -> CanonicalTree {
    let mut items: Vec<(usize, NavNode)> = Vec::new();
    let mut headers: Vec<(usize, String)> = Vec::new();

    for (position, entry) in sel.entries(root).enumerate() {
        if let Some(header) = sel.header_text(entry) {
            debug!(position, "Found trailing header: {}", header);
            headers.push((position, header));
        } else if let Some(node) = sel.parse_entry(entry, 0) {
            items.push((position, node));
        }
    }

    if headers.is_empty() {
        info!("No headers found, grouping {} entries under {:?}", items.len(), DEFAULT_HEADER);
        let mut group = HeaderGroup::new(DEFAULT_HEADER);
        group.children = items.into_iter().map(|(_, node)| node).collect();
        return vec![group];
    }

    let mut pending = items.into_iter().peekable();
    let mut groups: CanonicalTree = headers
        .into_iter()
        .map(|(header_pos, text)| {
            let mut group = HeaderGroup::new(text);
            while let Some((_, node)) = pending.next_if(|(pos, _)| *pos < header_pos) {
                group.children.push(node);
            }
            group
        })
        .collect();

    let leftovers: Vec<NavNode> = pending.map(|(_, node)| node).collect();
    if !leftovers.is_empty() {
        debug!("{} entries after the last header", leftovers.len());
        if let Some(last) = groups.last_mut() {
            last.children.extend(leftovers);
        }
    }

    info!("Assigned entries to {} headers", groups.len());
    groups
}
