pub mod flat;
pub mod flatten;
pub mod hierarchical;
pub mod text;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, warn};

use crate::config::{LayoutSetting, Selectors};
use crate::error::{Result, ScrapeError};
use crate::model::{CanonicalTree, NavNode};

/// Nesting deeper than this is cut off.
pub const MAX_DEPTH: usize = 32;
const MAX_FALLBACK_TEXT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureType {
    /// Header entries precede the entries they own.
    Hierarchical,
    /// Entries come first, their header after them.
    FlatTrailingHeader,
}

/// Compiled sidebar selectors shared by both layouts.
pub struct SidebarSelectors {
    root: Selector,
    entry_tag: String,
    header: Selector,
    header_text: Selector,
    clickable: Selector,
    expander: Selector,
    item_text: Vec<Selector>,
    menu_text: Vec<Selector>,
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::Config(format!("invalid selector {:?}: {:?}", css, e)))
}

fn compile_all(list: &[String]) -> Result<Vec<Selector>> {
    list.iter().map(|s| compile(s)).collect()
}

impl SidebarSelectors {
    pub fn new(s: &Selectors) -> Result<Self> {
        Ok(SidebarSelectors {
            root: compile(&s.sidebar_root())?,
            entry_tag: s.entry_tag.clone(),
            header: compile(&s.header_marker)?,
            header_text: compile(&s.header_text)?,
            clickable: compile(&s.clickable_entry)?,
            expander: compile(&s.expander_icon)?,
            item_text: compile_all(&s.item_text)?,
            menu_text: compile_all(&s.menu_text)?,
        })
    }

    /// Direct entry-wrapper children of a list, in document order.
    pub fn entries<'a>(&'a self, list: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        list.children()
            .filter_map(ElementRef::wrap)
            .filter(move |el| el.value().name() == self.entry_tag)
    }

    /// Header text when this entry is a header marker.
    pub fn header_text(&self, entry: ElementRef) -> Option<String> {
        let li = entry.select(&self.header).next()?;
        let text = li
            .select(&self.header_text)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| element_text(li));
        Some(if text.is_empty() { "Unknown Header".to_string() } else { text })
    }

    /// Build the node for one entry wrapper. `None` for non-clickable and
    /// skipped entries.
    pub fn parse_entry(&self, entry: ElementRef, depth: usize) -> Option<NavNode> {
        let li = entry.select(&self.clickable).next()?;
        let raw_id = entry_id(li);

        if li.select(&self.expander).next().is_some() {
            let menu_text = self.first_text(li, &self.menu_text);
            if text::should_skip(&menu_text) {
                debug!(text = %menu_text, "Skipping menu");
                return None;
            }
            let children = if depth >= MAX_DEPTH {
                warn!(menu = %menu_text, depth, "Sidebar nesting too deep, children dropped");
                Vec::new()
            } else {
                self.menu_children(entry, li, depth + 1)
            };
            debug!(menu = %menu_text, id = raw_id.unwrap_or("-"), children = children.len(), "Found menu");
            return Some(NavNode::menu(raw_id.map(String::from), menu_text, children));
        }

        let item_text = self.first_text(li, &self.item_text);
        if text::should_skip(&item_text) {
            debug!(text = %item_text, "Skipping item");
            return None;
        }
        Some(NavNode::item(resolve_item_id(raw_id, &item_text), item_text))
    }

    /// Children come from the list right after the entry wrapper; failing that,
    /// from clickable entries nested inside the menu's own element.
    fn menu_children(&self, entry: ElementRef, menu_li: ElementRef, depth: usize) -> Vec<NavNode> {
        if let Some(list) = next_sibling_list(entry) {
            let children: Vec<NavNode> = self
                .entries(list)
                .filter_map(|child| self.parse_entry(child, depth))
                .collect();
            if !children.is_empty() {
                return children;
            }
        }

        menu_li
            .select(&self.clickable)
            .filter_map(|nested| {
                let id = entry_id(nested)?;
                let text = self.first_text(nested, &self.item_text);
                (!text::should_skip(&text)).then(|| NavNode::item(Some(id.to_string()), text))
            })
            .collect()
    }

    fn first_text(&self, li: ElementRef, candidates: &[Selector]) -> String {
        for sel in candidates {
            if let Some(found) = li.select(sel).next() {
                let text = element_text(found);
                if !text.is_empty() {
                    return text;
                }
            }
        }
        element_text(li).chars().take(MAX_FALLBACK_TEXT).collect::<String>().trim().to_string()
    }
}

/// Blank ids count as missing.
fn entry_id<'a>(li: ElementRef<'a>) -> Option<&'a str> {
    li.value().attr("id").map(str::trim).filter(|id| !id.is_empty())
}

fn element_text(el: ElementRef) -> String {
    text::clean_text(&el.text().collect::<String>())
}

fn next_sibling_list(entry: ElementRef) -> Option<ElementRef> {
    entry
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|el| el.value().name() == "ul")
}

fn resolve_item_id(raw_id: Option<&str>, text: &str) -> Option<String> {
    match raw_id {
        Some(id) => Some(id.to_string()),
        None if text::looks_like_api_endpoint(text) => {
            let id = text::synthetic_id(text);
            debug!(text, id = %id, "Synthesized id for endpoint entry");
            Some(id)
        }
        None => None,
    }
}

/// Raw sidebar HTML to canonical tree.
pub struct StructureParser {
    selectors: SidebarSelectors,
    layout: LayoutSetting,
}

impl StructureParser {
    pub fn new(selectors: &Selectors, layout: LayoutSetting) -> Result<Self> {
        Ok(StructureParser {
            selectors: SidebarSelectors::new(selectors)?,
            layout,
        })
    }

    /// Empty or unrecognizable input yields an empty tree.
    pub fn parse(&self, raw_html: &str) -> CanonicalTree {
        if raw_html.trim().is_empty() {
            return Vec::new();
        }
        let doc = Html::parse_document(raw_html);
        let root = match self.find_sidebar_root(&doc) {
            Ok(root) => root,
            Err(e) => {
                error!("{}", e);
                return Vec::new();
            }
        };

        let structure = match self.layout {
            LayoutSetting::Hierarchical => StructureType::Hierarchical,
            LayoutSetting::Flat => StructureType::FlatTrailingHeader,
            LayoutSetting::Auto => {
                let detected = self.detect_structure_type(root);
                info!("Auto-detected sidebar layout: {:?}", detected);
                detected
            }
        };

        let tree = match structure {
            StructureType::Hierarchical => hierarchical::parse(&self.selectors, root),
            StructureType::FlatTrailingHeader => flat::parse(&self.selectors, root),
        };
        info!("Parsed {} header groups", tree.len());
        tree
    }

    pub fn find_sidebar_root<'a>(&self, doc: &'a Html) -> Result<ElementRef<'a>> {
        doc.select(&self.selectors.root)
            .next()
            .ok_or_else(|| ScrapeError::Parse("no sidebar root list found".into()))
    }

    pub fn detect_structure_type(&self, scope: ElementRef) -> StructureType {
        let headers = scope.select(&self.selectors.header).count();
        let (with_id, without_id) = scope.select(&self.selectors.clickable).fold((0, 0), |(w, wo), li| {
            if entry_id(li).is_some() {
                (w + 1, wo)
            } else {
                (w, wo + 1)
            }
        });
        debug!(headers, with_id, without_id, "Sidebar layout counts");
        if without_id > with_id && headers > 0 {
            StructureType::FlatTrailingHeader
        } else {
            StructureType::Hierarchical
        }
    }
}

// ── Tests ──
