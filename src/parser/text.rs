use std::sync::LazyLock;

use regex::Regex;

use crate::paths;

/// Entries with this exact text are never emitted.
pub const SENTINEL: &str = "Overview";

const PLACEHOLDERS: &[&str] = &[
    "Unknown Item",
    "Unknown Menu",
    "Unnamed Item",
    "Unnamed Menu",
    "Unnamed Sub-Item",
];

const ENDPOINT_MARKERS: &[&str] = &[
    "(get)", "(post)", "(put)", "(delete)", "(patch)", "query", "add", "create", "update",
    "delete", "modify", "get ", "set ", "list ", "remove ", "retrieve",
];

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^}]*\}\}|<!--.*?-->|\$\{[^}]*\}").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Drop template artifacts, collapse whitespace, trim.
pub fn clean_text(raw: &str) -> String {
    let stripped = TEMPLATE_RE.replace_all(raw, " ");
    WS_RE.replace_all(&stripped, " ").trim().to_string()
}

/// True for the sentinel, placeholders and empty text.
pub fn should_skip(text: &str) -> bool {
    text.is_empty() || text == SENTINEL || PLACEHOLDERS.contains(&text)
}

pub fn looks_like_api_endpoint(text: &str) -> bool {
    let lower = text.to_lowercase();
    ENDPOINT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Stable id for an endpoint-like entry the markup left without one.
pub fn synthetic_id(text: &str) -> String {
    format!("synthetic-{}", paths::slug(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_templates_and_whitespace() {
        assert_eq!(clean_text("  List   {{ item.name }}\n volumes <!----> "), "List volumes");
        assert_eq!(clean_text("\n\t Overview \n"), "Overview");
    }

    #[test]
    fn skip_rules() {
        assert!(should_skip("Overview"));
        assert!(should_skip(""));
        assert!(should_skip("Unnamed Sub-Item"));
        assert!(!should_skip("Overview of volumes"));
        assert!(!should_skip("overview"));
    }

    #[test]
    fn endpoint_heuristic() {
        assert!(looks_like_api_endpoint("Create Volume"));
        assert!(looks_like_api_endpoint("Volumes (GET)"));
        assert!(looks_like_api_endpoint("List hosts"));
        assert!(looks_like_api_endpoint("Retrieve a token"));
        assert!(!looks_like_api_endpoint("Introduction"));
        assert!(!looks_like_api_endpoint("Storage"));
    }

    #[test]
    fn synthetic_ids_are_slugged() {
        assert_eq!(synthetic_id("Create Volume (POST)"), "synthetic-create-volume-post");
    }
}
