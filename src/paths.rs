use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const MAX_SLUG_LEN: usize = 100;
const MAX_COMPONENT_LEN: usize = 255;

static DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9._-]").unwrap());
static HYPHEN_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Filesystem-safe slug. Idempotent: `slug(slug(x)) == slug(x)`.
pub fn slug(text: &str) -> String {
    slugify(text, false, "_")
}

/// Slug used for file stems.
pub fn slug_filename(text: &str) -> String {
    slugify(text, false, "untitled")
}

pub fn slugify(text: &str, allow_unicode: bool, fallback: &str) -> String {
    let folded: String = if allow_unicode {
        text.nfkc().collect()
    } else {
        text.nfkd().filter(char::is_ascii).collect()
    };

    let mapped: String = folded
        .to_lowercase()
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '-',
            '_' | '/' | '\\' => '-',
            c => c,
        })
        .collect();

    let cleaned = if allow_unicode {
        mapped
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect()
    } else {
        DISALLOWED_RE.replace_all(&mapped, "").into_owned()
    };
    let collapsed = HYPHEN_RUN_RE.replace_all(&cleaned, "-");

    let mut out = trim_separators(&collapsed).to_string();
    if out.chars().count() > MAX_SLUG_LEN {
        out = out.chars().take(MAX_SLUG_LEN).collect();
        out = trim_separators(&out).to_string();
    }

    if out.is_empty() {
        fallback.to_string()
    } else {
        out
    }
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, '-' | '_' | '.'))
}

/// `base / header / menu / item.md`; empty header dropped, menu dropped when
/// empty or equal to the header.
pub fn output_path(header: &str, menu: Option<&str>, item_text: &str, base_dir: &Path) -> PathBuf {
    let mut path = base_dir.to_path_buf();

    let header = header.trim();
    if !header.is_empty() {
        path.push(slug(header));
    }

    if let Some(menu) = menu.map(str::trim) {
        if !menu.is_empty() && menu != header {
            path.push(slug(menu));
        }
    }

    path.push(format!("{}.md", slug_filename(item_text)));
    path
}

/// Rejects traversal, home shortcuts, doubled or trailing separators, empty
/// and oversized components.
pub fn validate_path_safety(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    if raw.is_empty() || raw.contains("//") || raw.contains("\\\\") {
        return false;
    }
    if raw.ends_with('/') || raw.ends_with('\\') {
        return false;
    }

    path.components().all(|component| match component {
        Component::ParentDir => false,
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            !part.is_empty() && !part.starts_with('~') && part.chars().count() <= MAX_COMPONENT_LEN
        }
        Component::CurDir | Component::RootDir | Component::Prefix(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_slug() {
        assert_eq!(slug("Create Volume (POST)"), "create-volume-post");
        assert_eq!(slug("  Storage / Volumes  "), "storage-volumes");
        assert_eq!(slug("snake_case_name"), "snake-case-name");
    }

    #[test]
    fn slug_folds_accents() {
        assert_eq!(slug("Café Résumé"), "cafe-resume");
    }

    #[test]
    fn slug_fallbacks() {
        assert_eq!(slug("!!!"), "_");
        assert_eq!(slug_filename("???"), "untitled");
        assert_eq!(slug(""), "_");
    }

    #[test]
    fn slug_is_idempotent() {
        let samples = vec![
            "Create Volume (POST)".to_string(),
            "--a--b--".to_string(),
            "...dots...".to_string(),
            "Überprüfung der Schnittstelle".to_string(),
            "x-".repeat(80),
            "a - b _ c / d \\ e".to_string(),
            "!!!".to_string(),
            "v1.2.3 Release_Notes".to_string(),
        ];
        for s in &samples {
            let once = slug(s);
            assert_eq!(slug(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn slug_is_capped() {
        let long = "word ".repeat(60);
        let s = slug(&long);
        assert!(s.chars().count() <= MAX_SLUG_LEN);
        assert!(!s.ends_with('-'));
    }

    #[test]
    fn unicode_slug_keeps_letters() {
        assert_eq!(slugify("Überblick Daten", true, "_"), "überblick-daten");
    }

    #[test]
    fn path_with_header_and_menu() {
        let p = output_path("Storage", Some("Volumes"), "Create volume", Path::new("out"));
        assert_eq!(p, PathBuf::from("out/storage/volumes/create-volume.md"));
    }

    #[test]
    fn path_drops_menu_equal_to_header() {
        let p = output_path("Storage", Some("Storage"), "List", Path::new("out"));
        assert_eq!(p, PathBuf::from("out/storage/list.md"));
    }

    #[test]
    fn path_without_header_or_menu() {
        let p = output_path("", None, "Get token", Path::new("out"));
        assert_eq!(p, PathBuf::from("out/get-token.md"));
        let p = output_path("Auth", Some("  "), "Get token", Path::new("out"));
        assert_eq!(p, PathBuf::from("out/auth/get-token.md"));
    }

    #[test]
    fn safety_checks() {
        assert!(validate_path_safety(Path::new("out/storage/volumes/create.md")));
        assert!(validate_path_safety(Path::new("/tmp/out/a.md")));
        assert!(!validate_path_safety(Path::new("out/../etc/passwd")));
        assert!(!validate_path_safety(Path::new("~/out/a.md")));
        assert!(!validate_path_safety(Path::new("out//a.md")));
        assert!(!validate_path_safety(Path::new("out/a/")));
        assert!(!validate_path_safety(Path::new("")));
        let long = format!("out/{}.md", "a".repeat(300));
        assert!(!validate_path_safety(Path::new(&long)));
    }

    #[test]
    fn built_paths_are_safe() {
        let p = output_path("../../etc", Some("~root"), "passwd", Path::new("out"));
        assert!(validate_path_safety(&p), "{}", p.display());
    }
}
