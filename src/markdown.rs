use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static TRAILING_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+\n").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Most specific content wrappers first; the whole fragment otherwise.
static FOCUS_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["app-api-doc-endpoint", "markdown"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static RESPONSE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(RESPONSE_TAG).unwrap());

const RESPONSE_TAG: &str = "app-api-doc-response";

const SKIPPED: &[&str] = &["script", "style", "noscript", "svg", "button", "img", "head", "title"];
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside", "blockquote",
    "dl", "dt", "dd", "figure", "form", "fieldset",
];

#[derive(Clone, Copy, Default)]
struct Ctx<'a> {
    in_pre: bool,
    list_depth: usize,
    /// Rendered response sections standing in for the response element.
    responses: Option<&'a str>,
}

/// One status tab of an endpoint's response block, read after clicking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTab {
    pub status: String,
    pub html: String,
}

/// Convert a content-pane fragment to markdown. `None` when nothing
/// readable is left.
pub fn html_to_markdown(html: &str) -> Option<String> {
    html_to_markdown_with_responses(html, &[])
}

/// Like [`html_to_markdown`], with the response element replaced by one
/// `### Response <status>` section per tab. Sections are appended when the
/// page has no response element.
pub fn html_to_markdown_with_responses(html: &str, tabs: &[ResponseTab]) -> Option<String> {
    let doc = Html::parse_fragment(html);
    let root = FOCUS_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .unwrap_or_else(|| doc.root_element());

    let responses = render_responses(tabs);
    let in_place = responses.is_some() && root.select(&RESPONSE_SEL).next().is_some();

    let mut out = String::new();
    let ctx = Ctx {
        responses: responses.as_deref().filter(|_| in_place),
        ..Ctx::default()
    };
    render_children(root, &mut out, ctx);
    if let (Some(sections), false) = (&responses, in_place) {
        block_break(&mut out);
        out.push_str(sections);
    }

    let md = strip_images(&TRAILING_WS_RE.replace_all(&out, "\n"));
    let md = md.trim();
    if md.is_empty() {
        None
    } else {
        Some(format!("{}\n", md))
    }
}

fn render_responses(tabs: &[ResponseTab]) -> Option<String> {
    let sections: Vec<String> = tabs
        .iter()
        .filter_map(|tab| {
            let body = html_to_markdown(&tab.html)?;
            Some(format!("### Response {}\n\n{}", tab.status, body.trim()))
        })
        .collect();
    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

/// Remove markdown image syntax: ![alt](url) and [![alt](url)](link)
pub fn strip_images(md: &str) -> String {
    let cleaned = IMAGE_RE.replace_all(md, "");
    BLANKS_RE.replace_all(&cleaned, "\n\n").to_string()
}

fn render_children(el: ElementRef, out: &mut String, ctx: Ctx) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text, ctx),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_element(child_el, out, ctx);
                }
            }
            _ => {}
        }
    }
}

fn push_text(out: &mut String, text: &str, ctx: Ctx) {
    if ctx.in_pre {
        out.push_str(text);
        return;
    }
    let collapsed = WS_RE.replace_all(text, " ");
    if out.is_empty() || out.ends_with('\n') || out.ends_with(' ') {
        out.push_str(collapsed.trim_start());
    } else {
        out.push_str(&collapsed);
    }
}

fn render_element(el: ElementRef, out: &mut String, ctx: Ctx) {
    let name = el.value().name();
    if name == RESPONSE_TAG {
        if let Some(sections) = ctx.responses {
            block_break(out);
            out.push_str(sections);
            out.push_str("\n\n");
            return;
        }
    }
    match name {
        n if SKIPPED.contains(&n) => {}
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = inline(el, ctx);
            if !text.is_empty() {
                block_break(out);
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(&text);
                out.push_str("\n\n");
            }
        }
        "br" => out.push('\n'),
        "hr" => {
            block_break(out);
            out.push_str("---\n\n");
        }
        "strong" | "b" => wrap_inline(el, out, ctx, "**"),
        "em" | "i" => wrap_inline(el, out, ctx, "*"),
        "code" if !ctx.in_pre => wrap_inline(el, out, ctx, "`"),
        "pre" => {
            let code: String = el.text().collect();
            block_break(out);
            out.push_str("```\n");
            out.push_str(code.trim_matches('\n'));
            out.push_str("\n```\n\n");
        }
        "a" => render_link(el, out, ctx),
        "ul" | "ol" => render_list(el, out, ctx, name == "ol"),
        "table" => render_table(el, out),
        n if BLOCKS.contains(&n) || n.contains('-') => {
            block_break(out);
            render_children(el, out, ctx);
            block_break(out);
        }
        _ => render_children(el, out, ctx),
    }
}

fn inline(el: ElementRef, ctx: Ctx) -> String {
    let mut buf = String::new();
    render_children(el, &mut buf, ctx);
    WS_RE.replace_all(&buf, " ").trim().to_string()
}

fn wrap_inline(el: ElementRef, out: &mut String, ctx: Ctx, marker: &str) {
    let text = inline(el, ctx);
    if text.is_empty() {
        return;
    }
    if !(out.is_empty() || out.ends_with(char::is_whitespace)) {
        out.push(' ');
    }
    out.push_str(marker);
    out.push_str(&text);
    out.push_str(marker);
}

fn render_link(el: ElementRef, out: &mut String, ctx: Ctx) {
    let text = inline(el, ctx);
    let href = el.value().attr("href").unwrap_or("").trim();
    if text.is_empty() {
        return;
    }
    if !(out.is_empty() || out.ends_with(char::is_whitespace)) {
        out.push(' ');
    }
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        out.push_str(&text);
    } else {
        out.push_str(&format!("[{}]({})", text, href));
    }
}

fn render_list(el: ElementRef, out: &mut String, ctx: Ctx, ordered: bool) {
    let indent = "  ".repeat(ctx.list_depth);
    if ctx.list_depth == 0 {
        block_break(out);
    } else if !out.ends_with('\n') {
        out.push('\n');
    }

    let items = el
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "li");
    for (i, li) in items.enumerate() {
        let mut buf = String::new();
        render_children(li, &mut buf, Ctx { list_depth: ctx.list_depth + 1, ..ctx });
        let body = buf.trim();
        if body.is_empty() {
            continue;
        }
        let marker = if ordered { format!("{}. ", i + 1) } else { "- ".to_string() };
        out.push_str(&indent);
        out.push_str(&marker);
        for (n, line) in body.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            if n > 0 {
                out.push('\n');
                if !line.starts_with(' ') {
                    out.push_str(&indent);
                    out.push_str("  ");
                }
            }
            out.push_str(line);
        }
        out.push('\n');
    }

    if ctx.list_depth == 0 {
        out.push('\n');
    }
}

fn render_table(table: ElementRef, out: &mut String) {
    let rows: Vec<Vec<String>> = table
        .select(&ROW_SEL)
        .map(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(|c| inline(c, Ctx::default()).replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|r| !r.is_empty())
        .collect();
    let Some(width) = rows.iter().map(Vec::len).max() else {
        return;
    };

    block_break(out);
    for (i, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
        if i == 0 {
            out.push_str(&format!("|{}\n", " --- |".repeat(width)));
        }
    }
    out.push('\n');
}

fn block_break(out: &mut String) {
    if out.is_empty() {
        return;
    }
    let kept = out.trim_end_matches([' ', '\t']).len();
    out.truncate(kept);
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

// ── Tests ──
