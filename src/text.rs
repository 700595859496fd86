//! Text shaping applied before anything is written into a foreign editor.

use crate::platforms::config::{FieldLimit, TagStyle};
use log::{info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// What gets injected into a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Html(String),
}

impl Content {
    pub fn is_html(&self) -> bool {
        matches!(self, Content::Html(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) | Content::Html(s) => s.trim().is_empty(),
        }
    }

    /// Plain-text rendition.
    pub fn plain(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Html(h) => html_to_text(h),
        }
    }

    /// Markup rendition; plain text is escaped and line breaks become `<br>`.
    pub fn html(&self) -> String {
        match self {
            Content::Text(s) => plain_to_html(s),
            Content::Html(h) => h.clone(),
        }
    }
}

/// Clips `text` to `limit.max` Unicode scalar values. Clipping is logged,
/// never an error; text shorter than `limit.min` is passed through.
pub fn clip(field: &str, text: &str, limit: Option<&FieldLimit>) -> String {
    let Some(limit) = limit else {
        return text.to_string();
    };
    let len = text.chars().count();
    if limit.min > 0 && len < limit.min {
        warn!(
            "[clip] {} has {} chars, below the platform minimum of {}",
            field, len, limit.min
        );
    }
    if len <= limit.max {
        return text.to_string();
    }
    info!("[clip] {} clipped from {} to {} chars", field, len, limit.max);
    text.chars().take(limit.max).collect()
}

/// Applies [`clip`] to injected content. Markup that would need clipping
/// degrades to its clipped plain text, since cutting HTML mid-tag corrupts it.
pub fn clip_content(field: &str, content: &Content, limit: Option<&FieldLimit>) -> Content {
    match content {
        Content::Text(s) => Content::Text(clip(field, s, limit)),
        Content::Html(h) => {
            let plain = html_to_text(h);
            match limit {
                Some(l) if plain.chars().count() > l.max => {
                    Content::Text(clip(field, &plain, limit))
                }
                _ => Content::Html(h.clone()),
            }
        }
    }
}

pub fn collapse_nbsp(text: &str) -> String {
    text.replace("&nbsp;", " ").replace('\u{a0}', " ")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Escaped lines joined with `<br>`.
pub fn plain_to_html(text: &str) -> String {
    collapse_nbsp(text)
        .lines()
        .map(escape_html)
        .collect::<Vec<_>>()
        .join("<br>")
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "section", "article", "header", "footer", "figure", "figcaption", "table", "tr", "hr",
];

/// Text content of `html`, one line per block element or `<br>`. Blank
/// lines are dropped.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut raw = String::new();
    push_text(fragment.root_element(), &mut raw);
    collapse_nbsp(&raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                match el.name() {
                    "br" => out.push('\n'),
                    "script" | "style" | "template" => {}
                    name if BLOCK_TAGS.contains(&name) => {
                        out.push('\n');
                        push_text(child, out);
                        out.push('\n');
                    }
                    _ => push_text(child, out),
                }
            }
            _ => {}
        }
    }
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
    })
}

fn handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
    })
}

fn js_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(href|src)\s*=\s*("\s*javascript:[^"]*"|'\s*javascript:[^']*')"#)
            .expect("valid regex")
    })
}

/// Strips script/style blocks, inline event handlers and `javascript:` URLs.
pub fn sanitize_html(html: &str) -> String {
    let without_scripts = script_re().replace_all(html, "");
    let without_handlers = handler_re().replace_all(&without_scripts, "");
    js_url_re()
        .replace_all(&without_handlers, "$1=\"#\"")
        .into_owned()
}

fn emphasis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\*\*(.+?)\*\*|__(.+?)__|\*(\S(?:.*?\S)?)\*|\b_(\S(?:.*?\S)?)_\b")
            .expect("valid regex")
    })
}

fn list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)[-*+]\s+").expect("valid regex"))
}

fn quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*>\s?").expect("valid regex"))
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s{0,3}#{1,6}\s+").expect("valid regex"))
}

/// Lightweight Markdown to plain text for editors without Markdown support:
/// emphasis markers dropped, list items become `• `, quotes `▎ `, heading
/// hashes removed.
pub fn markdown_to_plain(markdown: &str) -> String {
    collapse_nbsp(markdown)
        .lines()
        .map(|line| {
            let line = heading_re().replace(line, "");
            let line = if quote_re().is_match(&line) {
                format!("▎ {}", quote_re().replace(&line, ""))
            } else {
                line.into_owned()
            };
            let line = list_re().replace(&line, "$1• ");
            emphasis_re()
                .replace_all(&line, |caps: &regex::Captures| {
                    (1..=4)
                        .find_map(|i| caps.get(i))
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tag list as delivered by the content service: a native array, or a string
/// holding either a JSON array or a separated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Text(String),
}

/// Trims, strips leading `#`, drops empties and duplicates, caps at `max`.
pub fn normalize_tags(input: &TagsInput, max: Option<usize>) -> Vec<String> {
    let raw: Vec<String> = match input {
        TagsInput::List(list) => list.clone(),
        TagsInput::Text(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') {
                match serde_json::from_str::<Vec<String>>(trimmed) {
                    Ok(list) => list,
                    Err(e) => {
                        warn!("[tags] unparseable JSON tag list ({}), splitting instead", e);
                        split_tag_text(trimmed.trim_start_matches('[').trim_end_matches(']'))
                    }
                }
            } else {
                split_tag_text(trimmed)
            }
        }
    };

    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for tag in raw {
        let tag = tag.trim().trim_start_matches('#').trim_end_matches('#').trim();
        if max.is_some_and(|m| tags.len() >= m) {
            break;
        }
        if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
            continue;
        }
        tags.push(tag.to_string());
    }
    tags
}

fn split_tag_text(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == '，' || c == '#' || c == '、' || c.is_whitespace())
        .map(|s| s.trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Renders tags into the single text form used by inline styles.
pub fn format_tags(tags: &[String], style: TagStyle) -> String {
    match style {
        TagStyle::Hashtag => tags
            .iter()
            .map(|t| format!("#{}", t))
            .collect::<Vec<_>>()
            .join(" "),
        TagStyle::DoubleHashtag => tags
            .iter()
            .map(|t| format!("#{}#", t))
            .collect::<Vec<_>>()
            .join(" "),
        TagStyle::CommaSeparated => tags.join(","),
        TagStyle::EnterSeparated | TagStyle::None => tags.join("\n"),
    }
}
