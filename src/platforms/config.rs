//! Declarative per-platform configuration.
//!
//! A [`PlatformConfig`] is plain data: selectors per editor role, field limits,
//! retry policy and the few switches the shared fill flow needs. Built-in
//! configurations live next to their platform module; user overrides are read
//! from the settings file with the same serde shape.

use crate::platforms::registry::glob_to_regex;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered selector candidates. The first candidate that matches wins, so a
/// configuration can degrade from an exact selector to a looser one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct Selectors(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Selectors {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => Selectors(vec![s]),
            OneOrMany::Many(v) => Selectors(v),
        }
    }
}

impl Selectors {
    pub fn new(candidates: &[&str]) -> Self {
        Selectors(candidates.iter().map(|s| s.to_string()).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Editor elements a plugin may need to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Title,
    Content,
    Description,
    Tags,
    Digest,
    Author,
    UploadInput,
    DropZone,
    /// Placeholder that must be clicked before the real editor mounts.
    ActivateEditor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Title => "title",
            Role::Content => "content",
            Role::Description => "description",
            Role::Tags => "tags",
            Role::Digest => "digest",
            Role::Author => "author",
            Role::UploadInput => "uploadInput",
            Role::DropZone => "dropZone",
            Role::ActivateEditor => "activateEditor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Markdown,
    /// Short plain-text posts.
    Text,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Title,
    Content,
    Description,
    Tags,
    Digest,
    Author,
    Images,
    Cover,
    Video,
}

/// How tags reach the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagStyle {
    /// `#tag`, appended to the body text.
    Hashtag,
    /// `#tag#`, appended to the body text (Weibo topics).
    DoubleHashtag,
    /// Typed one by one into the tag input, each committed with Enter.
    EnterSeparated,
    /// One comma-joined string in the tag input.
    CommaSeparated,
    #[default]
    None,
}

impl TagStyle {
    pub fn is_inline(&self) -> bool {
        matches!(self, TagStyle::Hashtag | TagStyle::DoubleHashtag)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLimit {
    pub min: usize,
    pub max: usize,
}

impl FieldLimit {
    pub fn max(max: usize) -> Self {
        Self { min: 0, max }
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

/// Label/text of the fill button the UI layer renders for this platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonConfig {
    pub label: String,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecialHandling {
    pub init_delay_ms: u64,
    /// How long required editor elements are polled for.
    pub max_wait_time_ms: u64,
    /// Retry a failed detection once after `retry_delay_ms`.
    pub retry_on_fail: bool,
    pub retry_delay_ms: u64,
    pub title_limit: Option<FieldLimit>,
    pub content_limit: Option<FieldLimit>,
    pub description_limit: Option<FieldLimit>,
    pub digest_limit: Option<FieldLimit>,
    pub tag_limit: Option<FieldLimit>,
    pub image_limit: Option<usize>,
    pub button_config: Option<ButtonConfig>,
    pub activate_editor: bool,
    pub support_tags: bool,
    pub tag_style: TagStyle,
    /// Search open shadow roots when locating elements.
    pub include_shadow_dom: bool,
    /// Roles that must be present for the page to count as an editor.
    pub required: Vec<Role>,
    /// Keywords for the label-based fallback, per role.
    pub label_keywords: BTreeMap<Role, Vec<String>>,
    /// Title and tags are folded into the body (single-box editors).
    pub merge_title_into_content: bool,
}

impl Default for SpecialHandling {
    fn default() -> Self {
        Self {
            init_delay_ms: 0,
            max_wait_time_ms: 10_000,
            retry_on_fail: false,
            retry_delay_ms: 2_000,
            title_limit: None,
            content_limit: None,
            description_limit: None,
            digest_limit: None,
            tag_limit: None,
            image_limit: None,
            button_config: None,
            activate_editor: false,
            support_tags: false,
            tag_style: TagStyle::None,
            include_shadow_dom: false,
            required: vec![Role::Title, Role::Content],
            label_keywords: BTreeMap::new(),
            merge_title_into_content: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub id: String,
    pub name: String,
    /// Glob patterns (`*` wildcard), matched anchored and case-insensitively.
    pub url_patterns: Vec<String>,
    /// Page opened by `mpf open`.
    #[serde(default)]
    pub editor_url: String,
    #[serde(default)]
    pub selectors: BTreeMap<Role, Selectors>,
    #[serde(default)]
    pub features: Vec<Feature>,
    pub content_type: ContentType,
    #[serde(default)]
    pub special_handling: SpecialHandling,
    /// Higher wins when several platforms match one URL.
    #[serde(default)]
    pub priority: i32,
}

impl PlatformConfig {
    pub fn selectors_for(&self, role: Role) -> Option<&Selectors> {
        self.selectors.get(&role).filter(|s| !s.is_empty())
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn keywords_for(&self, role: Role) -> &[String] {
        self.special_handling
            .label_keywords
            .get(&role)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn limit_for(&self, role: Role) -> Option<&FieldLimit> {
        let sh = &self.special_handling;
        match role {
            Role::Title => sh.title_limit.as_ref(),
            Role::Content => sh.content_limit.as_ref(),
            Role::Description => sh.description_limit.as_ref().or(sh.content_limit.as_ref()),
            Role::Digest => sh.digest_limit.as_ref(),
            _ => None,
        }
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|pattern| match glob_to_regex(pattern) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                warn!("[{}] invalid url pattern {}: {}", self.id, pattern, e);
                false
            }
        })
    }
}

/// Builder-style helpers for the built-in platform tables.
impl PlatformConfig {
    pub(crate) fn new(id: &str, name: &str, content_type: ContentType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url_patterns: Vec::new(),
            editor_url: String::new(),
            selectors: BTreeMap::new(),
            features: Vec::new(),
            content_type,
            special_handling: SpecialHandling::default(),
            priority: 0,
        }
    }

    pub(crate) fn urls(mut self, patterns: &[&str]) -> Self {
        self.url_patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub(crate) fn editor(mut self, url: &str) -> Self {
        self.editor_url = url.into();
        self
    }

    pub(crate) fn select(mut self, role: Role, candidates: &[&str]) -> Self {
        self.selectors.insert(role, Selectors::new(candidates));
        self
    }

    pub(crate) fn features(mut self, features: &[Feature]) -> Self {
        self.features = features.to_vec();
        self
    }

    pub(crate) fn keywords(mut self, role: Role, words: &[&str]) -> Self {
        self.special_handling
            .label_keywords
            .insert(role, words.iter().map(|w| w.to_string()).collect());
        self
    }

    pub(crate) fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn handling(mut self, edit: impl FnOnce(&mut SpecialHandling)) -> Self {
        edit(&mut self.special_handling);
        self
    }
}
