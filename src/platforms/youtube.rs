use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::Plugin;

/// YouTube Studio upload dialog. Every textbox sits inside nested web
/// components, so lookups walk open shadow roots.
pub struct Youtube {
    config: PlatformConfig,
}

impl Youtube {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Youtube {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Youtube {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("youtube", "YouTube", ContentType::Video)
        .urls(&["https://studio.youtube.com/*"])
        .editor("https://studio.youtube.com/")
        .select(
            Role::Title,
            &["#title-textarea #textbox", "ytcp-social-suggestions-textbox#title-textarea #textbox"],
        )
        .select(
            Role::Description,
            &["#description-textarea #textbox", "ytcp-social-suggestions-textbox#description-textarea #textbox"],
        )
        .select(Role::Tags, &["#tags-container input#text-input", "input[aria-label=\"Tags\"]"])
        .keywords(Role::Title, &["add a title", "title (required)"])
        .keywords(Role::Description, &["tell viewers about your video"])
        .features(&[Feature::Title, Feature::Description, Feature::Tags, Feature::Video])
        .handling(|h| {
            h.max_wait_time_ms = 20_000;
            h.retry_on_fail = true;
            h.include_shadow_dom = true;
            h.title_limit = Some(FieldLimit::max(100));
            h.description_limit = Some(FieldLimit::max(5_000));
            h.support_tags = true;
            h.tag_style = TagStyle::CommaSeparated;
            h.tag_limit = Some(FieldLimit::max(15));
            h.required = vec![Role::Title];
        })
}
