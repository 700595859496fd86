use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role};
use super::traits::Plugin;

pub struct Jike {
    config: PlatformConfig,
}

impl Jike {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Jike {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Jike {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("jike", "即刻", ContentType::Text)
        .urls(&["https://web.okjike.com/*"])
        .editor("https://web.okjike.com/")
        .select(
            Role::Content,
            &["[contenteditable=\"true\"][data-placeholder]", "div[contenteditable=\"true\"]"],
        )
        .select(Role::UploadInput, &["input[type=\"file\"][accept*=\"image\"]", "input[type=\"file\"]"])
        .keywords(Role::Content, &["分享你的想法"])
        .features(&[Feature::Content, Feature::Images])
        .handling(|h| {
            h.content_limit = Some(FieldLimit::max(2_000));
            h.image_limit = Some(9);
            h.merge_title_into_content = true;
            h.required = vec![Role::Content];
        })
}
