use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::Plugin;

/// Weibo home-page composer. Topics are written `#topic#`.
pub struct Weibo {
    config: PlatformConfig,
}

impl Weibo {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Weibo {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Weibo {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("weibo", "微博", ContentType::Text)
        .urls(&["https://weibo.com/*", "https://www.weibo.com/*"])
        .editor("https://weibo.com/")
        .select(
            Role::Content,
            &[
                "textarea[class*=\"Form_input\"]",
                "textarea[placeholder*=\"新鲜事\"]",
                "#homeWrap textarea",
            ],
        )
        .select(Role::UploadInput, &["input[type=\"file\"][accept*=\"image\"]", "input[type=\"file\"]"])
        .keywords(Role::Content, &["有什么新鲜事想分享给大家"])
        .features(&[Feature::Content, Feature::Tags, Feature::Images])
        .handling(|h| {
            h.init_delay_ms = 500;
            h.content_limit = Some(FieldLimit::max(2_000));
            h.image_limit = Some(9);
            h.tag_style = TagStyle::DoubleHashtag;
            h.merge_title_into_content = true;
            h.required = vec![Role::Content];
        })
}
