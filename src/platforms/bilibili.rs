use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::Plugin;

/// Bilibili video submission form. Tags are chips: each one is typed and
/// committed with Enter.
pub struct Bilibili {
    config: PlatformConfig,
}

impl Bilibili {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Bilibili {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Bilibili {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("bilibili", "哔哩哔哩", ContentType::Video)
        .urls(&["https://member.bilibili.com/platform/upload/*"])
        .editor("https://member.bilibili.com/platform/upload/video/frame")
        .select(
            Role::Title,
            &[
                ".video-title-content input",
                "input[placeholder*=\"标题\"]",
                ".input-val[maxlength=\"80\"]",
            ],
        )
        .select(
            Role::Description,
            &[".archive-info-editor .ql-editor", ".ql-editor", "textarea[placeholder*=\"简介\"]"],
        )
        .select(Role::Tags, &[".tag-input-wrp input", "input[placeholder*=\"标签\"]"])
        .keywords(Role::Tags, &["按回车键Enter创建标签"])
        .features(&[Feature::Title, Feature::Description, Feature::Tags, Feature::Video])
        .handling(|h| {
            h.max_wait_time_ms = 30_000;
            h.retry_on_fail = true;
            h.title_limit = Some(FieldLimit::max(80));
            h.description_limit = Some(FieldLimit::max(2_000));
            h.support_tags = true;
            h.tag_style = TagStyle::EnterSeparated;
            h.tag_limit = Some(FieldLimit::max(10));
            h.required = vec![Role::Title];
        })
}
