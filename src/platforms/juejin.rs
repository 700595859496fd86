use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::Plugin;

/// Juejin markdown editor (bytemd on top of CodeMirror).
pub struct Juejin {
    config: PlatformConfig,
}

impl Juejin {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Juejin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Juejin {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("juejin", "掘金", ContentType::Markdown)
        .urls(&["https://juejin.cn/editor/*"])
        .editor("https://juejin.cn/editor/drafts/new")
        .select(Role::Title, &["input.title-input", "input[placeholder*=\"标题\"]"])
        .select(
            Role::Content,
            &[
                ".bytemd-editor .CodeMirror",
                ".bytemd-editor .CodeMirror-code",
                ".CodeMirror",
            ],
        )
        // The tag picker only exists in the publish popover.
        .select(Role::Tags, &[".tag-input input", "input[placeholder*=\"标签\"]"])
        .keywords(Role::Title, &["输入文章标题"])
        .features(&[Feature::Title, Feature::Content, Feature::Tags])
        .handling(|h| {
            h.retry_on_fail = true;
            h.title_limit = Some(FieldLimit::range(5, 100));
            h.support_tags = true;
            h.tag_style = TagStyle::EnterSeparated;
            h.tag_limit = Some(FieldLimit::max(3));
        })
}
