use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role};
use super::traits::Plugin;

/// Zhihu column editor. The body is a Draft.js instance that only accepts
/// content through paste.
pub struct Zhihu {
    config: PlatformConfig,
}

impl Zhihu {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Zhihu {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Zhihu {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("zhihu", "知乎", ContentType::Html)
        .urls(&["https://zhuanlan.zhihu.com/*"])
        .editor("https://zhuanlan.zhihu.com/write")
        .select(
            Role::Title,
            &[
                "textarea[placeholder*=\"标题\"]",
                ".WriteIndex-titleInput textarea",
                "input[placeholder*=\"标题\"]",
            ],
        )
        .select(
            Role::Content,
            &[
                ".public-DraftEditor-content",
                ".DraftEditor-root [contenteditable=\"true\"]",
                "[data-contents=\"true\"]",
            ],
        )
        .keywords(Role::Title, &["请输入标题", "标题"])
        .features(&[Feature::Title, Feature::Content])
        .handling(|h| {
            h.init_delay_ms = 1_000;
            h.retry_on_fail = true;
            h.title_limit = Some(FieldLimit::max(100));
        })
}
