use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role};
use super::traits::Plugin;

/// WeChat Official Account article editor (ProseMirror body).
pub struct Wechat {
    config: PlatformConfig,
}

impl Wechat {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Wechat {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Wechat {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("wechat", "微信公众号", ContentType::Html)
        .urls(&["https://mp.weixin.qq.com/cgi-bin/appmsg*"])
        .editor("https://mp.weixin.qq.com/cgi-bin/appmsg?t=media/appmsg_edit_v2&action=edit&isNew=1&type=77")
        .select(Role::Title, &["#title", "textarea.js_title", "textarea[placeholder*=\"标题\"]"])
        .select(
            Role::Content,
            &[
                ".ProseMirror[contenteditable=\"true\"]",
                "#ueditor_0",
                ".edui-editor-iframeholder [contenteditable=\"true\"]",
            ],
        )
        .select(Role::Digest, &["#js_description", "textarea[name=\"digest\"]"])
        .select(Role::Author, &["#author", "input[name=\"author\"]"])
        .select(Role::DropZone, &[".ProseMirror[contenteditable=\"true\"]"])
        .keywords(Role::Title, &["标题", "请在这里输入标题"])
        .keywords(Role::Author, &["作者"])
        .features(&[
            Feature::Title,
            Feature::Content,
            Feature::Digest,
            Feature::Author,
            Feature::Images,
            Feature::Cover,
        ])
        .handling(|h| {
            h.init_delay_ms = 500;
            h.retry_on_fail = true;
            h.title_limit = Some(FieldLimit::max(64));
            h.digest_limit = Some(FieldLimit::max(120));
            h.image_limit = Some(20);
        })
}

/// Video-post composer served from the same editor path (`type=15`).
pub struct WechatVideo {
    config: PlatformConfig,
}

impl WechatVideo {
    pub fn new() -> Self {
        Self {
            config: video_config(),
        }
    }
}

impl Default for WechatVideo {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for WechatVideo {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn video_config() -> PlatformConfig {
    PlatformConfig::new("wechat-video", "微信公众号视频", ContentType::Video)
        .urls(&["https://mp.weixin.qq.com/cgi-bin/appmsg*type=15*"])
        .editor("https://mp.weixin.qq.com/cgi-bin/appmsg?t=media/videomsg_edit&action=video_edit&type=15")
        .select(Role::Title, &["#title", "input[placeholder*=\"标题\"]"])
        .select(
            Role::Description,
            &["#js_description", "textarea[placeholder*=\"介绍\"]", "textarea"],
        )
        .features(&[Feature::Title, Feature::Description, Feature::Video])
        .priority(10)
        .handling(|h| {
            h.title_limit = Some(FieldLimit::max(64));
            h.description_limit = Some(FieldLimit::max(600));
            h.required = vec![Role::Title];
        })
}
