use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::Plugin;

/// Douyin creator centre. The edit form appears once the video upload has
/// been accepted; topics go inline into the description as `#tag`.
pub struct Douyin {
    config: PlatformConfig,
}

impl Douyin {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Douyin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Douyin {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("douyin", "抖音", ContentType::Video)
        .urls(&[
            "https://creator.douyin.com/creator-micro/content/upload*",
            "https://creator.douyin.com/creator-micro/content/publish*",
            "https://creator.douyin.com/creator-micro/content/post/*",
        ])
        .editor("https://creator.douyin.com/creator-micro/content/upload")
        .select(
            Role::Title,
            &[
                "input[placeholder*=\"标题\"]",
                "input[placeholder*=\"title\" i]",
                ".title-input input",
                "[class*=\"title\"] input[type=\"text\"]",
            ],
        )
        .select(
            Role::Description,
            &[
                ".zone-container[contenteditable=\"true\"]",
                "[data-placeholder*=\"简介\"]",
                "textarea[placeholder*=\"描述\"]",
                "[contenteditable=\"true\"]",
            ],
        )
        .select(Role::UploadInput, &["input[type=\"file\"][accept*=\"video\"]", "input[type=\"file\"]"])
        .keywords(Role::Description, &["添加作品简介", "描述"])
        .features(&[Feature::Title, Feature::Description, Feature::Tags, Feature::Video])
        .handling(|h| {
            h.init_delay_ms = 1_000;
            h.max_wait_time_ms = 30_000;
            h.retry_on_fail = true;
            h.title_limit = Some(FieldLimit::max(30));
            h.description_limit = Some(FieldLimit::max(1_000));
            h.tag_style = TagStyle::Hashtag;
            h.tag_limit = Some(FieldLimit::max(5));
            h.required = vec![Role::Title];
        })
}
