pub mod common;
pub mod config;
pub mod registry;
pub mod traits;

pub mod bilibili;
pub mod douyin;
pub mod jike;
pub mod juejin;
pub mod wechat;
pub mod weibo;
pub mod x;
pub mod xiaohongshu;
pub mod youtube;
pub mod zhihu;

use config::{ContentType, Feature, PlatformConfig};
use serde::Serialize;

pub use registry::PluginRegistry;
pub use traits::{
    ComposedFields, CopyResult, ElementBundle, FieldOutcome, FillContext, FillPhase, FillResult,
    FillStatus, Plugin,
};

/// Summary row for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub id: String,
    pub name: String,
    pub editor_url: String,
    pub content_type: ContentType,
    pub features: Vec<Feature>,
    pub priority: i32,
}

impl From<&PlatformConfig> for PlatformInfo {
    fn from(config: &PlatformConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            editor_url: config.editor_url.clone(),
            content_type: config.content_type,
            features: config.features.clone(),
            priority: config.priority,
        }
    }
}

/// A platform described purely by configuration, e.g. an override loaded
/// from the settings file.
pub struct ConfiguredPlugin {
    config: PlatformConfig,
}

impl ConfiguredPlugin {
    pub fn new(config: PlatformConfig) -> Self {
        Self { config }
    }
}

impl Plugin for ConfiguredPlugin {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

/// Every built-in platform adapter.
pub fn builtin_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(wechat::WechatVideo::new()),
        Box::new(wechat::Wechat::new()),
        Box::new(zhihu::Zhihu::new()),
        Box::new(juejin::Juejin::new()),
        Box::new(xiaohongshu::Xiaohongshu::new()),
        Box::new(douyin::Douyin::new()),
        Box::new(bilibili::Bilibili::new()),
        Box::new(youtube::Youtube::new()),
        Box::new(x::X::new()),
        Box::new(weibo::Weibo::new()),
        Box::new(jike::Jike::new()),
    ]
}

/// Get platform info by platform ID
pub fn get_platform_info(platform: &str) -> Option<PlatformInfo> {
    builtin_plugins()
        .iter()
        .find(|p| p.id() == platform)
        .map(|p| PlatformInfo::from(p.config()))
}

/// Get all supported platforms
pub fn all_platforms() -> Vec<PlatformInfo> {
    builtin_plugins()
        .iter()
        .map(|p| PlatformInfo::from(p.config()))
        .collect()
}
