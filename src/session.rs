use crate::content::ContentSource;
use crate::dom::Dom;
use crate::error::FillError;
use crate::payload::FillPayload;
use crate::platforms::{ConfiguredPlugin, CopyResult, FillContext, FillResult, Plugin, PluginRegistry};
use crate::relay::Relay;
use crate::settings::{Settings, Timing};
use log::{info, warn};

/// Registry with the user's platform overrides ahead of the built-ins.
pub fn build_registry(settings: &Settings) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for config in &settings.platform_overrides {
        info!("[settings] platform override {}", config.id);
        registry.register(Box::new(ConfiguredPlugin::new(config.clone())));
    }
    for plugin in crate::platforms::builtin_plugins() {
        registry.register(plugin);
    }
    registry
}

/// One page, its plugins and the services a fill needs.
pub struct FillSession<'a> {
    registry: &'a PluginRegistry,
    dom: &'a dyn Dom,
    relay: &'a dyn Relay,
    timing: Timing,
}

impl<'a> FillSession<'a> {
    pub fn new(
        registry: &'a PluginRegistry,
        dom: &'a dyn Dom,
        relay: &'a dyn Relay,
        timing: Timing,
    ) -> Self {
        Self {
            registry,
            dom,
            relay,
            timing,
        }
    }

    fn context(&self) -> FillContext<'_> {
        FillContext {
            dom: self.dom,
            relay: self.relay,
            timing: &self.timing,
        }
    }

    /// `platform`, or the best plugin for the page's URL.
    pub async fn resolve(&self, platform: Option<&str>) -> Result<&'a dyn Plugin, FillError> {
        if let Some(id) = platform {
            return self
                .registry
                .get(id)
                .ok_or_else(|| FillError::UnknownPlatform(id.to_string()));
        }
        let url = self.dom.current_url().await?;
        self.registry.best_for_url(&url)
    }

    /// Fills the page with an already fetched payload, through `platform`
    /// or whichever plugin the registry matches to the page.
    pub async fn fill(
        &self,
        platform: Option<&str>,
        payload: &FillPayload,
    ) -> Result<FillResult, FillError> {
        let ctx = self.context();
        match platform {
            Some(id) => self.resolve(Some(id)).await?.fill_content(&ctx, payload).await,
            None => self.registry.fill_content(&ctx, payload).await,
        }
    }

    /// Fetches `content_id` prepared for the page's platform, then fills.
    pub async fn fill_from_source(
        &self,
        source: &dyn ContentSource,
        content_id: &str,
        platform: Option<&str>,
    ) -> Result<FillResult, FillError> {
        let plugin = self.resolve(platform).await?;
        let payload = source
            .fetch_payload(content_id, plugin.id())
            .await
            .map_err(|e| FillError::NoData(e.to_string()))?;
        let result = plugin.fill_content(&self.context(), &payload).await;
        if let Err(e) = &result {
            warn!("[{}填表] 填表中止：{}", plugin.id(), e);
        }
        result
    }

    pub async fn copy(
        &self,
        source: &dyn ContentSource,
        content_id: &str,
        platform: Option<&str>,
    ) -> Result<CopyResult, FillError> {
        let plugin = self.resolve(platform).await?;
        Ok(plugin
            .copy_article_content(source, self.relay, content_id)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDom;
    use crate::platforms::config::{ContentType, PlatformConfig};
    use crate::relay::NoRelay;

    #[test]
    fn overrides_take_the_builtin_slot() {
        let mut settings = Settings::default();
        let mut zhihu = crate::platforms::zhihu::config();
        zhihu.name = "知乎 (custom)".into();
        settings.platform_overrides.push(zhihu);
        settings
            .platform_overrides
            .push(PlatformConfig::new("blog", "Blog", ContentType::Markdown).urls(&["https://blog.example.com/*"]));

        let registry = build_registry(&settings);
        assert_eq!(registry.get("zhihu").unwrap().config().name, "知乎 (custom)");
        assert!(registry.get("blog").is_some());
        assert_eq!(registry.len(), crate::platforms::builtin_plugins().len() + 1);
    }

    #[tokio::test]
    async fn resolves_by_id_or_url() {
        let registry = PluginRegistry::with_builtins();
        let dom = MemoryDom::new("https://zhuanlan.zhihu.com/write");
        let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());

        assert_eq!(session.resolve(None).await.unwrap().id(), "zhihu");
        assert_eq!(session.resolve(Some("weibo")).await.unwrap().id(), "weibo");
        assert!(matches!(
            session.resolve(Some("myspace")).await,
            Err(FillError::UnknownPlatform(_))
        ));

        dom.set_url("https://example.com/");
        assert!(matches!(
            session.resolve(None).await,
            Err(FillError::NoPluginForUrl(_))
        ));
    }
}
