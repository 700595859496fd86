use super::traits::{FillContext, FillPhase, FillResult, Plugin};
use crate::error::FillError;
use crate::payload::FillPayload;
use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};

/// `*` matches any run of characters; everything else is literal. The
/// expression is anchored at both ends and case-insensitive.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    RegexBuilder::new(&format!("^{}$", body))
        .case_insensitive(true)
        .build()
}

struct Entry {
    plugin: Box<dyn Plugin>,
    patterns: Vec<Regex>,
}

impl Entry {
    fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(url))
    }
}

/// Plugins available to one page session.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<Entry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in platform.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for plugin in super::builtin_plugins() {
            registry.register(plugin);
        }
        registry
    }

    /// Adds `plugin` unless a plugin with the same id is already present.
    /// Returns whether it was added.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> bool {
        let id = plugin.id().to_string();
        if self.get(&id).is_some() {
            debug!("[registry] {} already registered, skipping", id);
            return false;
        }
        let patterns = plugin
            .config()
            .url_patterns
            .iter()
            .filter_map(|p| match glob_to_regex(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("[registry] {}: invalid url pattern {}: {}", id, p, e);
                    None
                }
            })
            .collect();
        info!("[registry] registered {}", id);
        self.entries.push(Entry { plugin, patterns });
        true
    }

    pub fn get(&self, id: &str) -> Option<&dyn Plugin> {
        self.entries
            .iter()
            .find(|e| e.plugin.id() == id)
            .map(|e| e.plugin.as_ref())
    }

    /// Every plugin whose patterns match `url`, highest priority first.
    /// Ties keep registration order.
    pub fn plugins_for_url(&self, url: &str) -> Vec<&dyn Plugin> {
        let mut matched: Vec<&dyn Plugin> = self
            .entries
            .iter()
            .filter(|e| e.matches(url))
            .map(|e| e.plugin.as_ref())
            .collect();
        matched.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        matched
    }

    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.entries.iter().map(|e| e.plugin.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fills the current page with the best matching plugin.
    pub async fn fill_content(
        &self,
        ctx: &FillContext<'_>,
        payload: &FillPayload,
    ) -> Result<FillResult, FillError> {
        let url = ctx.dom.current_url().await?;
        debug!("[registry] {:?} {}", FillPhase::Matching, url);
        self.best_for_url(&url)?.fill_content(ctx, payload).await
    }

    /// The first of [`PluginRegistry::plugins_for_url`].
    pub fn best_for_url(&self, url: &str) -> Result<&dyn Plugin, FillError> {
        let plugin = self
            .plugins_for_url(url)
            .into_iter()
            .next()
            .ok_or_else(|| FillError::NoPluginForUrl(url.to_string()))?;
        info!("[registry] {} handles {}", plugin.id(), url);
        Ok(plugin)
    }
}
