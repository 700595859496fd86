//! Element locator.
//!
//! Resolves ordered selector candidates to a live element. The first
//! candidate with a match wins. Optionally walks open shadow roots, filters
//! on visibility, falls back to label keywords, and polls until a timeout.

use crate::dom::{Dom, DomError, NodeId, NodeInfo, Scope};
use crate::platforms::config::Selectors;
use log::{debug, warn};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

const LABEL_CANDIDATES: &str = "input, textarea, [contenteditable]";
const LABEL_ATTRIBUTES: &[&str] = &["aria-label", "placeholder", "title", "data-placeholder"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocateOptions {
    /// Keep polling until this much time has passed. `None` checks once.
    pub timeout: Option<Duration>,
    pub include_shadow_dom: bool,
    pub visible_only: bool,
    pub poll_interval: Duration,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            include_shadow_dom: false,
            visible_only: false,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl LocateOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn shadow(mut self, include: bool) -> Self {
        self.include_shadow_dom = include;
        self
    }

    pub fn visible(mut self, visible_only: bool) -> Self {
        self.visible_only = visible_only;
        self
    }

    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct Locator<'a> {
    dom: &'a dyn Dom,
}

impl<'a> Locator<'a> {
    pub fn new(dom: &'a dyn Dom) -> Self {
        Self { dom }
    }

    /// First element matching any candidate, in candidate order. `Ok(None)`
    /// means the element did not show up before the timeout.
    pub async fn locate(
        &self,
        selectors: &Selectors,
        options: &LocateOptions,
    ) -> Result<Option<NodeId>, DomError> {
        self.locate_with_fallback(Some(selectors), &[], options).await
    }

    /// Like [`Locator::locate`], trying the label heuristic whenever the
    /// selectors come up empty.
    pub async fn locate_with_fallback(
        &self,
        selectors: Option<&Selectors>,
        keywords: &[String],
        options: &LocateOptions,
    ) -> Result<Option<NodeId>, DomError> {
        let start = Instant::now();
        loop {
            if let Some(selectors) = selectors {
                if let Some(node) = self.find_once(selectors, options).await? {
                    return Ok(Some(node));
                }
            }
            if !keywords.is_empty() {
                if let Some(node) = self.locate_by_label(keywords, options).await? {
                    debug!("[locator] label fallback matched {:?} for {:?}", node, keywords);
                    return Ok(Some(node));
                }
            }

            let Some(timeout) = options.timeout else {
                return Ok(None);
            };
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(options.poll_interval.min(timeout - elapsed)).await;
        }
    }

    async fn find_once(
        &self,
        selectors: &Selectors,
        options: &LocateOptions,
    ) -> Result<Option<NodeId>, DomError> {
        for selector in selectors.iter() {
            let nodes = match self.query(selector, options.include_shadow_dom).await {
                Ok(nodes) => nodes,
                Err(DomError::Selector(e)) => {
                    warn!("[locator] skipping selector: {}", e);
                    continue;
                }
                Err(DomError::Detached(node)) => {
                    debug!("[locator] {:?} went stale during {:?}", node, selector);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for node in nodes {
                if !options.visible_only {
                    return Ok(Some(node));
                }
                if let Some(info) = self.describe_live(node).await? {
                    if info.is_visible() {
                        return Ok(Some(node));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn query(&self, selector: &str, deep: bool) -> Result<Vec<NodeId>, DomError> {
        if deep {
            self.query_deep(selector).await
        } else {
            self.dom.query_all(Scope::Document, selector).await
        }
    }

    /// Depth-first search through the document and every open shadow root
    /// beneath it. Results are de-duplicated and keep discovery order. A
    /// shadow host that is remounted mid-walk drops out with its subtree.
    pub async fn query_deep(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut visited_hosts = HashSet::new();
        let mut stack = vec![Scope::Document];

        while let Some(scope) = stack.pop() {
            let matched = self.dom.query_all(scope, selector).await;
            let Some(nodes) = skip_stale(scope, matched)? else {
                continue;
            };
            for node in nodes {
                if seen.insert(node) {
                    found.push(node);
                }
            }
            let hosts = self.dom.shadow_hosts(scope).await;
            let Some(hosts) = skip_stale(scope, hosts)? else {
                continue;
            };
            for host in hosts.into_iter().rev() {
                if visited_hosts.insert(host) {
                    stack.push(Scope::ShadowOf(host));
                }
            }
        }
        Ok(found)
    }

    /// Scans inputs and editable regions for an `aria-label`, `placeholder`,
    /// `title` or visible text containing one of `keywords`
    /// (case-insensitive). Visible matches are preferred.
    pub async fn locate_by_label(
        &self,
        keywords: &[String],
        options: &LocateOptions,
    ) -> Result<Option<NodeId>, DomError> {
        let needles: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if needles.is_empty() {
            return Ok(None);
        }

        let mut hidden_match = None;
        for node in self.query(LABEL_CANDIDATES, options.include_shadow_dom).await? {
            let Some(info) = self.describe_live(node).await? else {
                continue;
            };
            if !(info.is_native_control() || info.content_editable) {
                continue;
            }
            if !label_matches(&info, &needles) {
                continue;
            }
            if info.is_visible() {
                return Ok(Some(node));
            }
            if hidden_match.is_none() && !options.visible_only {
                hidden_match = Some(node);
            }
        }
        Ok(hidden_match)
    }

    /// `describe`, treating a node that vanished since the query as absent.
    async fn describe_live(&self, node: NodeId) -> Result<Option<NodeInfo>, DomError> {
        match self.dom.describe(node).await {
            Ok(info) => Ok(Some(info)),
            Err(DomError::Detached(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn skip_stale(
    scope: Scope,
    result: Result<Vec<NodeId>, DomError>,
) -> Result<Option<Vec<NodeId>>, DomError> {
    match result {
        Ok(nodes) => Ok(Some(nodes)),
        Err(DomError::Detached(node)) => {
            debug!("[locator] skipping {:?}, {:?} is gone", scope, node);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn label_matches(info: &NodeInfo, needles: &[String]) -> bool {
    let mut haystacks: Vec<String> = LABEL_ATTRIBUTES
        .iter()
        .filter_map(|name| info.attr(name))
        .map(str::to_lowercase)
        .collect();
    if info.content_editable {
        haystacks.push(info.text.to_lowercase());
    }
    haystacks
        .iter()
        .any(|hay| needles.iter().any(|needle| hay.contains(needle.as_str())))
}
