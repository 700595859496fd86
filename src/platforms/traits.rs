use super::common;
use super::config::{PlatformConfig, Role};
use crate::content::ContentSource;
use crate::dom::{Dom, NodeId};
use crate::error::FillError;
use crate::images::UploadReport;
use crate::payload::FillPayload;
use crate::relay::Relay;
use crate::settings::Timing;
use crate::text::Content;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a plugin may touch during one fill.
#[derive(Clone, Copy)]
pub struct FillContext<'a> {
    pub dom: &'a dyn Dom,
    pub relay: &'a dyn Relay,
    pub timing: &'a Timing,
}

/// Editor elements found on the current page. Handles go stale as soon as
/// the page re-renders; re-locate before reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBundle {
    pub is_editor: bool,
    pub elements: BTreeMap<Role, NodeId>,
}

impl ElementBundle {
    pub fn get(&self, role: Role) -> Option<NodeId> {
        self.elements.get(&role).copied()
    }

    pub fn missing(&self, required: &[Role]) -> Vec<Role> {
        required
            .iter()
            .filter(|r| !self.elements.contains_key(r))
            .copied()
            .collect()
    }
}

/// Values ready for injection, after preset wrapping, tag handling and
/// content-type conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedFields {
    pub title: Option<String>,
    pub body: Option<Content>,
    pub description: Option<String>,
    /// Tags still to be delivered through the tag input. Empty when the
    /// platform takes them inline.
    pub tags: Vec<String>,
    pub inline_tags: bool,
    pub digest: Option<String>,
    pub author: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl FieldOutcome {
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Stages of one fill, logged as the fill progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FillPhase {
    Idle,
    Matching,
    Locating,
    Injecting,
    ImageUploading,
    Done,
    PartialFailure,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FillStatus {
    Done,
    PartialFailure,
    Failed,
}

impl From<FillStatus> for FillPhase {
    fn from(status: FillStatus) -> Self {
        match status {
            FillStatus::Done => FillPhase::Done,
            FillStatus::PartialFailure => FillPhase::PartialFailure,
            FillStatus::Failed => FillPhase::Failed,
        }
    }
}

/// Per-field report of one fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillResult {
    pub platform: String,
    /// Every attempted field, images included, went through.
    pub success: bool,
    pub status: FillStatus,
    pub fields: BTreeMap<String, FieldOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<UploadReport>,
    pub finished_at: DateTime<Utc>,
}

impl FillResult {
    pub fn field(&self, name: &str) -> Option<&FieldOutcome> {
        self.fields.get(name)
    }
}

/// Fallback for pages where injection is not possible: content to paste by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyResult {
    pub success: bool,
    pub content: String,
    /// `text`, `html` or `markdown`.
    pub format: String,
    pub message: String,
}

/// Contract shared by every platform adapter. Defaults run the generic,
/// configuration-driven flow; adapters override the steps their site needs.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn config(&self) -> &PlatformConfig;

    fn id(&self) -> &str {
        &self.config().id
    }

    fn priority(&self) -> i32 {
        self.config().priority
    }

    fn is_platform_match(&self, url: &str) -> bool {
        self.config().matches_url(url)
    }

    fn compose(&self, payload: &FillPayload) -> ComposedFields {
        common::compose(self.config(), payload)
    }

    async fn find_elements(&self, ctx: &FillContext<'_>) -> Result<ElementBundle, FillError> {
        common::find_elements(self.config(), ctx).await
    }

    /// Clicks the placeholder that mounts the real editor. Returns whether
    /// anything was clicked.
    async fn activate_editor(&self, ctx: &FillContext<'_>) -> Result<bool, FillError> {
        common::activate_editor(self.config(), ctx).await
    }

    async fn fill_content(
        &self,
        ctx: &FillContext<'_>,
        payload: &FillPayload,
    ) -> Result<FillResult, FillError> {
        common::fill_content(self, ctx, payload).await
    }

    async fn copy_article_content(
        &self,
        source: &dyn ContentSource,
        relay: &dyn Relay,
        content_id: &str,
    ) -> CopyResult {
        common::copy_article_content(self, source, relay, content_id).await
    }
}
