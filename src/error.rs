use crate::dom::DomError;
use crate::relay::RelayError;
use thiserror::Error;

/// Failures a fill operation reports to its caller.
///
/// Only [`FillError::NoEditorFound`], [`FillError::ExtensionContextInvalidated`]
/// and [`FillError::NoData`] abort a fill. Per-field and per-image problems are
/// recorded inside the [`crate::platforms::FillResult`] instead.
#[derive(Debug, Error)]
pub enum FillError {
    #[error("no usable editor found on {platform} ({url})")]
    NoEditorFound { platform: String, url: String },

    #[error("{field}: all injection strategies failed (tried {tried:?})")]
    FieldInjectionFailed { field: String, tried: Vec<String> },

    #[error("image {url} could not be fetched: {reason}")]
    ImageFetchFailed { url: String, reason: String },

    #[error("background relay is gone, please refresh the page")]
    ExtensionContextInvalidated,

    #[error("cannot fill, no data: {0}")]
    NoData(String),

    #[error("no platform plugin matches {0}")]
    NoPluginForUrl(String),

    #[error("unknown platform {0}")]
    UnknownPlatform(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl From<RelayError> for FillError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::ContextInvalidated => FillError::ExtensionContextInvalidated,
            other => FillError::NoData(other.to_string()),
        }
    }
}

impl FillError {
    /// Errors the user can fix by reloading the page or the relay.
    pub fn is_context_invalidated(&self) -> bool {
        matches!(self, FillError::ExtensionContextInvalidated)
    }
}
