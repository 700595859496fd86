use crate::images::ImageRef;
use crate::text::TagsInput;
use serde::{Deserialize, Serialize};

/// Header/footer and byline configured by the user for a platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preset {
    pub header_content: Option<String>,
    pub footer_content: Option<String>,
    pub author: Option<String>,
}

/// Data to write into one editor, as produced by the content service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FillPayload {
    pub title: Option<String>,
    /// HTML or Markdown, depending on what the platform was requested for.
    pub content: Option<String>,
    pub video_title: Option<String>,
    pub video_description: Option<String>,
    pub tags: Option<TagsInput>,
    pub images: Vec<ImageRef>,
    pub cover_image: Option<String>,
    pub digest: Option<String>,
    pub preset: Option<Preset>,
}

impl FillPayload {
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();
        blank(&self.title)
            && blank(&self.content)
            && blank(&self.video_title)
            && blank(&self.video_description)
            && blank(&self.digest)
            && self.images.is_empty()
            && self.cover_image.is_none()
    }
}
