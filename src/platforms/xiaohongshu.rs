//! Xiaohongshu image notes.
//!
//! The note editor only mounts once at least one image has been uploaded, so
//! the images go first and the text fields are filled afterwards.

use super::common;
use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role};
use super::traits::{FillContext, FillPhase, FillResult, FillStatus, Plugin};
use crate::error::FillError;
use crate::images::{ImageClient, UploadReport};
use crate::payload::FillPayload;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::collections::BTreeMap;
use std::time::Duration;

pub struct Xiaohongshu {
    config: PlatformConfig,
}

impl Xiaohongshu {
    pub fn new() -> Self {
        Self { config: config() }
    }
}

impl Default for Xiaohongshu {
    fn default() -> Self {
        Self::new()
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("xiaohongshu", "小红书", ContentType::Text)
        .urls(&["https://creator.xiaohongshu.com/publish/*"])
        .editor("https://creator.xiaohongshu.com/publish/publish?source=official&from=tab_switch")
        .select(
            Role::Title,
            &["input[placeholder*=\"标题\"]", ".d-input input", ".c-input_inner"],
        )
        .select(
            Role::Content,
            &[
                "#post-textarea",
                ".ql-editor",
                ".tiptap.ProseMirror",
                "[contenteditable=\"true\"]",
            ],
        )
        .select(
            Role::UploadInput,
            &["input.upload-input", "input[type=\"file\"][accept*=\"image\"]", "input[type=\"file\"]"],
        )
        .select(Role::ActivateEditor, &["[data-tab=\"image\"]", ".creator-tab:nth-of-type(2)"])
        .keywords(Role::Title, &["填写标题"])
        .features(&[Feature::Title, Feature::Content, Feature::Images])
        .handling(|h| {
            h.max_wait_time_ms = 15_000;
            h.retry_on_fail = true;
            h.title_limit = Some(FieldLimit::max(20));
            h.content_limit = Some(FieldLimit::max(1_000));
            h.image_limit = Some(18);
        })
}

#[async_trait]
impl Plugin for Xiaohongshu {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }

    async fn fill_content(
        &self,
        ctx: &FillContext<'_>,
        payload: &FillPayload,
    ) -> Result<FillResult, FillError> {
        let config = &self.config;
        let images = self.compose(payload).images;

        let mut report = None;
        if !images.is_empty() {
            debug!("[xiaohongshu填表] 阶段 -> {:?}", FillPhase::ImageUploading);
            self.activate_editor(ctx).await?;
            let wait = Duration::from_millis(config.special_handling.max_wait_time_ms);
            let lookup = common::locate_role(config, ctx, Role::UploadInput, Some(wait)).await;
            let uploaded = match lookup {
                Ok(input) => {
                    ImageClient::new(ctx.dom, ctx.relay, ctx.timing.image_concurrency)
                        .upload_batch(&images, input, None)
                        .await?
                }
                Err(e) => UploadReport::undelivered(images.len(), e.to_string()),
            };
            info!(
                "[xiaohongshu填表] 已上传 {}/{} 张图片",
                uploaded.uploaded, uploaded.requested
            );
            report = Some(uploaded);
        }

        let text_only = FillPayload {
            images: Vec::new(),
            cover_image: None,
            ..payload.clone()
        };
        let mut result = match (&report, text_only.is_empty()) {
            (None, _) => return common::fill_content(self, ctx, &text_only).await,
            (Some(_), true) => FillResult {
                platform: config.id.clone(),
                success: false,
                status: FillStatus::Failed,
                fields: BTreeMap::new(),
                images: None,
                finished_at: Utc::now(),
            },
            (Some(_), false) => common::fill_content(self, ctx, &text_only).await?,
        };

        if let Some(report) = report {
            let outcome = common::image_outcome(&report);
            common::log_field(&config.id, "images", &outcome);
            result.fields.insert("images".into(), outcome);
            result.images = Some(report);
        }
        result.status = common::aggregate(&result.fields);
        result.success = result.status == FillStatus::Done;
        result.finished_at = Utc::now();
        Ok(result)
    }
}
