//! The configuration-driven fill flow shared by every platform.
//!
//! Detection (with optional editor activation and a single retry), field
//! composition, sequential per-field injection and the image batch all live
//! here; platform modules only supply a [`PlatformConfig`] and override the
//! odd step.

use super::config::{ContentType, Feature, FieldLimit, PlatformConfig, Role, TagStyle};
use super::traits::{
    ComposedFields, CopyResult, ElementBundle, FieldOutcome, FillContext, FillPhase, FillResult,
    FillStatus, Plugin,
};
use crate::content::ContentSource;
use crate::dom::{DomError, NodeId};
use crate::error::FillError;
use crate::images::{collect_candidates, ImageClient, UploadReport};
use crate::injector::Injector;
use crate::locator::{LocateOptions, Locator};
use crate::payload::FillPayload;
use crate::relay::{Relay, RelayError};
use crate::text::{
    clip, clip_content, collapse_nbsp, escape_html, format_tags, html_to_text, markdown_to_plain,
    normalize_tags, Content, TagsInput,
};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Roles looked up by [`find_elements`], in fill order.
pub const FIELD_ROLES: &[Role] = &[
    Role::Title,
    Role::Content,
    Role::Description,
    Role::Tags,
    Role::Digest,
    Role::Author,
    Role::UploadInput,
    Role::DropZone,
];

fn enter(platform: &str, phase: FillPhase) {
    debug!("[{}填表] 阶段 -> {:?}", platform, phase);
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|v| collapse_nbsp(v).trim().to_string())
        .filter(|v| !v.is_empty())
}

fn looks_like_html(text: &str) -> bool {
    let t = text.trim_start();
    t.starts_with('<') && t.contains('>')
}

/// Plain text from whatever the content service sent.
fn to_plain(text: &str) -> String {
    if looks_like_html(text) {
        html_to_text(text)
    } else {
        markdown_to_plain(text)
    }
}

fn html_block(text: &str) -> String {
    if looks_like_html(text) {
        text.to_string()
    } else {
        format!("<p>{}</p>", escape_html(text))
    }
}

/// Appends `suffix` on its own line, shortening `text` so the whole stays
/// within `max` characters.
fn fit_with_suffix(field: &str, text: &str, suffix: Option<&str>, max: Option<usize>) -> String {
    let Some(suffix) = suffix.filter(|s| !s.is_empty()) else {
        return match max {
            Some(max) => clip(field, text, Some(&FieldLimit::max(max))),
            None => text.to_string(),
        };
    };
    let joined_len = |t: &str| t.chars().count() + 1 + suffix.chars().count();
    let body = match max {
        Some(max) if joined_len(text) > max => {
            let room = max.saturating_sub(suffix.chars().count() + 1);
            info!("[clip] {} shortened to keep {} tag chars", field, suffix.chars().count());
            text.chars().take(room).collect::<String>()
        }
        _ => text.to_string(),
    };
    if body.is_empty() {
        suffix.to_string()
    } else {
        format!("{}\n{}", body, suffix)
    }
}

/// Builds the values to inject for `config` from `payload`.
pub fn compose(config: &PlatformConfig, payload: &FillPayload) -> ComposedFields {
    let sh = &config.special_handling;
    let tags = payload
        .tags
        .as_ref()
        .map(|t| normalize_tags(t, sh.tag_limit.map(|l| l.max)))
        .unwrap_or_default();
    let inline_tags = sh.tag_style.is_inline();
    let tags = if sh.support_tags || inline_tags {
        tags
    } else {
        Vec::new()
    };
    let inline_text = (inline_tags && !tags.is_empty()).then(|| format_tags(&tags, sh.tag_style));

    let preset = payload.preset.clone().unwrap_or_default();
    let header = trimmed(preset.header_content.as_ref());
    let footer = trimmed(preset.footer_content.as_ref());
    let content = trimmed(payload.content.as_ref());

    let mut fields = ComposedFields {
        title: trimmed(payload.title.as_ref()),
        tags,
        inline_tags,
        digest: trimmed(payload.digest.as_ref()),
        author: trimmed(preset.author.as_ref()),
        ..ComposedFields::default()
    };

    match config.content_type {
        ContentType::Html => {
            let blocks: Vec<String> = [header, content, footer, inline_text]
                .into_iter()
                .flatten()
                .map(|b| html_block(&b))
                .collect();
            fields.body = (!blocks.is_empty()).then(|| Content::Html(blocks.concat()));
        }
        ContentType::Markdown => {
            let blocks: Vec<String> = [header, content, footer, inline_text]
                .into_iter()
                .flatten()
                .collect();
            fields.body = (!blocks.is_empty()).then(|| Content::Text(blocks.join("\n\n")));
        }
        ContentType::Text => {
            let mut blocks: Vec<String> = Vec::new();
            if sh.merge_title_into_content {
                blocks.extend(fields.title.take());
            }
            blocks.extend(header.map(|h| to_plain(&h)));
            blocks.extend(content.map(|c| to_plain(&c)));
            blocks.extend(footer.map(|f| to_plain(&f)));
            let text = blocks.join("\n\n");
            let max = config.limit_for(Role::Content).map(|l| l.max);
            let text = fit_with_suffix("content", &text, inline_text.as_deref(), max);
            fields.body = (!text.trim().is_empty()).then(|| Content::Text(text));
        }
        ContentType::Video => {
            fields.title = trimmed(payload.video_title.as_ref()).or(fields.title);
            let description = trimmed(payload.video_description.as_ref())
                .or_else(|| fields.digest.clone())
                .or(content)
                .map(|d| to_plain(&d))
                .unwrap_or_default();
            let max = config.limit_for(Role::Description).map(|l| l.max);
            let description =
                fit_with_suffix("description", &description, inline_text.as_deref(), max);
            fields.description = (!description.trim().is_empty()).then_some(description);
            fields.digest = None;
        }
    }

    if config.has_feature(Feature::Images) || config.has_feature(Feature::Cover) {
        let cover = if config.has_feature(Feature::Cover) {
            payload.cover_image.as_deref()
        } else {
            None
        };
        fields.images = collect_candidates(&payload.images, cover, sh.image_limit);
    }
    fields
}

/// Locates one role through its selectors and label keywords.
pub async fn locate_role(
    config: &PlatformConfig,
    ctx: &FillContext<'_>,
    role: Role,
    timeout: Option<Duration>,
) -> Result<Option<NodeId>, DomError> {
    let selectors = config.selectors_for(role);
    let keywords = config.keywords_for(role);
    if selectors.is_none() && keywords.is_empty() {
        return Ok(None);
    }
    let options = LocateOptions {
        timeout,
        include_shadow_dom: config.special_handling.include_shadow_dom,
        visible_only: !matches!(role, Role::UploadInput),
        poll_interval: ctx.timing.poll_interval(),
    };
    Locator::new(ctx.dom)
        .locate_with_fallback(selectors, keywords, &options)
        .await
}

/// Looks up every configured role. Required roles are polled until
/// `maxWaitTime`; the rest are checked once, and a page error while looking
/// for one only leaves it out.
pub async fn find_elements(
    config: &PlatformConfig,
    ctx: &FillContext<'_>,
) -> Result<ElementBundle, FillError> {
    let sh = &config.special_handling;
    let deadline = Instant::now() + Duration::from_millis(sh.max_wait_time_ms);
    let mut bundle = ElementBundle::default();

    for role in FIELD_ROLES {
        let required = sh.required.contains(role);
        let timeout = required.then(|| deadline.saturating_duration_since(Instant::now()));
        match locate_role(config, ctx, *role, timeout).await {
            Ok(Some(node)) => {
                bundle.elements.insert(*role, node);
            }
            Ok(None) => {}
            Err(e) if !required => {
                warn!("[{}填表] {} 查找出错，跳过：{}", config.id, role.as_str(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    bundle.is_editor = bundle.missing(&sh.required).is_empty();
    Ok(bundle)
}

pub async fn activate_editor(
    config: &PlatformConfig,
    ctx: &FillContext<'_>,
) -> Result<bool, FillError> {
    let Some(trigger) = locate_role(config, ctx, Role::ActivateEditor, None).await? else {
        return Ok(false);
    };
    info!("[{}填表] 激活编辑器", config.id);
    ctx.dom.click(trigger).await?;
    tokio::time::sleep(ctx.timing.poll_interval()).await;
    Ok(true)
}

/// Finds the editor, activating it and retrying once when configured.
pub async fn detect<P: Plugin + ?Sized>(
    plugin: &P,
    ctx: &FillContext<'_>,
) -> Result<ElementBundle, FillError> {
    let config = plugin.config();
    let sh = &config.special_handling;
    if sh.init_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(sh.init_delay_ms)).await;
    }

    let attempts = if sh.retry_on_fail { 2 } else { 1 };
    for attempt in 1..=attempts {
        if sh.activate_editor {
            plugin.activate_editor(ctx).await?;
        }
        let bundle = plugin.find_elements(ctx).await?;
        if bundle.is_editor {
            return Ok(bundle);
        }
        warn!(
            "[{}填表] 第{}次检测未找到编辑器，缺少 {:?}",
            config.id,
            attempt,
            bundle.missing(&sh.required)
        );
        if attempt < attempts {
            tokio::time::sleep(Duration::from_millis(sh.retry_delay_ms)).await;
        }
    }

    let url = ctx.dom.current_url().await.unwrap_or_default();
    Err(FillError::NoEditorFound {
        platform: config.id.clone(),
        url,
    })
}

/// Description falls back to the body editor on platforms with a single box.
fn target_role(config: &PlatformConfig, role: Role) -> Role {
    let configured = |r: Role| config.selectors_for(r).is_some() || !config.keywords_for(r).is_empty();
    match role {
        Role::Description if !configured(Role::Description) => Role::Content,
        Role::Content if !configured(Role::Content) => Role::Description,
        other => other,
    }
}

async fn inject_text_field(
    config: &PlatformConfig,
    ctx: &FillContext<'_>,
    injector: &Injector<'_>,
    role: Role,
    content: Content,
) -> FieldOutcome {
    let role = target_role(config, role);
    let node = match locate_role(config, ctx, role, None).await {
        Ok(Some(node)) => node,
        Ok(None) => return FieldOutcome::failed(format!("{} element not found", role.as_str())),
        Err(e) => return FieldOutcome::failed(e.to_string()),
    };
    let content = clip_content(role.as_str(), &content, config.limit_for(role));
    let outcome = injector.inject(node, &content).await;
    if outcome.success {
        FieldOutcome {
            success: true,
            value: Some(content.plain()),
            error: None,
            strategy: outcome.strategy.map(String::from),
        }
    } else {
        let err = FillError::FieldInjectionFailed {
            field: role.as_str().to_string(),
            tried: outcome.tried.iter().map(|s| s.to_string()).collect(),
        };
        let mut failed = FieldOutcome::failed(match outcome.error {
            Some(detail) => format!("{}: {}", err, detail),
            None => err.to_string(),
        });
        failed.value = Some(content.plain());
        failed
    }
}

async fn fill_tags(
    config: &PlatformConfig,
    ctx: &FillContext<'_>,
    injector: &Injector<'_>,
    tags: &[String],
) -> FieldOutcome {
    let style = config.special_handling.tag_style;
    match style {
        TagStyle::EnterSeparated => {
            let node = match locate_role(config, ctx, Role::Tags, None).await {
                Ok(Some(node)) => node,
                Ok(None) => return FieldOutcome::failed("tags element not found"),
                Err(e) => return FieldOutcome::failed(e.to_string()),
            };
            let mut added = 0;
            let mut last_error = None;
            for tag in tags {
                match injector.commit_entry(node, tag).await {
                    Ok(true) => added += 1,
                    Ok(false) => {
                        warn!("[{}填表] 标签 {} 未被接受", config.id, tag);
                        last_error = Some(format!("tag {:?} was not committed by Enter", tag));
                    }
                    Err(e) => {
                        warn!("[{}填表] 标签 {} 添加失败：{}", config.id, tag, e);
                        last_error = Some(e.to_string());
                        if matches!(e, DomError::Detached(_)) {
                            break;
                        }
                    }
                }
            }
            FieldOutcome {
                success: added == tags.len(),
                value: Some(format!("{}/{}", added, tags.len())),
                error: last_error,
                strategy: Some("enter-separated".into()),
            }
        }
        _ => {
            let text = format_tags(tags, style);
            inject_text_field(config, ctx, injector, Role::Tags, Content::Text(text)).await
        }
    }
}

pub(crate) fn aggregate(fields: &BTreeMap<String, FieldOutcome>) -> FillStatus {
    let ok = fields.values().filter(|f| f.success).count();
    if ok == fields.len() && ok > 0 {
        FillStatus::Done
    } else if ok > 0 {
        FillStatus::PartialFailure
    } else {
        FillStatus::Failed
    }
}

/// Generic fill: detect, compose, then title, body/description, tags,
/// digest, author and images, one after another.
pub async fn fill_content<P: Plugin + ?Sized>(
    plugin: &P,
    ctx: &FillContext<'_>,
    payload: &FillPayload,
) -> Result<FillResult, FillError> {
    let config = plugin.config();
    let platform = config.id.as_str();
    if payload.is_empty() {
        return Err(FillError::NoData("payload has nothing to fill".into()));
    }

    enter(platform, FillPhase::Locating);
    let bundle = detect(plugin, ctx).await?;
    info!(
        "[{}填表] 编辑器就绪，找到 {:?}",
        platform,
        bundle.elements.keys().map(Role::as_str).collect::<Vec<_>>()
    );

    let fields = plugin.compose(payload);
    enter(platform, FillPhase::Injecting);

    let injector = Injector::new(ctx.dom, ctx.timing.event_yield());
    let mut plan: Vec<(&str, Role, Content)> = Vec::new();
    if let Some(title) = &fields.title {
        plan.push(("title", Role::Title, Content::Text(title.clone())));
    }
    if let Some(body) = &fields.body {
        plan.push(("content", Role::Content, body.clone()));
    }
    if let Some(description) = &fields.description {
        plan.push(("description", Role::Description, Content::Text(description.clone())));
    }

    let mut outcomes: BTreeMap<String, FieldOutcome> = BTreeMap::new();
    let mut first = true;
    let mut pace = || {
        let wait = if first { Duration::ZERO } else { ctx.timing.field_delay() };
        first = false;
        wait
    };

    for (name, role, content) in plan {
        sleep_for(pace()).await;
        let outcome = inject_text_field(config, ctx, &injector, role, content).await;
        log_field(platform, name, &outcome);
        outcomes.insert(name.to_string(), outcome);
    }

    if !fields.tags.is_empty() {
        if fields.inline_tags {
            outcomes.insert(
                "tags".into(),
                FieldOutcome::ok(format_tags(&fields.tags, config.special_handling.tag_style)),
            );
        } else {
            sleep_for(pace()).await;
            let outcome = fill_tags(config, ctx, &injector, &fields.tags).await;
            log_field(platform, "tags", &outcome);
            outcomes.insert("tags".into(), outcome);
        }
    }

    for (name, role, value) in [
        ("digest", Role::Digest, &fields.digest),
        ("author", Role::Author, &fields.author),
    ] {
        let Some(value) = value else { continue };
        if config.selectors_for(role).is_none() && config.keywords_for(role).is_empty() {
            debug!("[{}填表] 平台不支持 {}，跳过", platform, name);
            continue;
        }
        sleep_for(pace()).await;
        let outcome =
            inject_text_field(config, ctx, &injector, role, Content::Text(value.clone())).await;
        log_field(platform, name, &outcome);
        outcomes.insert(name.to_string(), outcome);
    }

    let mut images = None;
    if !fields.images.is_empty() {
        enter(platform, FillPhase::ImageUploading);
        let report = match upload_targets(config, ctx).await {
            Ok((input, drop_zone)) => {
                ImageClient::new(ctx.dom, ctx.relay, ctx.timing.image_concurrency)
                    .upload_batch(&fields.images, input, drop_zone)
                    .await?
            }
            Err(e) => UploadReport::undelivered(fields.images.len(), e.to_string()),
        };
        let outcome = image_outcome(&report);
        log_field(platform, "images", &outcome);
        outcomes.insert("images".into(), outcome);
        images = Some(report);
    }

    let status = aggregate(&outcomes);
    enter(platform, status.into());
    info!("[{}填表] 完成：{:?}", platform, status);
    Ok(FillResult {
        platform: platform.to_string(),
        success: status == FillStatus::Done,
        status,
        fields: outcomes,
        images,
        finished_at: Utc::now(),
    })
}

async fn upload_targets(
    config: &PlatformConfig,
    ctx: &FillContext<'_>,
) -> Result<(Option<NodeId>, Option<NodeId>), DomError> {
    let input = locate_role(config, ctx, Role::UploadInput, None).await?;
    let drop_zone = locate_role(config, ctx, Role::DropZone, None).await?;
    Ok((input, drop_zone))
}

pub(crate) fn image_outcome(report: &UploadReport) -> FieldOutcome {
    let summary = format!("{}/{}", report.uploaded, report.requested);
    if report.success() {
        return FieldOutcome::ok(summary);
    }
    FieldOutcome {
        success: false,
        value: Some(summary),
        error: report
            .error
            .clone()
            .or_else(|| Some(format!("{} image(s) could not be fetched", report.failed.len()))),
        strategy: None,
    }
}

async fn sleep_for(wait: Duration) {
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

pub(crate) fn log_field(platform: &str, name: &str, outcome: &FieldOutcome) {
    if outcome.success {
        info!("[{}填表] {} 已填写", platform, name);
    } else {
        warn!(
            "[{}填表] {} 填写失败：{}",
            platform,
            name,
            outcome.error.as_deref().unwrap_or("unknown")
        );
    }
}

/// Pre-generated captions for video platforms.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoMetadata {
    title: Option<String>,
    description: Option<String>,
    tags: Option<TagsInput>,
}

pub fn video_metadata_endpoint(content_id: &str, platform: &str) -> String {
    format!(
        "/api/articles/{}/video-metadata?platform={}",
        content_id, platform
    )
}

/// Content for manual pasting, for pages where injection is not possible.
pub async fn copy_article_content<P: Plugin + ?Sized>(
    plugin: &P,
    source: &dyn ContentSource,
    relay: &dyn Relay,
    content_id: &str,
) -> CopyResult {
    let config = plugin.config();
    let failed = |message: String| CopyResult {
        success: false,
        content: String::new(),
        format: "text".into(),
        message,
    };

    let mut payload = match source.fetch_payload(content_id, &config.id).await {
        Ok(payload) => payload,
        Err(e) => return failed(FillError::NoData(e.to_string()).to_string()),
    };

    if config.content_type == ContentType::Video {
        let endpoint = video_metadata_endpoint(content_id, &config.id);
        match relay.api_request(&endpoint, "GET", None).await {
            Ok(value) => match serde_json::from_value::<VideoMetadata>(value) {
                Ok(meta) => {
                    payload.video_title = meta.title.or(payload.video_title);
                    payload.video_description = meta.description.or(payload.video_description);
                    payload.tags = meta.tags.or(payload.tags);
                }
                Err(e) => debug!("[{}复制] 视频元数据格式无法识别：{}", config.id, e),
            },
            Err(RelayError::ContextInvalidated) => {
                return failed(FillError::ExtensionContextInvalidated.to_string())
            }
            Err(e) => debug!("[{}复制] 无视频元数据：{}", config.id, e),
        }
    }

    let fields = plugin.compose(&payload);
    let (content, format) = match config.content_type {
        ContentType::Html => {
            let body = fields.body.map(|b| b.html()).unwrap_or_default();
            let title = fields
                .title
                .map(|t| format!("<h1>{}</h1>", escape_html(&t)))
                .unwrap_or_default();
            (format!("{}{}", title, body), "html")
        }
        ContentType::Markdown => {
            let body = fields.body.map(|b| b.plain()).unwrap_or_default();
            let text = match fields.title {
                Some(title) => format!("# {}\n\n{}", title, body),
                None => body,
            };
            (text, "markdown")
        }
        ContentType::Text => {
            let body = fields.body.map(|b| b.plain()).unwrap_or_default();
            let text = match fields.title {
                Some(title) => format!("{}\n\n{}", title, body),
                None => body,
            };
            (text, "text")
        }
        ContentType::Video => {
            let mut parts: Vec<String> = Vec::new();
            parts.extend(fields.title);
            parts.extend(fields.description);
            if !fields.inline_tags && !fields.tags.is_empty() {
                parts.push(format_tags(&fields.tags, TagStyle::Hashtag));
            }
            (parts.join("\n\n"), "text")
        }
    };

    if content.trim().is_empty() {
        return failed(FillError::NoData("article has no content".into()).to_string());
    }
    let message = format!("已复制 {} 个字符，请粘贴到{}", content.chars().count(), config.name);
    CopyResult {
        success: true,
        content,
        format: format.into(),
        message,
    }
}
