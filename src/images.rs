//! Image acquisition and upload.
//!
//! URLs resolve to bytes through, in order: inline `data:` decoding, the
//! background relay, and a page-context fetch that only succeeds where the
//! image host allows CORS. Fetched images become synthetic `File`s that are
//! assigned to a file input and/or dropped onto an upload area.

use crate::dom::{Dom, DomEvent, NodeId, SyntheticFile};
use crate::error::FillError;
use crate::relay::{Relay, RelayError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An image as listed in a fill payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Url(String),
    Described {
        url: String,
        #[serde(default)]
        alt: Option<String>,
    },
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            ImageRef::Url(url) | ImageRef::Described { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decodes `data:[<mime>][;base64],<payload>`.
pub fn decode_data_url(url: &str) -> Result<Blob, String> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URL".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URL has no payload separator".to_string())?;
    let is_base64 = meta
        .split(';')
        .any(|part| part.eq_ignore_ascii_case("base64"));
    let mime = meta
        .split(';')
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("base64"))
        .unwrap_or("text/plain")
        .to_string();

    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(&compact)
            .or_else(|_| STANDARD_NO_PAD.decode(compact.trim_end_matches('=')))
            .map_err(|e| format!("invalid base64 payload: {}", e))?
    } else {
        percent_decode(payload)
    };
    Ok(Blob { mime, bytes })
}

fn percent_decode(input: &str) -> Vec<u8> {
    let raw = input.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/avif" => "avif",
        _ => "png",
    }
}

/// `image_<millis>_<n>.<ext>`; `n` is 1-based.
pub fn synthetic_name(index: usize, mime: &str) -> String {
    format!(
        "image_{}_{}.{}",
        chrono::Utc::now().timestamp_millis(),
        index + 1,
        extension_for(mime)
    )
}

/// Cover image first, then the payload images, without duplicates, capped
/// at `limit`.
pub fn collect_candidates(
    images: &[ImageRef],
    cover: Option<&str>,
    limit: Option<usize>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let all = cover.into_iter().chain(images.iter().map(ImageRef::url));
    for url in all {
        let url = url.trim();
        if url.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        if limit.map(|l| urls.len() >= l).unwrap_or(false) {
            info!("[images] image limit {:?} reached, skipping the rest", limit);
            break;
        }
        urls.push(url.to_string());
    }
    urls
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFailure {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub requested: usize,
    pub uploaded: usize,
    pub failed: Vec<ImageFailure>,
    /// Problems assigning the files to the page.
    pub error: Option<String>,
}

impl UploadReport {
    /// A batch that never reached the page.
    pub fn undelivered(requested: usize, error: impl Into<String>) -> Self {
        Self {
            requested,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.failed.is_empty()
    }
}

pub struct ImageClient<'a> {
    dom: &'a dyn Dom,
    relay: &'a dyn Relay,
    concurrency: usize,
}

impl<'a> ImageClient<'a> {
    pub fn new(dom: &'a dyn Dom, relay: &'a dyn Relay, concurrency: usize) -> Self {
        Self {
            dom,
            relay,
            concurrency: concurrency.max(1),
        }
    }

    /// `Ok(None)` when every source failed. Only an invalidated relay is an
    /// error, because every later image would fail the same way.
    pub async fn fetch_image_blob(&self, url: &str) -> Result<Option<Blob>, FillError> {
        Ok(self.acquire(url).await?.ok())
    }

    async fn acquire(&self, url: &str) -> Result<Result<Blob, String>, FillError> {
        if url.starts_with("data:") {
            return Ok(decode_data_url(url));
        }

        let relay_error = match self.relay.fetch_blob(url).await {
            Ok(data_url) => match decode_data_url(&data_url) {
                Ok(blob) => {
                    debug!("[images] {} via relay ({} bytes)", url, blob.len());
                    return Ok(Ok(blob));
                }
                Err(e) => format!("relay returned an unusable data URL: {}", e),
            },
            Err(RelayError::ContextInvalidated) => return Err(FillError::ExtensionContextInvalidated),
            Err(e) => e.to_string(),
        };
        debug!("[images] relay failed for {} ({}), trying direct fetch", url, relay_error);

        match self.dom.fetch_direct(url).await {
            Ok(fetched) => Ok(Ok(Blob {
                mime: fetched.mime,
                bytes: fetched.bytes,
            })),
            Err(e) => {
                let reason = format!("{}; direct: {}", relay_error, e);
                let failure = FillError::ImageFetchFailed {
                    url: url.to_string(),
                    reason: reason.clone(),
                };
                warn!("[images] {}", failure);
                Ok(Err(reason))
            }
        }
    }

    /// Fetches `urls` with bounded concurrency, keeping input order.
    pub async fn fetch_all(
        &self,
        urls: &[String],
    ) -> Result<(Vec<(String, Blob)>, Vec<ImageFailure>), FillError> {
        let results: Vec<(String, Result<Result<Blob, String>, FillError>)> = stream::iter(urls.iter().cloned())
            .map(|url: String| {
                async move {
                    let result = self.acquire(&url).await;
                    (url, result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut blobs = Vec::new();
        let mut failed = Vec::new();
        for (url, result) in results {
            match result? {
                Ok(blob) => blobs.push((url, blob)),
                Err(reason) => failed.push(ImageFailure { url, reason }),
            }
        }
        Ok((blobs, failed))
    }

    /// Fetches every image, then hands the whole batch to the page at once:
    /// assigned to `input` with a `change` event, and dropped onto
    /// `drop_zone` for widgets that only listen for drops.
    pub async fn upload_batch(
        &self,
        urls: &[String],
        input: Option<NodeId>,
        drop_zone: Option<NodeId>,
    ) -> Result<UploadReport, FillError> {
        let mut report = UploadReport {
            requested: urls.len(),
            ..UploadReport::default()
        };
        if urls.is_empty() {
            return Ok(report);
        }

        let (blobs, failed) = self.fetch_all(urls).await?;
        report.failed = failed;
        if blobs.is_empty() {
            warn!("[images] none of {} images could be fetched", urls.len());
            return Ok(report);
        }

        let files: Vec<SyntheticFile> = blobs
            .into_iter()
            .enumerate()
            .map(|(i, (_, blob))| SyntheticFile {
                name: synthetic_name(i, &blob.mime),
                mime: blob.mime,
                bytes: blob.bytes,
            })
            .collect();

        if input.is_none() && drop_zone.is_none() {
            report.error = Some("no upload input or drop area on the page".into());
            return Ok(report);
        }

        if let Err(e) = self.deliver(&files, input, drop_zone, &mut report).await {
            warn!("[images] upload failed: {}", e);
            report.error = Some(e.to_string());
        }
        info!(
            "[images] uploaded {}/{} images",
            report.uploaded, report.requested
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        files: &[SyntheticFile],
        input: Option<NodeId>,
        drop_zone: Option<NodeId>,
        report: &mut UploadReport,
    ) -> Result<(), crate::dom::DomError> {
        let staged = self.dom.stage_files(files).await?;
        if let Some(input) = input {
            let assigned = self.dom.assign_staged_files(input).await?;
            self.dom.dispatch(input, &DomEvent::Change).await?;
            report.uploaded = assigned;
        }
        if let Some(zone) = drop_zone {
            for event in [DomEvent::DragEnter, DomEvent::DragOver, DomEvent::Drop] {
                self.dom.dispatch(zone, &event).await?;
            }
            report.uploaded = report.uploaded.max(staged);
        }
        Ok(())
    }
}
