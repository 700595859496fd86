//! End-to-end fills against the in-memory page, one scenario per editor shape.

use multi_platform_filler::dom::memory::{EditorBehavior, ElementSpec, MemoryDom};
use async_trait::async_trait;
use multi_platform_filler::dom::{
    Dom, DomError, DomEvent, EditCommand, EventOutcome, FetchedBytes, NodeId, NodeInfo, Scope,
    SyntheticFile,
};
use multi_platform_filler::images::ImageRef;
use multi_platform_filler::payload::Preset;
use multi_platform_filler::platforms::config::PlatformConfig;
use multi_platform_filler::platforms::FillStatus;
use multi_platform_filler::relay::{spawn_relay, NoRelay, RelayWorker};
use multi_platform_filler::session::build_registry;
use multi_platform_filler::settings::Timing;
use multi_platform_filler::text::TagsInput;
use multi_platform_filler::{FillError, FillPayload, FillSession, PluginRegistry, Settings};
use std::time::Duration;
use tokio::time::Instant;

const WECHAT_URL: &str = "https://mp.weixin.qq.com/cgi-bin/appmsg?t=media/appmsg_edit_v2&action=edit&type=77";

fn accepts_paste() -> EditorBehavior {
    EditorBehavior {
        accepts_paste: true,
        ..EditorBehavior::default()
    }
}

struct WechatPage {
    dom: MemoryDom,
    title: NodeId,
    body: NodeId,
    digest: NodeId,
}

fn wechat_page(with_author: bool) -> WechatPage {
    let dom = MemoryDom::new(WECHAT_URL);
    let doc = dom.document();
    let title = dom.append(doc, ElementSpec::new("textarea").id("title"));
    let body = dom.append(
        doc,
        ElementSpec::new("div").class("ProseMirror").editable().rect(680.0, 400.0),
    );
    let digest = dom.append(doc, ElementSpec::new("textarea").id("js_description"));
    if with_author {
        dom.append(doc, ElementSpec::new("input").id("author"));
    }
    WechatPage {
        dom,
        title,
        body,
        digest,
    }
}

fn article(title: &str) -> FillPayload {
    FillPayload {
        title: Some(title.into()),
        content: Some("<p>Hello <b>world</b></p>".into()),
        digest: Some("A short summary".into()),
        preset: Some(Preset {
            author: Some("Ann".into()),
            ..Preset::default()
        }),
        ..FillPayload::default()
    }
}

#[tokio::test(start_paused = true)]
async fn zhihu_body_goes_through_paste() {
    let dom = MemoryDom::new("https://zhuanlan.zhihu.com/write");
    let doc = dom.document();
    let title = dom.append(
        doc,
        ElementSpec::new("textarea").attr("placeholder", "请输入标题（最多 100 个字）"),
    );
    let root = dom.append(doc, ElementSpec::new("div").class("DraftEditor-root"));
    let body = dom.append(
        root,
        ElementSpec::new("div")
            .class("public-DraftEditor-content")
            .editable()
            .behavior(accepts_paste()),
    );

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());
    let payload = FillPayload {
        title: Some("Ownership, explained".into()),
        content: Some("<p>Borrowing rules in <em>one</em> page.</p>".into()),
        ..FillPayload::default()
    };
    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.platform, "zhihu");
    assert_eq!(result.status, FillStatus::Done);
    assert!(result.success);
    assert_eq!(dom.value_of(title), "Ownership, explained");
    assert_eq!(result.field("title").unwrap().strategy.as_deref(), Some("native-value"));
    assert_eq!(result.field("content").unwrap().strategy.as_deref(), Some("paste"));
    assert!(dom.text_of(body).contains("Borrowing rules in one page."));
    assert!(dom.event_names(body).contains(&"paste"));
}

#[tokio::test(start_paused = true)]
async fn wechat_fills_every_field_and_drops_images() {
    let page = wechat_page(true);
    let dom = &page.dom;
    dom.allow_fetch("https://cdn.example.com/cover.png", "image/png", b"cover");
    dom.allow_fetch("https://cdn.example.com/1.png", "image/png", b"one");

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, dom, &NoRelay, Timing::default());
    let mut payload = article(&"长".repeat(80));
    payload.cover_image = Some("https://cdn.example.com/cover.png".into());
    payload.images = vec![ImageRef::Url("https://cdn.example.com/1.png".into())];

    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.platform, "wechat");
    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert_eq!(dom.value_of(page.title).chars().count(), 64);
    assert_eq!(
        result.field("content").unwrap().strategy.as_deref(),
        Some("exec-command")
    );
    assert!(dom.text_of(page.body).contains("Hello world"));
    assert_eq!(dom.value_of(page.digest), "A short summary");
    assert_eq!(result.field("author").unwrap().value.as_deref(), Some("Ann"));

    let images = result.images.as_ref().unwrap();
    assert_eq!((images.requested, images.uploaded), (2, 2));
    assert_eq!(dom.files_of(page.body).len(), 2);
    let drag: Vec<_> = dom
        .event_names(page.body)
        .into_iter()
        .filter(|e| e.starts_with("drag") || *e == "drop")
        .collect();
    assert_eq!(drag, vec!["dragenter", "dragover", "drop"]);
}

#[tokio::test(start_paused = true)]
async fn missing_field_and_unreachable_image_give_partial_failure() {
    let page = wechat_page(false);
    let dom = &page.dom;
    dom.allow_fetch("https://cdn.example.com/1.png", "image/png", b"one");

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, dom, &NoRelay, Timing::default());
    let mut payload = article("Weekly digest");
    payload.images = vec![
        ImageRef::Url("https://cdn.example.com/1.png".into()),
        ImageRef::Url("https://blocked.example.com/2.png".into()),
    ];

    let result = session.fill(Some("wechat"), &payload).await.unwrap();

    assert_eq!(result.status, FillStatus::PartialFailure);
    assert!(!result.success);
    assert!(result.field("title").unwrap().success);
    assert!(result.field("content").unwrap().success);
    assert!(!result.field("author").unwrap().success);

    let images = result.field("images").unwrap();
    assert!(!images.success);
    assert_eq!(images.value.as_deref(), Some("1/2"));
    let report = result.images.as_ref().unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].url, "https://blocked.example.com/2.png");
}

#[tokio::test(start_paused = true)]
async fn juejin_markdown_and_enter_committed_tags() {
    let dom = MemoryDom::new("https://juejin.cn/editor/drafts/7350");
    let doc = dom.document();
    dom.append(doc, ElementSpec::new("input").class("title-input"));
    let editor = dom.append(doc, ElementSpec::new("div").class("bytemd-editor"));
    let code = dom.append(editor, ElementSpec::new("div").class("CodeMirror").editable());
    let picker = dom.append(doc, ElementSpec::new("div").class("tag-input"));
    let tags = dom.append(
        picker,
        ElementSpec::new("input").behavior(EditorBehavior {
            commits_on_enter: true,
            ..EditorBehavior::default()
        }),
    );

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());
    let payload = FillPayload {
        title: Some("Async Rust in practice".into()),
        content: Some("# Intro\n\nSome *markdown* text.".into()),
        tags: Some(TagsInput::Text("rust, async, cdp, extra".into())),
        ..FillPayload::default()
    };
    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert_eq!(dom.committed_of(tags), vec!["rust", "async", "cdp"]);
    let tag_field = result.field("tags").unwrap();
    assert_eq!(tag_field.value.as_deref(), Some("3/3"));
    assert_eq!(tag_field.strategy.as_deref(), Some("enter-separated"));

    assert_eq!(dom.text_of(code), "# Intro\n\nSome *markdown* text.");
    assert!(dom
        .commands()
        .iter()
        .any(|(node, name)| *node == code && name == "insertText"));
}

#[tokio::test(start_paused = true)]
async fn tag_input_that_ignores_enter_fails_the_tags_field() {
    let dom = MemoryDom::new("https://juejin.cn/editor/drafts/7351");
    let doc = dom.document();
    dom.append(doc, ElementSpec::new("input").class("title-input"));
    let editor = dom.append(doc, ElementSpec::new("div").class("bytemd-editor"));
    dom.append(editor, ElementSpec::new("div").class("CodeMirror").editable());
    let picker = dom.append(doc, ElementSpec::new("div").class("tag-input"));
    let tags = dom.append(picker, ElementSpec::new("input"));

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());
    let payload = FillPayload {
        title: Some("Async Rust in practice".into()),
        content: Some("Body".into()),
        tags: Some(TagsInput::Text("rust, async".into())),
        ..FillPayload::default()
    };
    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.status, FillStatus::PartialFailure);
    let tag_field = result.field("tags").unwrap();
    assert!(!tag_field.success);
    assert_eq!(tag_field.value.as_deref(), Some("0/2"));
    assert!(tag_field.error.as_deref().unwrap().contains("async"));
    assert!(dom.committed_of(tags).is_empty());
}

#[tokio::test(start_paused = true)]
async fn x_post_carries_title_and_hashtags_in_one_box() {
    let dom = MemoryDom::new("https://x.com/compose/post");
    let textbox = dom.append(
        dom.document(),
        ElementSpec::new("div")
            .attr("data-testid", "tweetTextarea_0")
            .attr("role", "textbox")
            .class("public-DraftEditor-content")
            .editable()
            .behavior(accepts_paste()),
    );

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());
    let payload = FillPayload {
        title: Some("Launch".into()),
        content: Some("<p>We shipped it.</p>".into()),
        tags: Some(TagsInput::List(vec!["rust".into(), "#tokio".into()])),
        ..FillPayload::default()
    };
    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.platform, "x");
    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert!(result.field("title").is_none());
    assert_eq!(result.field("tags").unwrap().value.as_deref(), Some("#rust #tokio"));

    let text = dom.text_of(textbox);
    assert!(text.starts_with("Launch"));
    assert!(text.contains("We shipped it."));
    assert!(text.ends_with("#rust #tokio"));
}

struct YoutubePage {
    dom: MemoryDom,
    title: NodeId,
    description: NodeId,
    tags: NodeId,
}

fn youtube_page(dom: MemoryDom) -> YoutubePage {
    let dialog = dom.append(dom.document(), ElementSpec::new("ytcp-uploads-dialog"));
    let shadow = dom.attach_shadow(dialog);
    let title_box = dom.append(
        shadow,
        ElementSpec::new("ytcp-social-suggestions-textbox").id("title-textarea"),
    );
    let title = dom.append(title_box, ElementSpec::new("div").id("textbox").editable());
    let desc_box = dom.append(
        shadow,
        ElementSpec::new("ytcp-social-suggestions-textbox").id("description-textarea"),
    );
    let description = dom.append(desc_box, ElementSpec::new("div").id("textbox").editable());
    let tags_box = dom.append(shadow, ElementSpec::new("div").id("tags-container"));
    let tags = dom.append(tags_box, ElementSpec::new("input").id("text-input"));
    YoutubePage {
        dom,
        title,
        description,
        tags,
    }
}

fn video_payload() -> FillPayload {
    FillPayload {
        title: Some("Article title".into()),
        video_title: Some("Rust in 100 seconds".into()),
        video_description: Some("Everything about ownership.".into()),
        tags: Some(TagsInput::List(vec!["rust".into(), "programming".into()])),
        ..FillPayload::default()
    }
}

const STUDIO_URL: &str = "https://studio.youtube.com/video/abc123/edit";

#[tokio::test(start_paused = true)]
async fn youtube_fields_are_found_inside_shadow_roots() {
    let page = youtube_page(MemoryDom::new(STUDIO_URL));
    let dom = &page.dom;

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, dom, &NoRelay, Timing::default());
    let result = session.fill(None, &video_payload()).await.unwrap();

    assert_eq!(result.platform, "youtube");
    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert!(dom.text_of(page.title).contains("Rust in 100 seconds"));
    assert!(dom.text_of(page.description).contains("Everything about ownership."));
    assert_eq!(dom.value_of(page.tags), "rust,programming");
}

#[tokio::test(start_paused = true)]
async fn remounting_component_does_not_abort_the_fill() {
    let dom = MemoryDom::new(STUDIO_URL);
    let chip_bar = dom.append(dom.document(), ElementSpec::new("ytcp-chip-bar"));
    let chip_root = dom.attach_shadow(chip_bar);
    dom.append(chip_root, ElementSpec::new("input").id("text-input"));
    dom.remount_between_queries(chip_bar);
    let page = youtube_page(dom);

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &page.dom, &NoRelay, Timing::default());
    let result = session.fill(None, &video_payload()).await.unwrap();

    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert!(page.dom.text_of(page.title).contains("Rust in 100 seconds"));
    assert_eq!(page.dom.value_of(page.tags), "rust,programming");
}

/// Page whose upload widget lives in a frame the connection cannot reach.
struct UnreachableUploader {
    page: MemoryDom,
}

#[async_trait]
impl Dom for UnreachableUploader {
    async fn current_url(&self) -> Result<String, DomError> {
        self.page.current_url().await
    }
    async fn query_all(&self, scope: Scope, selector: &str) -> Result<Vec<NodeId>, DomError> {
        if selector.contains("uploader") {
            return Err(DomError::Transport("frame went away".into()));
        }
        self.page.query_all(scope, selector).await
    }
    async fn shadow_hosts(&self, scope: Scope) -> Result<Vec<NodeId>, DomError> {
        self.page.shadow_hosts(scope).await
    }
    async fn describe(&self, node: NodeId) -> Result<NodeInfo, DomError> {
        self.page.describe(node).await
    }
    async fn focus(&self, node: NodeId) -> Result<(), DomError> {
        self.page.focus(node).await
    }
    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        self.page.click(node).await
    }
    async fn select_all(&self, node: NodeId) -> Result<(), DomError> {
        self.page.select_all(node).await
    }
    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        self.page.set_value(node, value).await
    }
    async fn set_inner_html(&self, node: NodeId, html: &str) -> Result<(), DomError> {
        self.page.set_inner_html(node, html).await
    }
    async fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.page.set_text_content(node, text).await
    }
    async fn exec_command(&self, node: NodeId, command: &EditCommand) -> Result<bool, DomError> {
        self.page.exec_command(node, command).await
    }
    async fn dispatch(&self, node: NodeId, event: &DomEvent) -> Result<EventOutcome, DomError> {
        self.page.dispatch(node, event).await
    }
    async fn read_back(&self, node: NodeId) -> Result<String, DomError> {
        self.page.read_back(node).await
    }
    async fn stage_files(&self, files: &[SyntheticFile]) -> Result<usize, DomError> {
        self.page.stage_files(files).await
    }
    async fn assign_staged_files(&self, input: NodeId) -> Result<usize, DomError> {
        self.page.assign_staged_files(input).await
    }
    async fn fetch_direct(&self, url: &str) -> Result<FetchedBytes, DomError> {
        self.page.fetch_direct(url).await
    }
}

#[tokio::test(start_paused = true)]
async fn failed_upload_lookup_keeps_the_text_fields() {
    let gallery: PlatformConfig = serde_json::from_value(serde_json::json!({
        "id": "gallery",
        "name": "Gallery",
        "urlPatterns": ["https://gallery.example.com/*"],
        "contentType": "html",
        "features": ["title", "content", "images"],
        "selectors": {
            "title": "input.caption",
            "content": ".story",
            "uploadInput": "input.uploader"
        }
    }))
    .unwrap();
    let page = MemoryDom::new("https://gallery.example.com/new");
    let doc = page.document();
    let title = page.append(doc, ElementSpec::new("input").class("caption"));
    page.append(doc, ElementSpec::new("div").class("story").editable());
    let dom = UnreachableUploader { page };

    let mut settings = Settings::default();
    settings.platform_overrides.push(gallery);
    let registry = build_registry(&settings);
    let session = FillSession::new(&registry, &dom, &NoRelay, settings.timing.clone());
    let payload = FillPayload {
        images: vec![ImageRef::Url("data:image/png;base64,iVBORw0KGgo=".into())],
        ..article("Sunset")
    };
    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.status, FillStatus::PartialFailure, "{:?}", result.fields);
    assert!(result.field("title").unwrap().success);
    assert!(result.field("content").unwrap().success);
    let images = result.field("images").unwrap();
    assert!(!images.success);
    assert_eq!(images.value.as_deref(), Some("0/1"));
    assert!(images.error.as_deref().unwrap().contains("frame went away"));
    assert_eq!(dom.page.value_of(title), "Sunset");
}

#[tokio::test(start_paused = true)]
async fn xiaohongshu_uploads_images_before_text() {
    let dom = MemoryDom::new("https://creator.xiaohongshu.com/publish/publish?source=official");
    let doc = dom.document();
    let tab = dom.append(doc, ElementSpec::new("div").attr("data-tab", "image"));
    let upload = dom.append(
        doc,
        ElementSpec::new("input")
            .class("upload-input")
            .attr("type", "file")
            .hidden(),
    );
    let title = dom.append(
        doc,
        ElementSpec::new("input").attr("placeholder", "填写标题会有更多赞哦"),
    );
    let body = dom.append(doc, ElementSpec::new("div").id("post-textarea").editable());

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());
    let payload = FillPayload {
        title: Some("周末去哪儿".into()),
        content: Some("<p>城市公园一日游</p>".into()),
        images: vec![ImageRef::Url("data:image/png;base64,iVBORw0KGgo=".into())],
        ..FillPayload::default()
    };
    let result = session.fill(None, &payload).await.unwrap();

    assert_eq!(result.platform, "xiaohongshu");
    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert_eq!(dom.files_of(upload).len(), 1);
    assert_eq!(dom.value_of(title), "周末去哪儿");
    assert!(dom.text_of(body).contains("城市公园一日游"));
    assert_eq!(dom.event_names(tab), vec!["click"]);

    let events = dom.events();
    let uploaded_at = events
        .iter()
        .position(|e| e.node == upload && e.event == DomEvent::Change)
        .unwrap();
    let first_title_event = events.iter().position(|e| e.node == title).unwrap();
    assert!(uploaded_at < first_title_event);
}

#[tokio::test(start_paused = true)]
async fn empty_page_reports_no_editor_after_retry() {
    let dom = MemoryDom::new("https://zhuanlan.zhihu.com/write");
    dom.append(dom.document(), ElementSpec::new("div").class("Loading"));

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());
    let started = Instant::now();
    let err = session
        .fill(Some("zhihu"), &article("Anything"))
        .await
        .unwrap_err();

    match err {
        FillError::NoEditorFound { platform, url } => {
            assert_eq!(platform, "zhihu");
            assert_eq!(url, "https://zhuanlan.zhihu.com/write");
        }
        other => panic!("unexpected error {:?}", other),
    }
    // init delay, two full waits and the retry pause
    assert!(started.elapsed() >= Duration::from_millis(1_000 + 10_000 + 2_000 + 10_000));
}

fn blog_override() -> PlatformConfig {
    serde_json::from_value(serde_json::json!({
        "id": "blog",
        "name": "Team blog",
        "urlPatterns": ["https://blog.example.com/*"],
        "contentType": "html",
        "selectors": {
            "title": "input.post-title",
            "content": [".post-body [contenteditable=\"true\"]", ".post-body"],
            "activateEditor": "button.start-writing"
        },
        "specialHandling": {
            "activateEditor": true,
            "retryOnFail": true,
            "maxWaitTimeMs": 1000,
            "retryDelayMs": 2000
        }
    }))
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn activation_reveals_editor_for_configured_platform() {
    let dom = MemoryDom::new("https://blog.example.com/new");
    let doc = dom.document();
    let start = dom.append(doc, ElementSpec::new("button").class("start-writing"));
    dom.reveal_on_click(start, doc, ElementSpec::new("input").class("post-title"));
    dom.reveal_on_click(start, doc, ElementSpec::new("div").class("post-body").editable());

    let mut settings = Settings::default();
    settings.platform_overrides.push(blog_override());
    let registry = build_registry(&settings);
    let session = FillSession::new(&registry, &dom, &NoRelay, settings.timing.clone());

    let result = session.fill(None, &article("Release 1.0")).await.unwrap();

    assert_eq!(result.platform, "blog");
    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert!(dom.event_names(start).contains(&"click"));
    assert!(result.field("author").is_none());
}

#[tokio::test(start_paused = true)]
async fn late_editor_is_found_on_retry() {
    let dom = MemoryDom::new("https://blog.example.com/new");
    let mut settings = Settings::default();
    settings.platform_overrides.push(blog_override());
    let registry = build_registry(&settings);
    let session = FillSession::new(&registry, &dom, &NoRelay, settings.timing.clone());

    let mount = async {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let doc = dom.document();
        dom.append(doc, ElementSpec::new("input").class("post-title"));
        dom.append(doc, ElementSpec::new("div").class("post-body").editable());
    };
    let payload = article("Late mount");
    let (result, ()) = tokio::join!(session.fill(Some("blog"), &payload), mount);

    let result = result.unwrap();
    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert_eq!(result.field("title").unwrap().value.as_deref(), Some("Late mount"));
}

#[tokio::test(start_paused = true)]
async fn closed_relay_aborts_the_fill() {
    let page = wechat_page(true);
    let (relay, handle) = spawn_relay(RelayWorker::new("http://127.0.0.1:9", None).unwrap());
    handle.shutdown().await;

    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &page.dom, &relay, Timing::default());
    let mut payload = article("Relay gone");
    payload.images = vec![ImageRef::Url("https://cdn.example.com/1.png".into())];

    let err = session.fill(Some("wechat"), &payload).await.unwrap_err();
    assert!(err.is_context_invalidated(), "{:?}", err);
}

#[tokio::test(start_paused = true)]
async fn empty_payload_is_rejected_before_touching_the_page() {
    let page = wechat_page(true);
    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &page.dom, &NoRelay, Timing::default());

    let err = session
        .fill(Some("wechat"), &FillPayload::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FillError::NoData(_)));
    assert!(page.dom.events().is_empty());
}
