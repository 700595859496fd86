//! Fills fed from the SQLite article store.

use multi_platform_filler::database::queries::{self, ImportBundle};
use multi_platform_filler::database::{Database, LocalContentSource};
use multi_platform_filler::dom::memory::{EditorBehavior, ElementSpec, MemoryDom};
use multi_platform_filler::dom::NodeId;
use multi_platform_filler::platforms::FillStatus;
use multi_platform_filler::relay::NoRelay;
use multi_platform_filler::settings::Timing;
use multi_platform_filler::{FillError, FillSession, PluginRegistry};
use std::sync::Arc;

const BUNDLE: &str = r#"{
    "articles": [{
        "id": "post-7",
        "title": "Generic title",
        "content": "<p>Body text</p>",
        "tags": ["rust", "sqlite"]
    }],
    "variants": [{
        "articleId": "post-7",
        "platform": "zhihu",
        "title": "知乎专用标题"
    }],
    "presets": {
        "zhihu": {"footerContent": "<p>欢迎关注</p>"}
    }
}"#;

fn imported_store() -> Arc<Database> {
    let db = Database::in_memory().unwrap();
    let bundle: ImportBundle = serde_json::from_str(BUNDLE).unwrap();
    {
        let mut conn = db.conn.lock().unwrap();
        assert_eq!(queries::import_bundle(&mut conn, &bundle).unwrap(), 3);
    }
    Arc::new(db)
}

fn zhihu_page() -> (MemoryDom, NodeId, NodeId) {
    let dom = MemoryDom::new("https://zhuanlan.zhihu.com/write");
    let doc = dom.document();
    let title = dom.append(doc, ElementSpec::new("textarea").attr("placeholder", "请输入标题"));
    let body = dom.append(
        doc,
        ElementSpec::new("div")
            .class("public-DraftEditor-content")
            .editable()
            .behavior(EditorBehavior {
                accepts_paste: true,
                ..EditorBehavior::default()
            }),
    );
    (dom, title, body)
}

#[tokio::test(start_paused = true)]
async fn imported_variant_and_preset_reach_the_editor() {
    let source = LocalContentSource::new(imported_store());
    let (dom, title, body) = zhihu_page();
    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());

    let result = session
        .fill_from_source(&source, "post-7", None)
        .await
        .unwrap();

    assert_eq!(result.status, FillStatus::Done, "{:?}", result.fields);
    assert_eq!(dom.value_of(title), "知乎专用标题");
    let text = dom.text_of(body);
    assert!(text.contains("Body text"));
    assert!(text.contains("欢迎关注"));
}

#[tokio::test(start_paused = true)]
async fn unknown_article_is_no_data() {
    let source = LocalContentSource::new(imported_store());
    let (dom, _, _) = zhihu_page();
    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());

    let err = session
        .fill_from_source(&source, "missing", None)
        .await
        .unwrap_err();

    assert!(matches!(err, FillError::NoData(_)), "{:?}", err);
    assert!(dom.events().is_empty());
}

#[tokio::test]
async fn copy_formats_html_for_manual_paste() {
    let source = LocalContentSource::new(imported_store());
    let (dom, _, _) = zhihu_page();
    let registry = PluginRegistry::with_builtins();
    let session = FillSession::new(&registry, &dom, &NoRelay, Timing::default());

    let copied = session.copy(&source, "post-7", Some("zhihu")).await.unwrap();

    assert!(copied.success);
    assert_eq!(copied.format, "html");
    assert!(copied.content.starts_with("<h1>知乎专用标题</h1>"));
    assert!(copied.content.ends_with("<p>欢迎关注</p>"));
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("content.db");
    {
        let db = Database::new(&path).unwrap();
        let bundle: ImportBundle = serde_json::from_str(BUNDLE).unwrap();
        let mut conn = db.conn.lock().unwrap();
        queries::import_bundle(&mut conn, &bundle).unwrap();
    }

    let db = Database::new(&path).unwrap();
    let conn = db.conn.lock().unwrap();
    let payload = queries::load_payload(&conn, "post-7", "weibo").unwrap().unwrap();
    assert_eq!(payload.title.as_deref(), Some("Generic title"));
    assert!(payload.preset.is_none());
}
