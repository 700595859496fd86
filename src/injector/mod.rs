//! Content injector.
//!
//! Picks a strategy table from the target element's editing technology, runs
//! strategies in order and verifies each one by reading the element back.
//! The first strategy whose result reads back as the intended text wins.

pub mod strategy;

use crate::dom::{Dom, DomError, DomEvent, EditCommand, NodeId, NodeInfo};
use crate::text::{collapse_nbsp, sanitize_html, Content};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;
use strategy::{strategies, EmitEvent, Step, Strategy};

/// Characters compared by the read-back check.
const VERIFY_PREFIX_CHARS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameworkEditor {
    DraftJs,
    ProseMirror,
    CodeMirror,
    Lexical,
    Slate,
    Quill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorKind {
    NativeControl,
    ContentEditable,
    Framework(FrameworkEditor),
}

const CLASS_FINGERPRINTS: &[(&str, FrameworkEditor)] = &[
    ("public-DraftEditor-content", FrameworkEditor::DraftJs),
    ("DraftEditor-root", FrameworkEditor::DraftJs),
    ("ProseMirror", FrameworkEditor::ProseMirror),
    ("CodeMirror", FrameworkEditor::CodeMirror),
    ("CodeMirror-code", FrameworkEditor::CodeMirror),
    ("cm-content", FrameworkEditor::CodeMirror),
    ("ql-editor", FrameworkEditor::Quill),
];

const ATTRIBUTE_FINGERPRINTS: &[(&str, FrameworkEditor)] = &[
    ("data-contents", FrameworkEditor::DraftJs),
    ("data-lexical-editor", FrameworkEditor::Lexical),
    ("data-slate-editor", FrameworkEditor::Slate),
];

/// Infers how an element is edited from its tag, classes and attributes.
pub fn detect_kind(info: &NodeInfo) -> EditorKind {
    if info.is_native_control() {
        return EditorKind::NativeControl;
    }
    for (class, editor) in CLASS_FINGERPRINTS {
        if info.has_class(class) {
            return EditorKind::Framework(*editor);
        }
    }
    for (attr, editor) in ATTRIBUTE_FINGERPRINTS {
        if info.attr(attr).is_some() {
            return EditorKind::Framework(*editor);
        }
    }
    EditorKind::ContentEditable
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectOutcome {
    pub success: bool,
    pub kind: EditorKind,
    /// Strategy that verified, if any.
    pub strategy: Option<&'static str>,
    pub tried: Vec<&'static str>,
    pub error: Option<String>,
}

pub struct Injector<'a> {
    dom: &'a dyn Dom,
    yield_for: Duration,
}

impl<'a> Injector<'a> {
    pub fn new(dom: &'a dyn Dom, yield_for: Duration) -> Self {
        Self { dom, yield_for }
    }

    /// Writes `content` into `node`. Never fails: problems are reported in
    /// the outcome so the caller can carry on with other fields.
    pub async fn inject(&self, node: NodeId, content: &Content) -> InjectOutcome {
        let info = match self.dom.describe(node).await {
            Ok(info) => info,
            Err(e) => {
                return InjectOutcome {
                    success: false,
                    kind: EditorKind::ContentEditable,
                    strategy: None,
                    tried: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        let kind = detect_kind(&info);
        self.inject_as(node, kind, content).await
    }

    pub async fn inject_as(&self, node: NodeId, kind: EditorKind, content: &Content) -> InjectOutcome {
        let expected = fingerprint(&content.plain());
        let mut tried = Vec::new();
        let mut last_error = None;

        for strategy in strategies(kind) {
            tried.push(strategy.name);
            match self.run(node, strategy, content).await {
                Ok(()) => {}
                Err(DomError::Detached(id)) => {
                    warn!("[inject] {:?} detached during {}", id, strategy.name);
                    last_error = Some(DomError::Detached(id).to_string());
                    break;
                }
                Err(e) => {
                    debug!("[inject] {} raised {}", strategy.name, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            }

            match self.verify(node, &expected).await {
                Ok(true) => {
                    info!("[inject] {:?} filled via {} ({:?})", node, strategy.name, kind);
                    return InjectOutcome {
                        success: true,
                        kind,
                        strategy: Some(strategy.name),
                        tried,
                        error: None,
                    };
                }
                Ok(false) => {
                    debug!("[inject] {} did not stick, trying next strategy", strategy.name);
                    last_error = Some(format!("{} did not change the editor", strategy.name));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if matches!(e, DomError::Detached(_)) {
                        break;
                    }
                }
            }
        }

        warn!("[inject] {:?} not filled, tried {:?}", node, tried);
        InjectOutcome {
            success: false,
            kind,
            strategy: None,
            tried,
            error: last_error,
        }
    }

    async fn run(&self, node: NodeId, strategy: &Strategy, content: &Content) -> Result<(), DomError> {
        for step in strategy.steps {
            match step {
                Step::Focus => self.dom.focus(node).await?,
                Step::SelectAll => self.dom.select_all(node).await?,
                Step::SetValue => self.dom.set_value(node, &content.plain()).await?,
                Step::ClearContent => self.dom.set_inner_html(node, "").await?,
                Step::SetHtml => {
                    self.dom
                        .set_inner_html(node, &sanitize_html(&content.html()))
                        .await?
                }
                Step::Paste => {
                    let event = DomEvent::Paste {
                        text: content.plain(),
                        html: content.is_html().then(|| sanitize_html(&content.html())),
                    };
                    let outcome = self.dom.dispatch(node, &event).await?;
                    if !outcome.default_prevented {
                        debug!("[inject] paste on {:?} was not handled by the page", node);
                    }
                }
                Step::ExecInsert => {
                    let command = match content {
                        Content::Html(html) => EditCommand::InsertHtml(sanitize_html(html)),
                        Content::Text(text) => EditCommand::InsertText(text.clone()),
                    };
                    if !self.dom.exec_command(node, &command).await? {
                        debug!("[inject] execCommand('{}') rejected", command.name());
                    }
                }
                Step::AssignText => self.dom.set_text_content(node, &content.plain()).await?,
                Step::Emit(e) => {
                    let event = match e {
                        EmitEvent::Input => DomEvent::Input { data: None },
                        EmitEvent::Change => DomEvent::Change,
                        EmitEvent::Blur => DomEvent::Blur,
                    };
                    self.dom.dispatch(node, &event).await?;
                }
                Step::Yield => self.pause().await,
            }
        }
        Ok(())
    }

    async fn verify(&self, node: NodeId, expected: &str) -> Result<bool, DomError> {
        if expected.is_empty() {
            return Ok(true);
        }
        let actual = self.dom.read_back(node).await?;
        Ok(strip_whitespace(&collapse_nbsp(&actual)).contains(expected))
    }

    /// Types `value` into a tag input and commits it with Enter. Returns
    /// whether the input took it, judged by the typed text having been
    /// cleared or replaced once Enter was handled.
    pub async fn commit_entry(&self, node: NodeId, value: &str) -> Result<bool, DomError> {
        self.dom.focus(node).await?;
        self.dom.set_value(node, value).await?;
        self.dom
            .dispatch(
                node,
                &DomEvent::Input {
                    data: Some(value.to_string()),
                },
            )
            .await?;
        self.pause().await;
        self.dom.dispatch(node, &DomEvent::enter()).await?;
        self.pause().await;
        let left = self.dom.read_back(node).await?;
        Ok(left.trim() != value.trim())
    }

    async fn pause(&self) {
        if !self.yield_for.is_zero() {
            tokio::time::sleep(self.yield_for).await;
        }
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// First non-whitespace characters of the intended text.
fn fingerprint(text: &str) -> String {
    strip_whitespace(&collapse_nbsp(text))
        .chars()
        .take(VERIFY_PREFIX_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{EditorBehavior, ElementSpec, MemoryDom};

    fn injector(dom: &MemoryDom) -> Injector<'_> {
        Injector::new(dom, Duration::ZERO)
    }

    #[tokio::test]
    async fn detects_editor_technology() {
        let dom = MemoryDom::new("https://e.example.com/");
        let doc = dom.document();
        let cases = [
            (ElementSpec::new("input"), EditorKind::NativeControl),
            (ElementSpec::new("textarea"), EditorKind::NativeControl),
            (ElementSpec::new("div").editable(), EditorKind::ContentEditable),
            (
                ElementSpec::new("div").editable().class("public-DraftEditor-content"),
                EditorKind::Framework(FrameworkEditor::DraftJs),
            ),
            (
                ElementSpec::new("div").editable().class("ProseMirror"),
                EditorKind::Framework(FrameworkEditor::ProseMirror),
            ),
            (
                ElementSpec::new("div").editable().attr("data-lexical-editor", "true"),
                EditorKind::Framework(FrameworkEditor::Lexical),
            ),
            (
                ElementSpec::new("div").class("CodeMirror"),
                EditorKind::Framework(FrameworkEditor::CodeMirror),
            ),
        ];
        for (spec, expected) in cases {
            let node = dom.append(doc, spec);
            let info = dom.describe(node).await.unwrap();
            assert_eq!(detect_kind(&info), expected, "{:?}", info.classes);
        }
    }

    #[tokio::test]
    async fn native_control_gets_value_and_event_sequence() {
        let dom = MemoryDom::new("https://e.example.com/");
        let input = dom.append(dom.document(), ElementSpec::new("input"));

        let outcome = injector(&dom)
            .inject(input, &Content::Text("Hello".into()))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.strategy, Some("native-value"));
        assert_eq!(dom.value_of(input), "Hello");
        assert_eq!(dom.event_names(input), vec!["focus", "input", "change", "blur"]);
    }

    #[tokio::test]
    async fn content_editable_receives_sanitized_html() {
        let dom = MemoryDom::new("https://e.example.com/");
        let body = dom.append(dom.document(), ElementSpec::new("div").editable());

        let outcome = injector(&dom)
            .inject(
                body,
                &Content::Html("<p onclick=\"x()\">Body text</p><script>bad()</script>".into()),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.strategy, Some("inner-html"));
        assert_eq!(dom.inner_html_of(body).as_deref(), Some("<p>Body text</p>"));
        assert_eq!(dom.event_names(body), vec!["focus", "input", "change", "blur"]);
    }

    #[tokio::test]
    async fn rejected_paste_falls_back_to_exec_command() {
        let dom = MemoryDom::new("https://e.example.com/");
        let draft = dom.append(
            dom.document(),
            ElementSpec::new("div")
                .editable()
                .class("public-DraftEditor-content"),
        );

        let outcome = injector(&dom)
            .inject(draft, &Content::Text("What is happening?".into()))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.tried, vec!["paste", "exec-command"]);
        assert_eq!(outcome.strategy, Some("exec-command"));
        assert_eq!(dom.commands(), vec![(draft, "insertText".to_string())]);
        assert_eq!(
            dom.event_names(draft),
            vec!["focus", "paste", "input", "change", "focus", "input", "change"]
        );
        assert_eq!(dom.text_of(draft), "What is happening?");
    }

    #[tokio::test]
    async fn accepted_paste_stops_at_first_strategy() {
        let dom = MemoryDom::new("https://e.example.com/");
        let pm = dom.append(
            dom.document(),
            ElementSpec::new("div")
                .editable()
                .class("ProseMirror")
                .behavior(EditorBehavior {
                    accepts_paste: true,
                    ..EditorBehavior::default()
                }),
        );

        let outcome = injector(&dom)
            .inject(pm, &Content::Html("<p>Hi <b>there</b></p>".into()))
            .await;

        assert_eq!(outcome.strategy, Some("paste"));
        assert!(dom.commands().is_empty());
        assert_eq!(dom.text_of(pm), "Hi there");
    }

    #[tokio::test]
    async fn last_resort_assigns_text() {
        let dom = MemoryDom::new("https://e.example.com/");
        let stubborn = dom.append(
            dom.document(),
            ElementSpec::new("div")
                .editable()
                .attr("data-slate-editor", "true")
                .behavior(EditorBehavior {
                    supports_exec_command: false,
                    ..EditorBehavior::default()
                }),
        );

        let outcome = injector(&dom)
            .inject(stubborn, &Content::Text("fallback".into()))
            .await;

        assert_eq!(outcome.strategy, Some("assign-text"));
        assert_eq!(outcome.tried, vec!["paste", "exec-command", "assign-text"]);
        assert_eq!(dom.text_of(stubborn), "fallback");
    }

    #[tokio::test]
    async fn detached_target_fails_without_panicking() {
        let dom = MemoryDom::new("https://e.example.com/");
        let input = dom.append(dom.document(), ElementSpec::new("input"));
        dom.remove(input);

        let outcome = injector(&dom).inject(input, &Content::Text("x".into())).await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no longer attached"));
    }

    #[tokio::test]
    async fn commit_entry_turns_value_into_chip() {
        let dom = MemoryDom::new("https://e.example.com/");
        let tags = dom.append(
            dom.document(),
            ElementSpec::new("input").behavior(EditorBehavior {
                commits_on_enter: true,
                ..EditorBehavior::default()
            }),
        );
        let inj = injector(&dom);

        assert!(inj.commit_entry(tags, "rust").await.unwrap());
        assert!(inj.commit_entry(tags, "tokio").await.unwrap());

        assert_eq!(dom.committed_of(tags), vec!["rust", "tokio"]);
        assert_eq!(dom.value_of(tags), "");
    }

    #[tokio::test]
    async fn enter_ignored_by_plain_input_is_not_a_commit() {
        let dom = MemoryDom::new("https://e.example.com/");
        let input = dom.append(dom.document(), ElementSpec::new("input"));

        assert!(!injector(&dom).commit_entry(input, "rust").await.unwrap());
        assert!(dom.committed_of(input).is_empty());
        assert_eq!(dom.value_of(input), "rust");
    }

    #[test]
    fn fingerprint_ignores_whitespace_and_nbsp() {
        assert_eq!(fingerprint("a\u{a0}b  c\n d"), "abcd");
        assert_eq!(fingerprint(&"x".repeat(40)).len(), VERIFY_PREFIX_CHARS);
    }
}
