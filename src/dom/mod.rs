//! Host page abstraction.
//!
//! Everything the fill engine does to a third-party editor goes through the
//! [`Dom`] trait: element lookup, the simulated input-event protocol, file
//! staging for upload widgets and the page-context `fetch`. Two backends exist:
//! [`crate::browser::cdp_dom::CdpDom`] drives a live Chrome tab, and
//! [`memory::MemoryDom`] is an in-memory page used by tests and dry runs.
//!
//! Node handles are only valid while the element stays attached. Third-party
//! editors remount nodes freely, so callers re-resolve handles after every
//! await instead of caching them.

pub mod memory;
pub mod selector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use selector::SelectorError;

/// Opaque handle to an element of the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

/// Where a query starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Document,
    /// The open shadow root attached to the given host element.
    ShadowOf(NodeId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Snapshot of an element, taken at the time of the call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeInfo {
    /// Lowercase tag name.
    pub tag: String,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub content_editable: bool,
    pub rect: Rect,
    /// False when the element or an ancestor is `display:none` / `visibility:hidden`.
    pub visible: bool,
    pub text: String,
    pub value: Option<String>,
    pub has_shadow_root: bool,
}

impl NodeInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Non-zero bounding box and not hidden by style.
    pub fn is_visible(&self) -> bool {
        self.visible && !self.rect.is_empty()
    }

    pub fn is_native_control(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !self.is_file_input(),
            _ => false,
        }
    }

    pub fn is_file_input(&self) -> bool {
        self.tag == "input"
            && self
                .attr("type")
                .map(|t| t.eq_ignore_ascii_case("file"))
                .unwrap_or(false)
    }
}

/// Events the engine synthesises on the host page.
///
/// The ordered list of events an injection strategy emits is the contract
/// with the page's editor framework, see [`crate::injector::strategy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomEvent {
    Focus,
    Input { data: Option<String> },
    Change,
    Blur,
    Paste { text: String, html: Option<String> },
    KeyDown { key: String },
    DragEnter,
    DragOver,
    Drop,
    Click,
}

impl DomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomEvent::Focus => "focus",
            DomEvent::Input { .. } => "input",
            DomEvent::Change => "change",
            DomEvent::Blur => "blur",
            DomEvent::Paste { .. } => "paste",
            DomEvent::KeyDown { .. } => "keydown",
            DomEvent::DragEnter => "dragenter",
            DomEvent::DragOver => "dragover",
            DomEvent::Drop => "drop",
            DomEvent::Click => "click",
        }
    }

    pub fn enter() -> Self {
        DomEvent::KeyDown {
            key: "Enter".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventOutcome {
    /// A page handler called `preventDefault()`.
    pub default_prevented: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    InsertText(String),
    InsertHtml(String),
}

impl EditCommand {
    /// Command name as understood by `document.execCommand`.
    pub fn name(&self) -> &'static str {
        match self {
            EditCommand::InsertText(_) => "insertText",
            EditCommand::InsertHtml(_) => "insertHTML",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            EditCommand::InsertText(s) | EditCommand::InsertHtml(s) => s,
        }
    }
}

/// A browser `File` to be synthesised inside the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Body of a page-context fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBytes {
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum DomError {
    #[error("node {0:?} is no longer attached to the page")]
    Detached(NodeId),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("page connection failed: {0}")]
    Transport(String),
    #[error("page fetch failed: {0}")]
    Fetch(String),
}

/// Operations the engine performs against the host page.
#[async_trait]
pub trait Dom: Send + Sync {
    async fn current_url(&self) -> Result<String, DomError>;

    /// All elements matching `selector` inside `scope`, in document order.
    /// Does not descend into nested shadow roots.
    async fn query_all(&self, scope: Scope, selector: &str) -> Result<Vec<NodeId>, DomError>;

    /// Elements inside `scope` that carry an open shadow root.
    async fn shadow_hosts(&self, scope: Scope) -> Result<Vec<NodeId>, DomError>;

    async fn describe(&self, node: NodeId) -> Result<NodeInfo, DomError>;

    async fn focus(&self, node: NodeId) -> Result<(), DomError>;

    async fn click(&self, node: NodeId) -> Result<(), DomError>;

    async fn select_all(&self, node: NodeId) -> Result<(), DomError>;

    /// Assigns `.value` through the native prototype setter.
    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError>;

    async fn set_inner_html(&self, node: NodeId, html: &str) -> Result<(), DomError>;

    async fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError>;

    /// Runs `document.execCommand` with `node` focused. Returns whether the
    /// page reported the command as handled.
    async fn exec_command(&self, node: NodeId, command: &EditCommand) -> Result<bool, DomError>;

    async fn dispatch(&self, node: NodeId, event: &DomEvent) -> Result<EventOutcome, DomError>;

    /// Current value for form controls, rendered text otherwise.
    async fn read_back(&self, node: NodeId) -> Result<String, DomError>;

    /// Builds a `DataTransfer` holding `files`; later drag events and
    /// [`Dom::assign_staged_files`] use it. Returns the number of files staged.
    async fn stage_files(&self, files: &[SyntheticFile]) -> Result<usize, DomError>;

    /// Assigns the staged `FileList` to a file input.
    async fn assign_staged_files(&self, input: NodeId) -> Result<usize, DomError>;

    /// `fetch(url, {mode: 'cors', credentials: 'omit'})` from the page context.
    async fn fetch_direct(&self, url: &str) -> Result<FetchedBytes, DomError>;
}
