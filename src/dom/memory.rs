//! In-memory host page.
//!
//! A small element arena with open shadow roots, visibility, and an event log.
//! Editor behaviour is configured per element through [`EditorBehavior`] so a
//! test can model e.g. a Draft.js box that ignores synthetic paste events.

use super::selector::{ElementLike, SelectorList};
use super::{
    Dom, DomError, DomEvent, EditCommand, EventOutcome, FetchedBytes, NodeId, NodeInfo, Rect,
    Scope, SyntheticFile,
};
use crate::text::html_to_text;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

const DOCUMENT: usize = 0;

/// How an element reacts to the engine's synthetic input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorBehavior {
    /// A framework handler consumes synthetic `paste` events and inserts the
    /// clipboard payload. Browsers ignore untrusted paste events otherwise.
    pub accepts_paste: bool,
    pub supports_exec_command: bool,
    /// Tag inputs that turn their value into a chip on Enter.
    pub commits_on_enter: bool,
}

impl Default for EditorBehavior {
    fn default() -> Self {
        Self {
            accepts_paste: false,
            supports_exec_command: true,
            commits_on_enter: false,
        }
    }
}

/// Declarative description of an element to append.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    rect: Rect,
    hidden: bool,
    behavior: EditorBehavior,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            rect: Rect::new(0.0, 0.0, 320.0, 32.0),
            hidden: false,
            behavior: EditorBehavior::default(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(mut self, class: &str) -> Self {
        let merged = match self.attrs.get("class") {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.attrs.insert("class".into(), merged);
        self
    }

    pub fn editable(self) -> Self {
        self.attr("contenteditable", "true")
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn rect(mut self, width: f64, height: f64) -> Self {
        self.rect = Rect::new(0.0, 0.0, width, height);
        self
    }

    /// Styled `display:none`.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn behavior(mut self, behavior: EditorBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

/// One dispatched event, as seen by the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub node: NodeId,
    pub event: DomEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Document,
    Element,
    ShadowRoot,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    tag: String,
    attrs: BTreeMap<String, String>,
    parent: Option<usize>,
    /// Host element, for shadow roots.
    host: Option<usize>,
    children: Vec<usize>,
    shadow: Option<usize>,
    text: String,
    html: Option<String>,
    value: String,
    rect: Rect,
    hidden: bool,
    behavior: EditorBehavior,
    files: Vec<String>,
    committed: Vec<String>,
    removed: bool,
}

impl Node {
    fn bare(kind: NodeKind) -> Self {
        Self {
            kind,
            tag: String::new(),
            attrs: BTreeMap::new(),
            parent: None,
            host: None,
            children: Vec::new(),
            shadow: None,
            text: String::new(),
            html: None,
            value: String::new(),
            rect: Rect::default(),
            hidden: false,
            behavior: EditorBehavior::default(),
            files: Vec::new(),
            committed: Vec::new(),
            removed: false,
        }
    }

    fn is_form_control(&self) -> bool {
        self.tag == "input" || self.tag == "textarea"
    }

    fn is_content_editable(&self) -> bool {
        matches!(
            self.attrs.get("contenteditable").map(String::as_str),
            Some("true") | Some("") | Some("plaintext-only")
        )
    }
}

#[derive(Debug, Default)]
struct State {
    url: String,
    nodes: Vec<Node>,
    events: Vec<RecordedEvent>,
    commands: Vec<(NodeId, String)>,
    staged: Vec<SyntheticFile>,
    reachable: HashMap<String, FetchedBytes>,
    /// Elements appended under a parent when a trigger element is clicked.
    on_click: HashMap<usize, Vec<(usize, ElementSpec)>>,
    /// Hosts still listed by `shadow_hosts` whose roots are gone by the time
    /// anything queries inside them.
    remounting: HashSet<usize>,
}

impl State {
    fn element(&self, node: NodeId) -> Result<usize, DomError> {
        let index = node.0 as usize;
        match self.nodes.get(index) {
            Some(n) if n.kind == NodeKind::Element && self.is_attached(index) => Ok(index),
            _ => Err(DomError::Detached(node)),
        }
    }

    fn is_attached(&self, mut index: usize) -> bool {
        loop {
            let node = &self.nodes[index];
            if node.removed {
                return false;
            }
            if index == DOCUMENT {
                return true;
            }
            match node.parent.or(node.host) {
                Some(next) => index = next,
                None => return false,
            }
        }
    }

    fn scope_root(&self, scope: Scope) -> Result<Option<usize>, DomError> {
        match scope {
            Scope::Document => Ok(Some(DOCUMENT)),
            Scope::ShadowOf(host) => {
                let index = self.element(host)?;
                if self.remounting.contains(&index) {
                    return Err(DomError::Detached(host));
                }
                Ok(self.nodes[index].shadow)
            }
        }
    }

    /// Elements below `root` in document order, not crossing shadow roots.
    fn descendants(&self, root: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.nodes[root].children.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.removed {
                continue;
            }
            out.push(index);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    fn text_of(&self, index: usize) -> String {
        let node = &self.nodes[index];
        if let Some(html) = &node.html {
            return html_to_text(html);
        }
        let mut text = node.text.clone();
        for &child in &node.children {
            if self.nodes[child].removed {
                continue;
            }
            text.push_str(&self.text_of(child));
        }
        text
    }

    fn visible(&self, mut index: usize) -> bool {
        loop {
            let node = &self.nodes[index];
            if node.hidden {
                return false;
            }
            match node.parent.or(node.host) {
                Some(next) => index = next,
                None => return true,
            }
        }
    }

    fn append(&mut self, parent: usize, spec: ElementSpec) -> usize {
        let index = self.nodes.len();
        let mut node = Node::bare(NodeKind::Element);
        node.tag = spec.tag;
        node.attrs = spec.attrs;
        node.text = spec.text;
        node.rect = spec.rect;
        node.hidden = spec.hidden;
        node.behavior = spec.behavior;
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(index);
        index
    }

    fn replace_content(&mut self, index: usize, text: Option<String>, html: Option<String>) {
        let children = std::mem::take(&mut self.nodes[index].children);
        for child in children {
            self.nodes[child].removed = true;
        }
        let node = &mut self.nodes[index];
        node.text = text.unwrap_or_default();
        node.html = html;
    }
}

struct Handle<'a> {
    state: &'a State,
    index: usize,
}

impl ElementLike for Handle<'_> {
    fn local_name(&self) -> &str {
        &self.state.nodes[self.index].tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.state.nodes[self.index].attrs.get(name).map(String::as_str)
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.state.nodes[self.index].parent?;
        (self.state.nodes[parent].kind == NodeKind::Element).then_some(Handle {
            state: self.state,
            index: parent,
        })
    }
}

/// In-memory implementation of [`Dom`].
pub struct MemoryDom {
    state: Mutex<State>,
}

impl MemoryDom {
    pub fn new(url: &str) -> Self {
        let state = State {
            url: url.to_string(),
            nodes: vec![Node::bare(NodeKind::Document)],
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The document node; append top-level elements to it.
    pub fn document(&self) -> NodeId {
        NodeId(DOCUMENT as u64)
    }

    pub fn set_url(&self, url: &str) {
        self.lock().url = url.to_string();
    }

    /// Appends an element under `parent` (an element, a shadow root, or the document).
    pub fn append(&self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let mut state = self.lock();
        NodeId(state.append(parent.0 as usize, spec) as u64)
    }

    /// Attaches an open shadow root to `host` and returns it.
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        let mut state = self.lock();
        let host_index = host.0 as usize;
        if let Some(existing) = state.nodes[host_index].shadow {
            return NodeId(existing as u64);
        }
        let index = state.nodes.len();
        let mut root = Node::bare(NodeKind::ShadowRoot);
        root.host = Some(host_index);
        state.nodes.push(root);
        state.nodes[host_index].shadow = Some(index);
        NodeId(index as u64)
    }

    /// Detaches `node` and its subtree, as an SPA re-render would.
    pub fn remove(&self, node: NodeId) {
        let mut state = self.lock();
        if let Some(n) = state.nodes.get_mut(node.0 as usize) {
            n.removed = true;
        }
    }

    /// `host` keeps appearing in `shadow_hosts`, but every query scoped to
    /// its shadow root reports it detached, like a web component that
    /// re-renders between the two calls.
    pub fn remount_between_queries(&self, host: NodeId) {
        self.lock().remounting.insert(host.0 as usize);
    }

    /// Clicking `trigger` appends `spec` under `parent`.
    pub fn reveal_on_click(&self, trigger: NodeId, parent: NodeId, spec: ElementSpec) {
        self.lock()
            .on_click
            .entry(trigger.0 as usize)
            .or_default()
            .push((parent.0 as usize, spec));
    }

    /// Makes `url` reachable by the page-context fetch.
    pub fn allow_fetch(&self, url: &str, mime: &str, bytes: &[u8]) {
        self.lock().reachable.insert(
            url.to_string(),
            FetchedBytes {
                mime: mime.to_string(),
                bytes: bytes.to_vec(),
            },
        );
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    /// Names of the events dispatched on `node`, in order.
    pub fn event_names(&self, node: NodeId) -> Vec<&'static str> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.node == node)
            .map(|e| e.event.name())
            .collect()
    }

    /// `execCommand` invocations as `(node, command)`.
    pub fn commands(&self) -> Vec<(NodeId, String)> {
        self.lock().commands.clone()
    }

    pub fn value_of(&self, node: NodeId) -> String {
        self.lock().nodes[node.0 as usize].value.clone()
    }

    pub fn text_of(&self, node: NodeId) -> String {
        self.lock().text_of(node.0 as usize)
    }

    pub fn inner_html_of(&self, node: NodeId) -> Option<String> {
        self.lock().nodes[node.0 as usize].html.clone()
    }

    /// Names of the files currently held by a file input or drop target.
    pub fn files_of(&self, node: NodeId) -> Vec<String> {
        self.lock().nodes[node.0 as usize].files.clone()
    }

    /// Values committed by Enter on a tag input.
    pub fn committed_of(&self, node: NodeId) -> Vec<String> {
        self.lock().nodes[node.0 as usize].committed.clone()
    }
}

#[async_trait]
impl Dom for MemoryDom {
    async fn current_url(&self) -> Result<String, DomError> {
        Ok(self.lock().url.clone())
    }

    async fn query_all(&self, scope: Scope, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let parsed = SelectorList::parse(selector)?;
        let guard = self.lock();
        let state = &*guard;
        let Some(root) = state.scope_root(scope)? else {
            return Ok(Vec::new());
        };
        Ok(state
            .descendants(root)
            .into_iter()
            .filter(|&index| {
                parsed.matches(&Handle { state, index })
            })
            .map(|index| NodeId(index as u64))
            .collect())
    }

    async fn shadow_hosts(&self, scope: Scope) -> Result<Vec<NodeId>, DomError> {
        let state = self.lock();
        let Some(root) = state.scope_root(scope)? else {
            return Ok(Vec::new());
        };
        Ok(state
            .descendants(root)
            .into_iter()
            .filter(|&index| state.nodes[index].shadow.is_some())
            .map(|index| NodeId(index as u64))
            .collect())
    }

    async fn describe(&self, node: NodeId) -> Result<NodeInfo, DomError> {
        let state = self.lock();
        let index = state.element(node)?;
        let n = &state.nodes[index];
        Ok(NodeInfo {
            tag: n.tag.clone(),
            classes: n
                .attrs
                .get("class")
                .map(|c| c.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            attributes: n.attrs.clone(),
            content_editable: n.is_content_editable(),
            rect: n.rect,
            visible: state.visible(index),
            text: state.text_of(index),
            value: n.is_form_control().then(|| n.value.clone()),
            has_shadow_root: n.shadow.is_some(),
        })
    }

    async fn focus(&self, node: NodeId) -> Result<(), DomError> {
        let mut state = self.lock();
        state.element(node)?;
        state.events.push(RecordedEvent {
            node,
            event: DomEvent::Focus,
        });
        Ok(())
    }

    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        let mut state = self.lock();
        let index = state.element(node)?;
        state.events.push(RecordedEvent {
            node,
            event: DomEvent::Click,
        });
        if let Some(reveals) = state.on_click.remove(&index) {
            for (parent, spec) in reveals {
                state.append(parent, spec);
            }
        }
        Ok(())
    }

    async fn select_all(&self, node: NodeId) -> Result<(), DomError> {
        self.lock().element(node)?;
        Ok(())
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        let index = state.element(node)?;
        state.nodes[index].value = value.to_string();
        Ok(())
    }

    async fn set_inner_html(&self, node: NodeId, html: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        let index = state.element(node)?;
        state.replace_content(index, None, Some(html.to_string()));
        Ok(())
    }

    async fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        let mut state = self.lock();
        let index = state.element(node)?;
        state.replace_content(index, Some(text.to_string()), None);
        Ok(())
    }

    async fn exec_command(&self, node: NodeId, command: &EditCommand) -> Result<bool, DomError> {
        let mut state = self.lock();
        let index = state.element(node)?;
        state.commands.push((node, command.name().to_string()));
        let n = &state.nodes[index];
        let (supported, form_control, editable) = (
            n.behavior.supports_exec_command,
            n.is_form_control(),
            n.is_content_editable(),
        );
        if !supported {
            return Ok(false);
        }
        if form_control {
            state.nodes[index].value = command.payload().to_string();
            return Ok(true);
        }
        if !editable {
            return Ok(false);
        }
        match command {
            EditCommand::InsertText(text) => state.replace_content(index, Some(text.clone()), None),
            EditCommand::InsertHtml(html) => state.replace_content(index, None, Some(html.clone())),
        }
        Ok(true)
    }

    async fn dispatch(&self, node: NodeId, event: &DomEvent) -> Result<EventOutcome, DomError> {
        let mut state = self.lock();
        let index = state.element(node)?;
        state.events.push(RecordedEvent {
            node,
            event: event.clone(),
        });

        let behavior = state.nodes[index].behavior;
        let mut outcome = EventOutcome::default();
        match event {
            DomEvent::Paste { text, html } if behavior.accepts_paste => {
                match html {
                    Some(html) => state.replace_content(index, None, Some(html.clone())),
                    None => state.replace_content(index, Some(text.clone()), None),
                }
                outcome.default_prevented = true;
            }
            DomEvent::KeyDown { key } if key == "Enter" && behavior.commits_on_enter => {
                let value = std::mem::take(&mut state.nodes[index].value);
                if !value.trim().is_empty() {
                    state.nodes[index].committed.push(value.trim().to_string());
                }
                outcome.default_prevented = true;
            }
            DomEvent::Drop => {
                let names = state.staged.iter().map(|f| f.name.clone()).collect();
                state.nodes[index].files = names;
                outcome.default_prevented = true;
            }
            _ => {}
        }
        Ok(outcome)
    }

    async fn read_back(&self, node: NodeId) -> Result<String, DomError> {
        let state = self.lock();
        let index = state.element(node)?;
        let n = &state.nodes[index];
        if n.is_form_control() {
            Ok(n.value.clone())
        } else {
            Ok(state.text_of(index))
        }
    }

    async fn stage_files(&self, files: &[SyntheticFile]) -> Result<usize, DomError> {
        let mut state = self.lock();
        state.staged = files.to_vec();
        Ok(files.len())
    }

    async fn assign_staged_files(&self, input: NodeId) -> Result<usize, DomError> {
        let mut state = self.lock();
        let index = state.element(input)?;
        let n = &state.nodes[index];
        let is_file_input = n.tag == "input"
            && n.attrs
                .get("type")
                .map(|t| t.eq_ignore_ascii_case("file"))
                .unwrap_or(false);
        if !is_file_input {
            return Err(DomError::Script(format!(
                "<{}> is not a file input",
                n.tag
            )));
        }
        let names: Vec<String> = state.staged.iter().map(|f| f.name.clone()).collect();
        let count = names.len();
        state.nodes[index].files = names;
        Ok(count)
    }

    async fn fetch_direct(&self, url: &str) -> Result<FetchedBytes, DomError> {
        self.lock()
            .reachable
            .get(url)
            .cloned()
            .ok_or_else(|| DomError::Fetch(format!("{} blocked by CORS policy", url)))
    }
}
