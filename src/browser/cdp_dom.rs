//! [`Dom`] over a live Chrome tab.
//!
//! Every operation is one `Runtime.evaluate` round trip. Elements cannot
//! cross the protocol by value, so the page keeps a registry
//! (`window.__mpf.nodes`) and the engine only ever sees ids into it. A
//! registry entry whose element has left the document reports
//! [`DomError::Detached`].

use crate::dom::{
    Dom, DomError, DomEvent, EditCommand, EventOutcome, FetchedBytes, NodeId, NodeInfo, Scope,
    SelectorError, SyntheticFile,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chromiumoxide::page::Page;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const DETACHED: &str = "__mpf_detached__";

/// Installed lazily on first use and kept for the lifetime of the document.
/// Ids are never reused. Entries whose element left the document are swept
/// whenever the registry doubles past its last swept size.
const PRELUDE: &str = r#"
if (!window.__mpf) {
    const nodes = new Map();
    const ids = new Map();
    let next = 0;
    let sweepAt = 256;
    const sweep = () => {
        for (const [id, el] of nodes) {
            if (!el.isConnected) { nodes.delete(id); ids.delete(el); }
        }
        sweepAt = Math.max(256, nodes.size * 2);
    };
    window.__mpf = {
        nodes,
        staged: null,
        track(el) {
            let id = ids.get(el);
            if (id === undefined) {
                if (nodes.size >= sweepAt) sweep();
                id = next++;
                nodes.set(id, el);
                ids.set(el, id);
            }
            return id;
        },
        node(id) {
            const el = nodes.get(id);
            if (!el || !el.isConnected) throw new Error('__mpf_detached__');
            return el;
        },
        root(scope) {
            if (scope < 0) return document;
            const host = this.node(scope);
            if (!host.shadowRoot) throw new Error('__mpf_detached__');
            return host.shadowRoot;
        },
    };
}
"#;

/// Escapes `input` for a single-quoted JS string literal.
fn escape_js_single(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

fn js_str(input: &str) -> String {
    format!("'{}'", escape_js_single(input))
}

fn scope_arg(scope: Scope) -> i64 {
    match scope {
        Scope::Document => -1,
        Scope::ShadowOf(NodeId(id)) => id as i64,
    }
}

fn script(body: &str) -> String {
    format!("{}\n(async function() {{\n{}\n}})()", PRELUDE, body)
}

#[derive(Deserialize)]
struct RawFetch {
    mime: String,
    data: String,
}

pub struct CdpDom {
    page: Page,
}

impl CdpDom {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval<T: DeserializeOwned>(
        &self,
        node: Option<NodeId>,
        body: &str,
    ) -> Result<T, DomError> {
        let result = self.page.evaluate(script(body)).await.map_err(|e| {
            let detail = format!("{:?}", e);
            match node {
                Some(node) if detail.contains(DETACHED) => DomError::Detached(node),
                _ => DomError::Script(e.to_string()),
            }
        })?;
        result
            .into_value::<T>()
            .map_err(|e| DomError::Script(format!("unexpected result: {}", e)))
    }

    /// Runs `body` with `el` bound to the element behind `node`.
    async fn on_node<T: DeserializeOwned>(&self, node: NodeId, body: &str) -> Result<T, DomError> {
        let body = format!("const el = window.__mpf.node({});\n{}", node.0, body);
        self.eval(Some(node), &body).await
    }
}

#[async_trait]
impl Dom for CdpDom {
    async fn current_url(&self) -> Result<String, DomError> {
        self.eval(None, "return location.href;").await
    }

    async fn query_all(&self, scope: Scope, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let body = format!(
            "const root = window.__mpf.root({});
             let found;
             try {{ found = root.querySelectorAll({}); }}
             catch (e) {{ return {{ invalid: String(e && e.message || e) }}; }}
             return {{ ids: Array.from(found).map(el => window.__mpf.track(el)) }};",
            scope_arg(scope),
            js_str(selector)
        );

        #[derive(Deserialize)]
        struct Found {
            #[serde(default)]
            ids: Vec<u64>,
            invalid: Option<String>,
        }

        let host = match scope {
            Scope::ShadowOf(host) => Some(host),
            Scope::Document => None,
        };
        let found: Found = self.eval(host, &body).await?;
        if let Some(reason) = found.invalid {
            return Err(DomError::Selector(SelectorError::Invalid {
                selector: selector.to_string(),
                reason,
            }));
        }
        Ok(found.ids.into_iter().map(NodeId).collect())
    }

    async fn shadow_hosts(&self, scope: Scope) -> Result<Vec<NodeId>, DomError> {
        let body = format!(
            "const root = window.__mpf.root({});
             return Array.from(root.querySelectorAll('*'))
                 .filter(el => el.shadowRoot)
                 .map(el => window.__mpf.track(el));",
            scope_arg(scope)
        );
        let host = match scope {
            Scope::ShadowOf(host) => Some(host),
            Scope::Document => None,
        };
        let ids: Vec<u64> = self.eval(host, &body).await?;
        Ok(ids.into_iter().map(NodeId).collect())
    }

    async fn describe(&self, node: NodeId) -> Result<NodeInfo, DomError> {
        self.on_node(
            node,
            r#"
            const r = el.getBoundingClientRect();
            let visible = true;
            if (typeof el.checkVisibility === 'function') {
                visible = el.checkVisibility({ visibilityProperty: true });
            } else {
                for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
                    const s = getComputedStyle(n);
                    if (s.display === 'none' || s.visibility === 'hidden') { visible = false; break; }
                }
            }
            const attributes = {};
            for (const a of el.attributes) attributes[a.name] = a.value;
            const hasValue = el.tagName === 'INPUT' || el.tagName === 'TEXTAREA';
            return {
                tag: el.tagName.toLowerCase(),
                classes: Array.from(el.classList),
                attributes,
                contentEditable: el.isContentEditable === true,
                rect: { x: r.x, y: r.y, width: r.width, height: r.height },
                visible,
                text: (el.innerText || el.textContent || '').slice(0, 2000),
                value: hasValue ? el.value : null,
                hasShadowRoot: !!el.shadowRoot,
            };
            "#,
        )
        .await
    }

    async fn focus(&self, node: NodeId) -> Result<(), DomError> {
        self.on_node::<bool>(node, "el.focus(); return true;").await?;
        Ok(())
    }

    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        self.on_node::<bool>(
            node,
            "el.scrollIntoView({ block: 'center' }); el.click(); return true;",
        )
        .await?;
        Ok(())
    }

    async fn select_all(&self, node: NodeId) -> Result<(), DomError> {
        self.on_node::<bool>(
            node,
            r#"
            if (typeof el.select === 'function' && (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA')) {
                el.select();
            } else {
                const range = document.createRange();
                range.selectNodeContents(el);
                const sel = window.getSelection();
                sel.removeAllRanges();
                sel.addRange(range);
            }
            return true;
            "#,
        )
        .await?;
        Ok(())
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        let body = format!(
            "const proto = el.tagName === 'TEXTAREA'
                 ? HTMLTextAreaElement.prototype
                 : HTMLInputElement.prototype;
             const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
             setter.call(el, {});
             return true;",
            js_str(value)
        );
        self.on_node::<bool>(node, &body).await?;
        Ok(())
    }

    async fn set_inner_html(&self, node: NodeId, html: &str) -> Result<(), DomError> {
        let body = format!("el.innerHTML = {}; return true;", js_str(html));
        self.on_node::<bool>(node, &body).await?;
        Ok(())
    }

    async fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        let body = format!("el.textContent = {}; return true;", js_str(text));
        self.on_node::<bool>(node, &body).await?;
        Ok(())
    }

    async fn exec_command(&self, node: NodeId, command: &EditCommand) -> Result<bool, DomError> {
        let body = format!(
            "el.focus(); return document.execCommand({}, false, {}) === true;",
            js_str(command.name()),
            js_str(command.payload())
        );
        self.on_node(node, &body).await
    }

    async fn dispatch(&self, node: NodeId, event: &DomEvent) -> Result<EventOutcome, DomError> {
        let spec = serde_json::to_string(event).map_err(|e| DomError::Script(e.to_string()))?;
        let body = format!(
            r#"
            const spec = {spec};
            const base = {{ bubbles: true, cancelable: true, composed: true }};
            let ev;
            switch (spec.type) {{
                case 'focus':
                    ev = new FocusEvent('focus', {{ composed: true }});
                    break;
                case 'blur':
                    ev = new FocusEvent('blur', {{ composed: true }});
                    break;
                case 'input':
                    ev = new InputEvent('input', {{ ...base, inputType: 'insertText', data: spec.data ?? null }});
                    break;
                case 'change':
                    ev = new Event('change', base);
                    break;
                case 'paste': {{
                    const dt = new DataTransfer();
                    dt.setData('text/plain', spec.text);
                    if (spec.html) dt.setData('text/html', spec.html);
                    ev = new ClipboardEvent('paste', {{ ...base, clipboardData: dt }});
                    break;
                }}
                case 'keyDown': {{
                    const code = spec.key === 'Enter' ? 13 : 0;
                    ev = new KeyboardEvent('keydown', {{ ...base, key: spec.key, code: spec.key, keyCode: code, which: code }});
                    break;
                }}
                case 'dragEnter':
                case 'dragOver':
                case 'drop': {{
                    const name = spec.type.toLowerCase();
                    ev = new DragEvent(name, {{ ...base, dataTransfer: window.__mpf.staged || new DataTransfer() }});
                    break;
                }}
                default:
                    ev = new MouseEvent('click', base);
            }}
            return {{ defaultPrevented: !el.dispatchEvent(ev) }};
            "#,
            spec = spec
        );
        self.on_node(node, &body).await
    }

    async fn read_back(&self, node: NodeId) -> Result<String, DomError> {
        self.on_node(
            node,
            "if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') return el.value;
             return el.innerText || el.textContent || '';",
        )
        .await
    }

    async fn stage_files(&self, files: &[SyntheticFile]) -> Result<usize, DomError> {
        let entries = files
            .iter()
            .map(|f| {
                format!(
                    "{{ name: {}, mime: {}, data: '{}' }}",
                    js_str(&f.name),
                    js_str(&f.mime),
                    STANDARD.encode(&f.bytes)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        let body = format!(
            "const dt = new DataTransfer();
             for (const f of [{}]) {{
                 const bytes = Uint8Array.from(atob(f.data), c => c.charCodeAt(0));
                 dt.items.add(new File([bytes], f.name, {{ type: f.mime }}));
             }}
             window.__mpf.staged = dt;
             return dt.files.length;",
            entries
        );
        let staged: usize = self.eval(None, &body).await?;
        debug!("[cdp] staged {} file(s)", staged);
        Ok(staged)
    }

    async fn assign_staged_files(&self, input: NodeId) -> Result<usize, DomError> {
        self.on_node(
            input,
            "const dt = window.__mpf.staged;
             if (!dt) return 0;
             el.files = dt.files;
             return el.files.length;",
        )
        .await
    }

    async fn fetch_direct(&self, url: &str) -> Result<FetchedBytes, DomError> {
        let body = format!(
            "const res = await fetch({}, {{ mode: 'cors', credentials: 'omit' }});
             if (!res.ok) throw new Error('HTTP ' + res.status);
             const buf = new Uint8Array(await res.arrayBuffer());
             let bin = '';
             for (let i = 0; i < buf.length; i += 0x8000) {{
                 bin += String.fromCharCode.apply(null, buf.subarray(i, i + 0x8000));
             }}
             return {{ mime: res.headers.get('content-type') || 'application/octet-stream', data: btoa(bin) }};",
            js_str(url)
        );
        let raw: RawFetch = self.eval(None, &body).await.map_err(|e| match e {
            DomError::Script(msg) => DomError::Fetch(msg),
            other => other,
        })?;
        let bytes = STANDARD
            .decode(raw.data.as_bytes())
            .map_err(|e| DomError::Fetch(e.to_string()))?;
        Ok(FetchedBytes {
            mime: raw.mime,
            bytes,
        })
    }
}
