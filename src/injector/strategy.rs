//! Injection strategies as data.
//!
//! Each editor kind maps to an ordered list of strategies; each strategy is an
//! ordered list of steps. The events a strategy emits, in order, are the
//! contract with the host page's editor framework and are asserted in tests
//! against [`crate::dom::memory::MemoryDom`].

use super::{EditorKind, FrameworkEditor};

/// Events a strategy fires after mutating the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitEvent {
    Input,
    Change,
    Blur,
}

impl EmitEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EmitEvent::Input => "input",
            EmitEvent::Change => "change",
            EmitEvent::Blur => "blur",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Focus,
    SelectAll,
    /// Native `.value` setter with the plain text.
    SetValue,
    /// `innerHTML = ''`.
    ClearContent,
    /// `innerHTML` with the sanitised markup.
    SetHtml,
    /// Synthetic `paste` carrying `text/plain` and, for markup, `text/html`.
    Paste,
    /// `execCommand('insertText' | 'insertHTML')`.
    ExecInsert,
    /// `textContent` with the plain text.
    AssignText,
    Emit(EmitEvent),
    /// Let the page's handlers run before the next step.
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub name: &'static str,
    pub steps: &'static [Step],
}

use EmitEvent::{Blur, Change, Input};
use Step::*;

pub static NATIVE: &[Strategy] = &[
    Strategy {
        name: "native-value",
        steps: &[
            Focus,
            Yield,
            SelectAll,
            Yield,
            SetValue,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
            Emit(Blur),
            Yield,
        ],
    },
    Strategy {
        name: "exec-command",
        steps: &[
            Focus,
            SelectAll,
            Yield,
            ExecInsert,
            Yield,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
            Emit(Blur),
            Yield,
        ],
    },
];

pub static CONTENT_EDITABLE: &[Strategy] = &[
    Strategy {
        name: "inner-html",
        steps: &[
            Focus,
            Yield,
            ClearContent,
            SetHtml,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
            Emit(Blur),
            Yield,
        ],
    },
    Strategy {
        name: "exec-command",
        steps: &[
            Focus,
            SelectAll,
            Yield,
            ExecInsert,
            Yield,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
        ],
    },
    Strategy {
        name: "assign-text",
        steps: &[Focus, AssignText, Emit(Input), Yield, Emit(Change), Yield],
    },
];

/// Draft.js, ProseMirror and friends only trust input that arrives through
/// their own handlers, so direct property writes come last.
pub static FRAMEWORK: &[Strategy] = &[
    Strategy {
        name: "paste",
        steps: &[
            Focus,
            Yield,
            SelectAll,
            Yield,
            Paste,
            Yield,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
        ],
    },
    Strategy {
        name: "exec-command",
        steps: &[
            Focus,
            SelectAll,
            Yield,
            ExecInsert,
            Yield,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
        ],
    },
    Strategy {
        name: "assign-text",
        steps: &[Focus, AssignText, Emit(Input), Yield, Emit(Change), Yield],
    },
];

/// CodeMirror keeps its document outside the DOM; `execCommand` on the
/// focused input area is the one path it reliably observes.
pub static CODE_EDITOR: &[Strategy] = &[
    Strategy {
        name: "exec-command",
        steps: &[
            Focus,
            SelectAll,
            Yield,
            ExecInsert,
            Yield,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
        ],
    },
    Strategy {
        name: "paste",
        steps: &[
            Focus,
            SelectAll,
            Yield,
            Paste,
            Yield,
            Emit(Input),
            Yield,
            Emit(Change),
            Yield,
        ],
    },
];

pub fn strategies(kind: EditorKind) -> &'static [Strategy] {
    match kind {
        EditorKind::NativeControl => NATIVE,
        EditorKind::ContentEditable => CONTENT_EDITABLE,
        EditorKind::Framework(FrameworkEditor::CodeMirror) => CODE_EDITOR,
        EditorKind::Framework(_) => FRAMEWORK,
    }
}

/// Names of the DOM events `strategy` dispatches, in order.
pub fn emitted_events(strategy: &Strategy) -> Vec<&'static str> {
    strategy
        .steps
        .iter()
        .filter_map(|step| match step {
            Focus => Some("focus"),
            Paste => Some("paste"),
            Emit(e) => Some(e.name()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_strategy_reports_input_then_change() {
        for table in [NATIVE, CONTENT_EDITABLE, FRAMEWORK, CODE_EDITOR] {
            for strategy in table {
                let events = emitted_events(strategy);
                let input = events.iter().position(|e| *e == "input");
                let change = events.iter().position(|e| *e == "change");
                assert!(
                    matches!((input, change), (Some(i), Some(c)) if i < c),
                    "{} emits {:?}",
                    strategy.name,
                    events
                );
            }
        }
    }

    #[test]
    fn native_sequence_is_focus_input_change_blur() {
        assert_eq!(
            emitted_events(&NATIVE[0]),
            vec!["focus", "input", "change", "blur"]
        );
    }

    #[test]
    fn framework_editors_try_paste_before_exec_command() {
        let names: Vec<_> = strategies(EditorKind::Framework(FrameworkEditor::DraftJs))
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["paste", "exec-command", "assign-text"]);
    }
}
