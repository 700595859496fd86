//! CSS selector subset used by the in-memory page.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute
//! selectors (`[a]`, `=`, `*=`, `^=`, `$=`, `~=`, with an optional ` i` flag),
//! compound selectors, descendant and child combinators, comma lists.
//! Pseudo-classes are rejected rather than silently ignored.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid selector `{selector}`: {reason}")]
    Invalid { selector: String, reason: String },
}

/// Read access to an element, enough to evaluate a selector.
pub trait ElementLike: Sized {
    fn local_name(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;
    /// Parent element, `None` at the document or shadow root boundary.
    fn parent_element(&self) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Complex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    /// Compounds left to right; the combinator links a compound to the one before it.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
    ignore_case: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let invalid = |reason: &str| SelectorError::Invalid {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let mut selectors = Vec::new();
        for group in split_top_level(input) {
            let group = group.trim();
            if group.is_empty() {
                return Err(invalid("empty selector in list"));
            }
            selectors.push(parse_complex(group).map_err(|reason| invalid(&reason))?);
        }
        if selectors.is_empty() {
            return Err(invalid("empty selector"));
        }
        Ok(Self { selectors })
    }

    pub fn matches<E: ElementLike>(&self, element: &E) -> bool {
        self.selectors
            .iter()
            .any(|complex| matches_at(&complex.parts, complex.parts.len() - 1, element))
    }
}

fn split_top_level(input: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                groups.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&input[start..]);
    groups
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn parse_complex(input: &str) -> Result<Complex, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut parts: Vec<(Combinator, Compound)> = Vec::new();
    let mut pending = Combinator::Descendant;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        if c == '>' {
            if parts.is_empty() {
                return Err("selector starts with a combinator".into());
            }
            pending = Combinator::Child;
            pos += 1;
            continue;
        }
        let compound = parse_compound(&chars, &mut pos)?;
        parts.push((pending, compound));
        pending = Combinator::Descendant;
    }

    if parts.is_empty() {
        return Err("empty selector".into());
    }
    if pending == Combinator::Child {
        return Err("dangling child combinator".into());
    }
    Ok(Complex { parts })
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(chars: &[char], pos: &mut usize) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let start = *pos;

    while *pos < chars.len() {
        let c = chars[*pos];
        match c {
            '*' if *pos == start => {
                *pos += 1;
            }
            '#' => {
                *pos += 1;
                let id = read_ident(chars, pos);
                if id.is_empty() {
                    return Err("empty id selector".into());
                }
                compound.id = Some(id);
            }
            '.' => {
                *pos += 1;
                let class = read_ident(chars, pos);
                if class.is_empty() {
                    return Err("empty class selector".into());
                }
                compound.classes.push(class);
            }
            '[' => {
                *pos += 1;
                compound.attrs.push(parse_attr(chars, pos)?);
            }
            ':' => return Err("pseudo-classes are not supported".into()),
            c if c.is_whitespace() || c == '>' => break,
            c if is_ident_char(c) && *pos == start => {
                compound.tag = Some(read_ident(chars, pos).to_ascii_lowercase());
            }
            other => return Err(format!("unexpected character `{}`", other)),
        }
    }

    Ok(compound)
}

fn parse_attr(chars: &[char], pos: &mut usize) -> Result<AttrSelector, String> {
    let skip_ws = |pos: &mut usize| {
        while *pos < chars.len() && chars[*pos].is_whitespace() {
            *pos += 1;
        }
    };

    skip_ws(pos);
    let name = read_ident(chars, pos).to_ascii_lowercase();
    if name.is_empty() {
        return Err("attribute selector without a name".into());
    }
    skip_ws(pos);

    let op = match chars.get(*pos) {
        Some(']') => {
            *pos += 1;
            return Ok(AttrSelector {
                name,
                op: AttrOp::Exists,
                value: String::new(),
                ignore_case: false,
            });
        }
        Some('=') => {
            *pos += 1;
            AttrOp::Equals
        }
        Some(&c) if matches!(c, '*' | '^' | '$' | '~') && chars.get(*pos + 1) == Some(&'=') => {
            *pos += 2;
            match c {
                '*' => AttrOp::Contains,
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                _ => AttrOp::Word,
            }
        }
        _ => return Err(format!("bad operator in attribute selector `{}`", name)),
    };

    skip_ws(pos);
    let value = match chars.get(*pos) {
        Some(&q) if q == '"' || q == '\'' => {
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != q {
                *pos += 1;
            }
            if *pos >= chars.len() {
                return Err("unterminated string".into());
            }
            let value: String = chars[start..*pos].iter().collect();
            *pos += 1;
            value
        }
        _ => read_ident(chars, pos),
    };

    skip_ws(pos);
    let mut ignore_case = false;
    if matches!(chars.get(*pos), Some('i') | Some('I')) {
        ignore_case = true;
        *pos += 1;
        skip_ws(pos);
    }
    if chars.get(*pos) != Some(&']') {
        return Err("unterminated attribute selector".into());
    }
    *pos += 1;

    Ok(AttrSelector {
        name,
        op,
        value,
        ignore_case,
    })
}

fn matches_at<E: ElementLike>(parts: &[(Combinator, Compound)], index: usize, element: &E) -> bool {
    let (combinator, compound) = &parts[index];
    if !compound.matches(element) {
        return false;
    }
    if index == 0 {
        return true;
    }
    match combinator {
        Combinator::Child => element
            .parent_element()
            .map(|parent| matches_at(parts, index - 1, &parent))
            .unwrap_or(false),
        Combinator::Descendant => {
            let mut ancestor = element.parent_element();
            while let Some(current) = ancestor {
                if matches_at(parts, index - 1, &current) {
                    return true;
                }
                ancestor = current.parent_element();
            }
            false
        }
    }
}

impl Compound {
    fn matches<E: ElementLike>(&self, element: &E) -> bool {
        if let Some(tag) = &self.tag {
            if !element.local_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = element.attribute("class").unwrap_or("");
            let present = class_attr.split_whitespace();
            if !self
                .classes
                .iter()
                .all(|class| present.clone().any(|c| c == class))
            {
                return false;
            }
        }
        self.attrs.iter().all(|attr| attr.matches(element))
    }
}

impl AttrSelector {
    fn matches<E: ElementLike>(&self, element: &E) -> bool {
        let Some(actual) = element.attribute(&self.name) else {
            return false;
        };
        let (actual, expected) = if self.ignore_case {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Word => actual.split_whitespace().any(|w| w == expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fake<'a> {
        nodes: &'a [(&'a str, HashMap<&'a str, &'a str>, Option<usize>)],
        index: usize,
    }

    impl ElementLike for Fake<'_> {
        fn local_name(&self) -> &str {
            self.nodes[self.index].0
        }

        fn attribute(&self, name: &str) -> Option<&str> {
            self.nodes[self.index].1.get(name).copied()
        }

        fn parent_element(&self) -> Option<Self> {
            self.nodes[self.index].2.map(|index| Fake {
                nodes: self.nodes,
                index,
            })
        }
    }

    fn tree() -> Vec<(&'static str, HashMap<&'static str, &'static str>, Option<usize>)> {
        vec![
            ("div", HashMap::from([("class", "editor-wrap main")]), None),
            ("section", HashMap::from([("id", "body")]), Some(0)),
            (
                "input",
                HashMap::from([("placeholder", "请输入标题 Title"), ("type", "text")]),
                Some(1),
            ),
        ]
    }

    #[test]
    fn matches_compound_and_combinators() {
        let nodes = tree();
        let input = Fake {
            nodes: &nodes,
            index: 2,
        };

        assert!(SelectorList::parse("input").unwrap().matches(&input));
        assert!(SelectorList::parse("#body > input").unwrap().matches(&input));
        assert!(SelectorList::parse(".editor-wrap input").unwrap().matches(&input));
        assert!(SelectorList::parse("div.main.editor-wrap input[type=text]")
            .unwrap()
            .matches(&input));
        assert!(!SelectorList::parse(".editor-wrap > input").unwrap().matches(&input));
        assert!(SelectorList::parse("textarea, input[placeholder*=\"标题\"]")
            .unwrap()
            .matches(&input));
    }

    #[test]
    fn attribute_operators() {
        let nodes = tree();
        let input = Fake {
            nodes: &nodes,
            index: 2,
        };
        let check = |s: &str| SelectorList::parse(s).unwrap().matches(&input);

        assert!(check("[placeholder^='请输入']"));
        assert!(check("[placeholder$=\"Title\"]"));
        assert!(!check("[placeholder*=\"title\"]"));
        assert!(check("[placeholder*=\"title\" i]"));
        assert!(check("[placeholder~=Title]"));
        assert!(check("[type]"));
        assert!(!check("[name]"));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(SelectorList::parse("div:not(.x)").is_err());
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("a,,b").is_err());
        assert!(SelectorList::parse("> a").is_err());
        assert!(SelectorList::parse("[name='x'").is_err());
    }
}
