//! Metric namespaces and selectors.
//!
//! A namespace is a `/`-separated list of at least two elements. Elements are
//! plain names, wildcards (`*` for one element, `**` for the rest), regular
//! expressions in braces (`{cpu[0-9]+}`) and groups in brackets (`[device]`,
//! `[device=sda]`, `[device={sd.*}]`).
//!
//! The same syntax is validated differently depending on use:
//! - definitions: first and last element are names, middle elements are names or bare groups;
//! - submissions: first and last element are names, groups must carry a value;
//! - selectors (requested-metric filters, always-apply patterns): anything, with `**` last.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const SEPARATOR: char = '/';
const MIN_LENGTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("namespace is empty")]
    Empty,
    #[error("namespace must start with '{}'", SEPARATOR)]
    MissingSeparator,
    #[error("namespace needs at least {} elements", MIN_LENGTH)]
    TooShort,
    #[error("element {0} is empty")]
    EmptyElement(usize),
    #[error("element {0:?} is malformed")]
    Malformed(String),
    #[error("invalid regular expression {0:?}: {1}")]
    BadRegex(String, String),
    #[error("'**' is only allowed as the last element")]
    MisplacedRecursive,
    #[error("element {element:?} can't be used in a {usage}")]
    NotUsable { element: String, usage: &'static str },
}

#[derive(Debug, Clone)]
pub enum Element {
    Name(String),
    Any,
    AnyRest,
    Regex(Regex),
    Group(String),
    GroupValue(String, String),
    GroupRegex(String, Regex),
}

impl Element {
    fn parse(s: &str) -> Result<Self, NamespaceError> {
        match s {
            "*" => return Ok(Element::Any),
            "**" => return Ok(Element::AnyRest),
            _ => {}
        }

        if let Some(inner) = surrounded(s, '{', '}') {
            return compile(inner).map(Element::Regex);
        }

        if let Some(inner) = surrounded(s, '[', ']') {
            return match inner.split_once('=') {
                None if is_identifier(inner) => Ok(Element::Group(inner.to_string())),
                Some((group, value)) if is_identifier(group) => {
                    if let Some(re) = surrounded(value, '{', '}') {
                        Ok(Element::GroupRegex(group.to_string(), compile(re)?))
                    } else if is_identifier(value) {
                        Ok(Element::GroupValue(group.to_string(), value.to_string()))
                    } else {
                        Err(NamespaceError::Malformed(s.to_string()))
                    }
                }
                _ => Err(NamespaceError::Malformed(s.to_string())),
            };
        }

        if is_identifier(s) {
            Ok(Element::Name(s.to_string()))
        } else {
            Err(NamespaceError::Malformed(s.to_string()))
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Name(n) => write!(f, "{}", n),
            Element::Any => write!(f, "*"),
            Element::AnyRest => write!(f, "**"),
            Element::Regex(r) => write!(f, "{{{}}}", r.as_str()),
            Element::Group(g) => write!(f, "[{}]", g),
            Element::GroupValue(g, v) => write!(f, "[{}={}]", g, v),
            Element::GroupRegex(g, r) => write!(f, "[{}={{{}}}]", g, r.as_str()),
        }
    }
}

fn surrounded(s: &str, open: char, close: char) -> Option<&str> {
    if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
        Some(&s[open.len_utf8()..s.len() - close.len_utf8()])
    } else {
        None
    }
}

fn compile(pattern: &str) -> Result<Regex, NamespaceError> {
    Regex::new(pattern).map_err(|e| NamespaceError::BadRegex(pattern.to_string(), e.to_string()))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(|c| matches!(c, '/' | '[' | ']' | '{' | '}' | '*' | '='))
}

/// One element of a recorded sample's namespace. `group` is set when the
/// element filled a dynamic `[group]` position of the definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleElement {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Namespace {
    elements: Vec<Element>,
}

impl Namespace {
    fn parse(s: &str) -> Result<Self, NamespaceError> {
        if s.is_empty() {
            return Err(NamespaceError::Empty);
        }
        let rest = s.strip_prefix(SEPARATOR).ok_or(NamespaceError::MissingSeparator)?;

        let mut elements = Vec::new();
        for (i, part) in rest.split(SEPARATOR).enumerate() {
            if part.is_empty() {
                return Err(NamespaceError::EmptyElement(i));
            }
            elements.push(Element::parse(part)?);
        }

        if elements.len() < MIN_LENGTH {
            return Err(NamespaceError::TooShort);
        }
        Ok(Namespace { elements })
    }

    pub fn parse_definition(s: &str) -> Result<Self, NamespaceError> {
        let ns = Self::parse(s)?;
        let last = ns.elements.len() - 1;
        for (i, element) in ns.elements.iter().enumerate() {
            let ok = match element {
                Element::Name(_) => true,
                Element::Group(_) => i != 0 && i != last,
                _ => false,
            };
            if !ok {
                return Err(not_usable(element, "metric definition"));
            }
        }
        Ok(ns)
    }

    pub fn parse_submission(s: &str) -> Result<Self, NamespaceError> {
        let ns = Self::parse(s)?;
        let last = ns.elements.len() - 1;
        for (i, element) in ns.elements.iter().enumerate() {
            let ok = match element {
                Element::Name(_) => true,
                Element::GroupValue(..) => i != 0 && i != last,
                _ => false,
            };
            if !ok {
                return Err(not_usable(element, "submitted metric"));
            }
        }
        Ok(ns)
    }

    /// Namespace given to `should_process`: like a submission, but `*` may stand
    /// for any element after the first and the namespace may stop early.
    pub fn parse_query(s: &str) -> Result<Self, NamespaceError> {
        let ns = Self::parse(s)?;
        for (i, element) in ns.elements.iter().enumerate() {
            let ok = match element {
                Element::Name(_) => true,
                Element::Any | Element::GroupValue(..) => i != 0,
                _ => false,
            };
            if !ok {
                return Err(not_usable(element, "query"));
            }
        }
        Ok(ns)
    }

    pub fn parse_selector(s: &str) -> Result<Self, NamespaceError> {
        let ns = Self::parse(s)?;
        let last = ns.elements.len() - 1;
        if !matches!(ns.elements[0], Element::Name(_)) {
            return Err(not_usable(&ns.elements[0], "selector's first position"));
        }
        if ns.elements[..last].iter().any(|e| matches!(e, Element::AnyRest)) {
            return Err(NamespaceError::MisplacedRecursive);
        }
        Ok(ns)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Matches a submitted namespace against this definition and names the
    /// group each element fills. `None` when the submission doesn't fit.
    pub fn bind(&self, submitted: &Namespace) -> Option<Vec<SampleElement>> {
        if self.len() != submitted.len() {
            return None;
        }

        self.elements
            .iter()
            .zip(&submitted.elements)
            .map(|(def, sub)| match (def, sub) {
                (Element::Name(d), Element::Name(s)) if d == s => {
                    Some(SampleElement { value: s.clone(), group: None })
                }
                (Element::Group(g), Element::Name(v)) => {
                    Some(SampleElement { value: v.clone(), group: Some(g.clone()) })
                }
                (Element::Group(g), Element::GroupValue(sg, v)) if g == sg => {
                    Some(SampleElement { value: v.clone(), group: Some(g.clone()) })
                }
                _ => None,
            })
            .collect()
    }

    /// True when this selector covers a bound sample namespace.
    pub fn selects(&self, sample: &[SampleElement]) -> bool {
        let mut i = 0;
        for element in &self.elements {
            if let Element::AnyRest = element {
                return i < sample.len();
            }
            let Some(item) = sample.get(i) else {
                return false;
            };
            if !element_selects(element, item) {
                return false;
            }
            i += 1;
        }
        i == sample.len()
    }

    /// True when some metric below `query` could still be covered by this definition.
    pub fn admits_prefix(&self, query: &Namespace) -> bool {
        if query.len() > self.len() {
            return false;
        }
        self.elements.iter().zip(&query.elements).all(|(def, q)| match (def, q) {
            (_, Element::Any) => true,
            (Element::Name(d), Element::Name(v)) => d == v,
            (Element::Group(_), Element::Name(_)) => true,
            (Element::Group(g), Element::GroupValue(qg, _)) => g == qg,
            _ => false,
        })
    }

    /// Selector counterpart of [`Namespace::admits_prefix`].
    pub fn selects_prefix(&self, query: &Namespace) -> bool {
        for (i, q) in query.elements.iter().enumerate() {
            let Some(element) = self.elements.get(i) else {
                return false;
            };
            let ok = match (element, q) {
                (Element::AnyRest, _) => return true,
                (_, Element::Any) | (Element::Any, _) => true,
                (Element::Name(n), Element::Name(v)) => n == v,
                (Element::Name(n), Element::GroupValue(_, v)) => n == v,
                (Element::Regex(r), Element::Name(v)) => r.is_match(v),
                (Element::Regex(r), Element::GroupValue(_, v)) => r.is_match(v),
                (Element::Group(_), Element::Name(_)) => true,
                (Element::Group(g), Element::GroupValue(qg, _)) => g == qg,
                (Element::GroupValue(g, gv), Element::GroupValue(qg, v)) => g == qg && gv == v,
                (Element::GroupValue(_, gv), Element::Name(v)) => gv == v,
                (Element::GroupRegex(g, r), Element::GroupValue(qg, v)) => g == qg && r.is_match(v),
                (Element::GroupRegex(_, r), Element::Name(v)) => r.is_match(v),
                _ => false,
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

fn element_selects(element: &Element, item: &SampleElement) -> bool {
    let in_group = |g: &str| item.group.as_deref() == Some(g);
    match element {
        Element::Name(n) => *n == item.value,
        Element::Any => true,
        Element::AnyRest => true,
        Element::Regex(r) => r.is_match(&item.value),
        Element::Group(g) => in_group(g),
        Element::GroupValue(g, v) => in_group(g) && *v == item.value,
        Element::GroupRegex(g, r) => in_group(g) && r.is_match(&item.value),
    }
}

fn not_usable(element: &Element, usage: &'static str) -> NamespaceError {
    NamespaceError::NotUsable { element: element.to_string(), usage }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(f, "{}{}", SEPARATOR, element)?;
        }
        Ok(())
    }
}

/// Plain form of a bound namespace, e.g. `/acme/sda/iops`.
pub fn render_sample(elements: &[SampleElement]) -> String {
    let mut out = String::new();
    for element in elements {
        out.push(SEPARATOR);
        out.push_str(&element.value);
    }
    out
}
