//! Minimal owned XML element tree.
//!
//! Both the SOAP envelope and the distributed documents are small, so they are
//! read fully into an [`Element`] tree and queried by local name. Namespace
//! prefixes are resolved to URIs while parsing; lookups ignore prefixes.

use std::borrow::Cow;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("{0}")]
    Syntax(String),
    #[error("document has no root element")]
    Empty,
    #[error("unclosed element <{0}>")]
    Unclosed(String),
    #[error("content after the root element")]
    TrailingContent,
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Syntax(err.to_string())
    }
}

fn syntax(err: impl std::fmt::Display) -> XmlError {
    XmlError::Syntax(err.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local name, prefix removed.
    pub name: String,
    /// Resolved namespace URI, if the element is bound to one.
    pub namespace: Option<String>,
    /// Attributes by local name. Namespace declarations are not kept.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated, unescaped character data directly inside this element.
    pub text: String,
}

impl Element {
    /// Parse a complete document and return its root element.
    pub fn parse(input: &str) -> Result<Element, XmlError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        let mut reader = NsReader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_resolved_event()? {
                (ns, Event::Start(start)) => {
                    if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    }
                    stack.push(Element::open(ns, &start)?);
                }
                (ns, Event::Empty(start)) => {
                    if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    }
                    let element = Element::open(ns, &start)?;
                    close(&mut stack, &mut root, element);
                }
                (_, Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Syntax("unexpected closing tag".into()))?;
                    close(&mut stack, &mut root, element);
                }
                (_, Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape().map_err(syntax)?);
                    } else if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    } else {
                        return Err(XmlError::Syntax("text before the root element".into()));
                    }
                }
                (_, Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                (_, Event::Eof) => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        root.ok_or(XmlError::Empty)
    }

    fn open(ns: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Element, XmlError> {
        let name = std::str::from_utf8(start.local_name().as_ref())
            .map_err(syntax)?
            .to_string();
        let namespace = match ns {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
            _ => None,
        };

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(syntax)?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let local = std::str::from_utf8(attr.key.local_name().as_ref())
                .map_err(syntax)?
                .to_string();
            let value = attr.unescape_value().map_err(syntax)?.into_owned();
            attributes.push((local, value));
        }

        Ok(Element {
            name,
            namespace,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a chain of child names, taking the first match at each step.
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Trimmed text of the element, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Trimmed, non-blank text of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn close(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Escape text for inclusion in element content or attribute values.
pub fn escape(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}
