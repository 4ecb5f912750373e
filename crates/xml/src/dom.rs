use crate::{XmlError, XmlResult};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// ============================================================================
// Tree types
// ============================================================================

/// An attribute with its qualified name as written (`wsu:Id`, `xmlns:ds`, `code`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its qualified name as written in the source document.
///
/// Builder methods (`with_*`) consume and return the element so message bodies can be written
/// as nested expressions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_optional_attr(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value),
            None => self,
        }
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_optional_child(self, child: Option<Element>) -> Self {
        match child {
            Some(child) => self.with_child(child),
            None => self,
        }
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Value of the attribute with exactly this qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of the first non-namespace attribute with this local name, whatever its prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|a| !a.is_namespace_declaration())
            .find(|a| a.local_name() == local)
            .map(|a| a.value.as_str())
    }

    /// The element's XML-DSig reference id: `Id`, `ID` or any prefixed `*:Id` such as `wsu:Id`.
    pub fn id(&self) -> Option<&str> {
        self.attr_local("Id").or_else(|| self.attr_local("ID"))
    }

    /// Namespace declarations on this element as `(prefix, uri)`; the default namespace has an
    /// empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|a| {
            if a.name == "xmlns" {
                Some(("", a.value.as_str()))
            } else {
                a.name
                    .strip_prefix("xmlns:")
                    .map(|prefix| (prefix, a.value.as_str()))
            }
        })
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.local_name() == local)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements()
            .filter(move |el| el.local_name() == local)
    }

    /// Walk down through first children matching each local name in turn.
    pub fn descend(&self, locals: &[&str]) -> Option<&Element> {
        locals
            .iter()
            .try_fold(self, |current, local| current.child(local))
    }

    /// First descendant (excluding `self`) with the given local name, in document order.
    pub fn find_descendant(&self, local: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.local_name() == local {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(local) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants (excluding `self`) with the given local name, in document order.
    pub fn descendants_named<'a>(&'a self, local: &str) -> Vec<&'a Element> {
        fn walk<'a>(el: &'a Element, local: &str, out: &mut Vec<&'a Element>) {
            for child in el.child_elements() {
                if child.local_name() == local {
                    out.push(child);
                }
                walk(child, local, out);
            }
        }

        let mut out = Vec::new();
        walk(self, local, &mut out);
        out
    }

    /// Concatenated text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    /// Trimmed text content, or `None` when it is empty.
    pub fn trimmed_text(&self) -> Option<String> {
        let text = self.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(existing)) = self.children.last_mut() {
            existing.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_owned()));
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            escape_attribute_into(&attr.value, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Text(text) => escape_text_into(text, out),
                Node::Element(el) => el.write_to(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Position of an element as child indices from the root (text nodes count).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// The parent path and this node's index within the parent, or `None` for the root.
    pub fn split_last(&self) -> Option<(NodePath, usize)> {
        let (last, rest) = self.0.split_last()?;
        Some((NodePath(rest.to_vec()), *last))
    }
}

// ============================================================================
// Document
// ============================================================================

/// A parsed XML document. Transforms consume the document and return a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse XML text into a document.
    ///
    /// # Errors
    ///
    /// Returns an `XmlError` for malformed or unbalanced markup, a DOCTYPE, undefined entity
    /// references, or a missing root element.
    pub fn parse(xml: &str) -> XmlResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    }
                    stack.push(element_from_start(&start)?);
                }
                Event::Empty(start) => {
                    if root.is_some() {
                        return Err(XmlError::TrailingContent);
                    }
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or(XmlError::UnbalancedEnd)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    let raw = std::str::from_utf8(&text)?;
                    match stack.last_mut() {
                        Some(parent) => {
                            let normalized = raw.replace("\r\n", "\n");
                            parent.push_text(&unescape(&normalized)?);
                        }
                        None if raw.trim().is_empty() => {}
                        None => return Err(XmlError::TrailingContent),
                    }
                }
                Event::CData(data) => {
                    let raw = std::str::from_utf8(&data)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(raw),
                        None => return Err(XmlError::TrailingContent),
                    }
                }
                Event::DocType(_) => return Err(XmlError::DocType),
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        root.map(Self::new).ok_or(XmlError::NoRoot)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_root(self) -> Element {
        self.root
    }

    /// Serialise with an XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        self.root.write_to(&mut out);
        out
    }

    pub fn element_at(&self, path: &NodePath) -> Option<&Element> {
        path.0.iter().try_fold(&self.root, |el, index| match el.children.get(*index) {
            Some(Node::Element(child)) => Some(child),
            _ => None,
        })
    }

    fn element_at_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let mut current = &mut self.root;
        for index in &path.0 {
            current = match current.children.get_mut(*index) {
                Some(Node::Element(child)) => child,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Paths of every element matching `predicate`, in document order.
    pub fn find_paths(&self, predicate: impl Fn(&Element) -> bool) -> Vec<NodePath> {
        fn walk(
            el: &Element,
            path: NodePath,
            predicate: &dyn Fn(&Element) -> bool,
            out: &mut Vec<NodePath>,
        ) {
            if predicate(el) {
                out.push(path.clone());
            }
            for (index, node) in el.children.iter().enumerate() {
                if let Node::Element(child) = node {
                    walk(child, path.child(index), predicate, out);
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root, NodePath::root(), &predicate, &mut out);
        out
    }

    pub fn find_first(&self, predicate: impl Fn(&Element) -> bool) -> Option<NodePath> {
        self.find_paths(predicate).into_iter().next()
    }

    /// Path of the first child element of `parent` with the given local name.
    pub fn child_path(&self, parent: &NodePath, local: &str) -> Option<NodePath> {
        let parent_element = self.element_at(parent)?;
        parent_element
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.local_name() == local))
            .map(|index| parent.child(index))
    }

    /// Namespace URI bound to the element's prefix at `path`, if any.
    ///
    /// The nearest declaration wins, starting from the element itself and walking up.
    pub fn namespace_uri(&self, path: &NodePath) -> Option<String> {
        let element = self.element_at(path)?;
        let prefix = element.prefix().unwrap_or("");

        let mut chain = vec![&self.root];
        let mut current = &self.root;
        for index in &path.0 {
            current = match current.children.get(*index) {
                Some(Node::Element(child)) => child,
                _ => return None,
            };
            chain.push(current);
        }

        chain
            .iter()
            .rev()
            .find_map(|el| {
                el.namespace_declarations()
                    .find(|(declared, _)| *declared == prefix)
                    .map(|(_, uri)| uri)
            })
            .filter(|uri| !uri.is_empty())
            .map(str::to_owned)
    }

    /// Apply `edit` to the element at `path` and return the updated document.
    pub fn map_element(
        mut self,
        path: &NodePath,
        edit: impl FnOnce(&mut Element),
    ) -> XmlResult<Self> {
        let element = self.element_at_mut(path).ok_or(XmlError::InvalidPath)?;
        edit(element);
        Ok(self)
    }

    pub fn insert_before(self, path: &NodePath, element: Element) -> XmlResult<Self> {
        let (parent, index) = path.split_last().ok_or(XmlError::InvalidPath)?;
        self.map_element(&parent, |p| p.children.insert(index, Node::Element(element)))
    }

    pub fn insert_after(self, path: &NodePath, element: Element) -> XmlResult<Self> {
        let (parent, index) = path.split_last().ok_or(XmlError::InvalidPath)?;
        self.map_element(&parent, |p| {
            p.children.insert(index + 1, Node::Element(element))
        })
    }

    pub fn append_child(self, path: &NodePath, element: Element) -> XmlResult<Self> {
        self.map_element(path, |p| p.children.push(Node::Element(element)))
    }
}

fn element_from_start(start: &BytesStart<'_>) -> XmlResult<Element> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_owned();
        // Attribute-value normalisation: literal whitespace characters become spaces.
        let raw: String = std::str::from_utf8(&attr.value)?
            .chars()
            .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
            .collect();
        let value = unescape(&raw)?.into_owned();
        element.attributes.push(Attribute { name: key, value });
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn escape_text_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
