//! Namespace-aware XML tree used to fill ISO 19139 templates.
//!
//! Element and attribute names are kept exactly as written in the source so a
//! round trip never invents prefixes. Lookups go through [`XPath`], whose
//! prefixes are resolved against a [`Namespaces`] table and matched by URI.

use std::collections::{BTreeMap, HashSet};

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use tracing::debug;

use crate::error::Stac2IsoError;

pub const GMD_NS: &str = "http://www.isotc211.org/2005/gmd";
pub const GCO_NS: &str = "http://www.isotc211.org/2005/gco";
pub const GML_NS: &str = "http://www.opengis.net/gml/3.2";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Read-only prefix to URI table used to resolve query paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    bindings: BTreeMap<String, String>,
}

impl Namespaces {
    pub fn new(bindings: BTreeMap<String, String>) -> Self {
        Self { bindings }
    }

    pub fn with_bindings(mut self, bindings: BTreeMap<String, String>) -> Self {
        self.bindings.extend(bindings);
        self
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == uri)
            .map(|(prefix, _)| prefix.as_str())
    }

    fn split<'a>(&self, prefixed: &'a str) -> Result<(Option<String>, &'a str), Stac2IsoError> {
        match prefixed.split_once(':') {
            Some((prefix, local)) => {
                let uri = self
                    .uri(prefix)
                    .ok_or_else(|| Stac2IsoError::UnknownPrefix(prefix.to_string()))?;
                Ok((Some(uri.to_string()), local))
            }
            None => Ok((None, prefixed)),
        }
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        let bindings = [("gmd", GMD_NS), ("gco", GCO_NS), ("gml", GML_NS)]
            .into_iter()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect();
        Self { bindings }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name as written, e.g. `gmd:title`.
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn declared_prefix_for(&self, uri: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(key, value)| {
            if value != uri {
                return None;
            }
            if key == "xmlns" {
                Some("")
            } else {
                key.strip_prefix("xmlns:")
            }
        })
    }

    fn declared_uri_for(&self, prefix: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(key, value)| {
            let matches = if prefix.is_empty() {
                key == "xmlns"
            } else {
                key.strip_prefix("xmlns:") == Some(prefix)
            };
            matches.then_some(value.as_str())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    DocType(String),
    Pi(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    namespace: Option<String>,
    local: String,
}

/// Compiled ElementTree-style path such as `.//gmd:title/gco:CharacterString`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    steps: Vec<Step>,
}

impl XPath {
    pub fn compile(path: &str, namespaces: &Namespaces) -> Result<Self, Stac2IsoError> {
        let mut steps = Vec::new();
        let mut axis = Axis::Child;
        for token in path.split('/') {
            match token {
                "." => {}
                "" => axis = Axis::Descendant,
                name => {
                    let (namespace, local) = namespaces.split(name)?;
                    steps.push(Step {
                        axis,
                        namespace,
                        local: local.to_string(),
                    });
                    axis = Axis::Child;
                }
            }
        }
        Ok(Self { steps })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<Node>,
    /// Doctype, processing instructions and comments ahead of the root.
    prolog: Vec<NodeId>,
    root: NodeId,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self, Stac2IsoError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut nodes: Vec<Node> = Vec::new();
        let mut open: Vec<NodeId> = Vec::new();
        let mut prolog: Vec<NodeId> = Vec::new();
        let mut root = None;

        loop {
            let event = reader.read_event().map_err(|err| {
                Stac2IsoError::TemplateParse(format!(
                    "at byte {}: {err}",
                    reader.buffer_position()
                ))
            })?;
            match event {
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    if open.is_empty() && root.is_some() {
                        return Err(Stac2IsoError::TemplateParse(
                            "multiple root elements".to_string(),
                        ));
                    }
                    let element = read_element(start)?;
                    let parent = open.last().copied();
                    let id = push_node(&mut nodes, NodeKind::Element(element), parent);
                    let namespace = resolve_namespace(&nodes, id)?;
                    if let NodeKind::Element(element) = &mut nodes[id.0].kind {
                        element.namespace = namespace;
                    }
                    if parent.is_none() {
                        root = Some(id);
                    }
                    if !is_empty {
                        open.push(id);
                    }
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Text(text) => {
                    if let Some(parent) = open.last().copied() {
                        let text = text
                            .unescape()
                            .map_err(|err| Stac2IsoError::TemplateParse(err.to_string()))?;
                        push_node(&mut nodes, NodeKind::Text(text.into_owned()), Some(parent));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = open.last().copied() {
                        let data = String::from_utf8_lossy(&data).into_owned();
                        push_node(&mut nodes, NodeKind::CData(data), Some(parent));
                    }
                }
                Event::Comment(comment) => {
                    let comment = String::from_utf8_lossy(&comment).into_owned();
                    push_misc(&mut nodes, &mut prolog, &open, root, NodeKind::Comment(comment));
                }
                Event::PI(pi) => {
                    let pi = String::from_utf8_lossy(&pi).into_owned();
                    push_misc(&mut nodes, &mut prolog, &open, root, NodeKind::Pi(pi));
                }
                Event::DocType(doctype) => {
                    let doctype = String::from_utf8_lossy(&doctype).into_owned();
                    push_misc(&mut nodes, &mut prolog, &open, root, NodeKind::DocType(doctype));
                }
                Event::Eof => break,
                // The declaration is rewritten on output.
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(Stac2IsoError::TemplateParse(
                "unexpected end of document".to_string(),
            ));
        }
        let root =
            root.ok_or_else(|| Stac2IsoError::TemplateParse("no root element".to_string()))?;
        Ok(Self {
            nodes,
            prolog,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    /// Concatenated direct text of an element.
    pub fn text(&self, id: NodeId) -> String {
        self.nodes[id.0]
            .children
            .iter()
            .filter_map(|child| match &self.nodes[child.0].kind {
                NodeKind::Text(text) | NodeKind::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let nodes = &self.nodes;
        let retained: Vec<NodeId> = nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| {
                !matches!(
                    nodes[child.0].kind,
                    NodeKind::Text(_) | NodeKind::CData(_)
                )
            })
            .collect();
        let text_id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: Some(id),
            children: Vec::new(),
        });
        let node = &mut self.nodes[id.0];
        node.children = std::iter::once(text_id).chain(retained).collect();
    }

    pub fn find(&self, from: NodeId, path: &XPath) -> Option<NodeId> {
        self.find_all(from, path).into_iter().next()
    }

    pub fn find_all(&self, from: NodeId, path: &XPath) -> Vec<NodeId> {
        let mut current = vec![from];
        for step in &path.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for node in current {
                let candidates = match step.axis {
                    Axis::Child => self.child_elements(node),
                    Axis::Descendant => self.descendants(node),
                };
                for candidate in candidates {
                    if self.matches(candidate, step) && seen.insert(candidate) {
                        next.push(candidate);
                    }
                }
            }
            current = next;
        }
        current
    }

    /// Detaches `child` together with the indentation preceding it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let children = &self.nodes[parent.0].children;
        let Some(position) = children.iter().position(|id| *id == child) else {
            return;
        };
        let mut start = position;
        if position > 0 {
            let previous = children[position - 1];
            if let NodeKind::Text(text) = &self.nodes[previous.0].kind {
                if text.trim().is_empty() {
                    start = position - 1;
                }
            }
        }
        let removed: Vec<NodeId> = self.nodes[parent.0]
            .children
            .drain(start..=position)
            .collect();
        for id in removed {
            self.nodes[id.0].parent = None;
        }
    }

    /// Appends a new element named by a configured prefix, e.g. `gmd:keyword`.
    ///
    /// The element reuses whatever prefix the document binds to the same URI
    /// at that point; only when none is in scope does it declare one itself.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        prefixed: &str,
        namespaces: &Namespaces,
    ) -> Result<NodeId, Stac2IsoError> {
        let (namespace, local) = namespaces.split(prefixed)?;
        let mut attributes = Vec::new();
        let name = match &namespace {
            Some(uri) => match self.prefix_in_scope(parent, uri) {
                Some(prefix) if prefix.is_empty() => local.to_string(),
                Some(prefix) => format!("{prefix}:{local}"),
                None => {
                    let prefix = namespaces.prefix_for(uri).unwrap_or_default().to_string();
                    attributes.push((format!("xmlns:{prefix}"), uri.clone()));
                    format!("{prefix}:{local}")
                }
            },
            None => local.to_string(),
        };
        let element = Element {
            name,
            namespace,
            attributes,
        };
        Ok(push_node(
            &mut self.nodes,
            NodeKind::Element(element),
            Some(parent),
        ))
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        prefixed: &str,
        value: &str,
        namespaces: &Namespaces,
    ) -> Result<(), Stac2IsoError> {
        let (namespace, local) = namespaces.split(prefixed)?;
        let mut declaration = None;
        let name = match &namespace {
            Some(uri) => match self.prefix_in_scope(id, uri).filter(|p| !p.is_empty()) {
                Some(prefix) => format!("{prefix}:{local}"),
                None => {
                    let prefix = namespaces.prefix_for(uri).unwrap_or_default().to_string();
                    declaration = Some((format!("xmlns:{prefix}"), uri.clone()));
                    format!("{prefix}:{local}")
                }
            },
            None => local.to_string(),
        };
        let NodeKind::Element(element) = &mut self.nodes[id.0].kind else {
            return Ok(());
        };
        if let Some(declaration) = declaration {
            element.attributes.push(declaration);
        }
        match element.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attributes.push((name, value.to_string())),
        }
        Ok(())
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, Stac2IsoError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|err| Stac2IsoError::Serialize(err.to_string()))?;
        writer.get_mut().push(b'\n');
        for node in &self.prolog {
            self.write_node(&mut writer, *node)?;
            writer.get_mut().push(b'\n');
        }
        self.write_node(&mut writer, self.root)?;
        writer.get_mut().push(b'\n');
        Ok(writer.into_inner())
    }

    pub fn to_xml_string(&self) -> Result<String, Stac2IsoError> {
        let bytes = self.to_xml()?;
        String::from_utf8(bytes).map_err(|err| Stac2IsoError::Serialize(err.to_string()))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), Stac2IsoError> {
        let node = &self.nodes[id.0];
        let event = match &node.kind {
            NodeKind::Element(element) => {
                let mut start = BytesStart::new(element.name.as_str());
                for (key, value) in &element.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if node.children.is_empty() {
                    Event::Empty(start)
                } else {
                    writer
                        .write_event(Event::Start(start))
                        .map_err(|err| Stac2IsoError::Serialize(err.to_string()))?;
                    for child in &node.children {
                        self.write_node(writer, *child)?;
                    }
                    Event::End(BytesEnd::new(element.name.as_str()))
                }
            }
            NodeKind::Text(text) => Event::Text(BytesText::from_escaped(partial_escape(text))),
            NodeKind::CData(data) => Event::CData(BytesCData::new(data.as_str())),
            NodeKind::Comment(comment) => Event::Comment(BytesText::from_escaped(comment.as_str())),
            NodeKind::DocType(doctype) => Event::DocType(BytesText::from_escaped(doctype.as_str())),
            NodeKind::Pi(pi) => Event::PI(BytesPI::new(pi.as_str())),
        };
        writer
            .write_event(event)
            .map_err(|err| Stac2IsoError::Serialize(err.to_string()))
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.child_elements(next).into_iter().rev());
        }
        out
    }

    fn matches(&self, id: NodeId, step: &Step) -> bool {
        self.element(id).is_some_and(|element| {
            element.local_name() == step.local && element.namespace == step.namespace
        })
    }

    fn prefix_in_scope(&self, from: NodeId, uri: &str) -> Option<String> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if let Some(element) = self.element(id) {
                if let Some(prefix) = element.declared_prefix_for(uri) {
                    // A closer redeclaration of the same prefix would shadow it.
                    if self.uri_in_scope(from, prefix).as_deref() == Some(uri) {
                        return Some(prefix.to_string());
                    }
                }
            }
            cursor = self.nodes[id.0].parent;
        }
        None
    }

    fn uri_in_scope(&self, from: NodeId, prefix: &str) -> Option<String> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if let Some(uri) = self.element(id).and_then(|e| e.declared_uri_for(prefix)) {
                return Some(uri.to_string());
            }
            cursor = self.nodes[id.0].parent;
        }
        None
    }
}

fn push_node(nodes: &mut Vec<Node>, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(Node {
        kind,
        parent,
        children: Vec::new(),
    });
    if let Some(parent) = parent {
        nodes[parent.0].children.push(id);
    }
    id
}

/// Attaches a comment, PI or doctype to the open element, or to the prolog
/// before the root. Anything after the root element is dropped.
fn push_misc(
    nodes: &mut Vec<Node>,
    prolog: &mut Vec<NodeId>,
    open: &[NodeId],
    root: Option<NodeId>,
    kind: NodeKind,
) {
    match (open.last().copied(), root) {
        (Some(parent), _) => {
            push_node(nodes, kind, Some(parent));
        }
        (None, None) => {
            let id = push_node(nodes, kind, None);
            prolog.push(id);
        }
        (None, Some(_)) => debug!(?kind, "dropping markup after the root element"),
    }
}

fn read_element(start: &BytesStart<'_>) -> Result<Element, Stac2IsoError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| Stac2IsoError::TemplateParse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Stac2IsoError::TemplateParse(err.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        namespace: None,
        attributes,
    })
}

fn resolve_namespace(nodes: &[Node], id: NodeId) -> Result<Option<String>, Stac2IsoError> {
    let NodeKind::Element(element) = &nodes[id.0].kind else {
        return Ok(None);
    };
    let prefix = element
        .name
        .split_once(':')
        .map(|(prefix, _)| prefix)
        .unwrap_or("");
    if prefix == "xml" {
        return Ok(Some(XML_NS.to_string()));
    }
    let mut cursor = Some(id);
    while let Some(current) = cursor {
        if let NodeKind::Element(candidate) = &nodes[current.0].kind {
            if let Some(uri) = candidate.declared_uri_for(prefix) {
                return Ok((!uri.is_empty()).then(|| uri.to_string()));
            }
        }
        cursor = nodes[current.0].parent;
    }
    if prefix.is_empty() {
        Ok(None)
    } else {
        Err(Stac2IsoError::TemplateParse(format!(
            "unbound namespace prefix `{prefix}` on <{}>",
            element.name
        )))
    }
}
