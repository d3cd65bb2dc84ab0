use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Error raised when a part cannot be parsed as XML.
#[derive(Error, Debug)]
#[error("XML parse error: {0}")]
pub struct XmlError(pub String);

/// Handle to a node inside an [`XmlTree`].
///
/// Handles stay valid for the lifetime of the tree; detaching a node leaves
/// its arena slot in place, so handles held across structural edits never
/// dangle (a detached node is simply no longer reachable from the root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        /// Qualified name as written in the source (e.g. `w:p`).
        name: String,
        /// Attributes in document order, values unescaped.
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable XML document tree.
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Element and
/// attribute lookups match on the local name (the part after the namespace
/// prefix), the same convention the streaming parsers in this crate use, so
/// documents with unconventional prefixes still resolve.
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl XmlTree {
    /// Create an empty tree with no root element.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Parse a tree from raw part bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut tree = Self::new();
        let mut reader = Reader::from_reader(bytes);
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = tree.element_from_event(&e)?;
                    tree.attach(stack.last().copied(), id);
                    stack.push(id);
                },
                Ok(Event::Empty(e)) => {
                    let id = tree.element_from_event(&e)?;
                    tree.attach(stack.last().copied(), id);
                },
                Ok(Event::End(_)) => {
                    if stack.pop().is_none() {
                        return Err(XmlError("unbalanced end tag".to_string()));
                    }
                },
                Ok(Event::Text(e)) => {
                    // Only keep text inside an element; whitespace between
                    // top-level nodes carries no information.
                    if let Some(&parent) = stack.last() {
                        let raw = std::str::from_utf8(e.as_ref())
                            .map_err(|e| XmlError(format!("invalid UTF-8 in text: {}", e)))?;
                        let text = tree.nodes.len();
                        tree.nodes.push(Node {
                            kind: NodeKind::Text(unescape(raw)),
                            parent: Some(parent),
                            children: Vec::new(),
                        });
                        let id = NodeId(text);
                        tree.nodes[parent.0].children.push(id);
                    }
                },
                Ok(Event::CData(e)) => {
                    if let Some(&parent) = stack.last() {
                        let raw = std::str::from_utf8(e.as_ref())
                            .map_err(|e| XmlError(format!("invalid UTF-8 in CDATA: {}", e)))?;
                        let text = tree.nodes.len();
                        tree.nodes.push(Node {
                            kind: NodeKind::Text(raw.to_string()),
                            parent: Some(parent),
                            children: Vec::new(),
                        });
                        let id = NodeId(text);
                        tree.nodes[parent.0].children.push(id);
                    }
                },
                Ok(Event::Eof) => break,
                Ok(_) => {},
                Err(e) => return Err(XmlError(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(XmlError("unbalanced start tag".to_string()));
        }
        Ok(tree)
    }

    fn element_from_event(
        &mut self,
        e: &quick_xml::events::BytesStart<'_>,
    ) -> Result<NodeId, XmlError> {
        let name = std::str::from_utf8(e.name().as_ref())
            .map_err(|e| XmlError(format!("invalid UTF-8 in element name: {}", e)))?
            .to_string();
        let mut attrs = Vec::new();
        for attr in e.attributes().flatten() {
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| XmlError(format!("invalid UTF-8 in attribute name: {}", e)))?
                .to_string();
            let value = std::str::from_utf8(&attr.value)
                .map_err(|e| XmlError(format!("invalid UTF-8 in attribute value: {}", e)))?;
            attrs.push((key, unescape(value)));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element { name, attrs },
            parent: None,
            children: Vec::new(),
        });
        Ok(id)
    }

    fn attach(&mut self, parent: Option<NodeId>, id: NodeId) {
        match parent {
            Some(p) => {
                self.nodes[id.0].parent = Some(p);
                self.nodes[p.0].children.push(id);
            },
            None => self.roots.push(id),
        }
    }

    /// Serialize the tree, prefixed with an XML declaration.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.nodes.len() * 32);
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        for &root in &self.roots {
            self.write_node(root, &mut out);
        }
        out.into_bytes()
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                let children = &self.nodes[id.0].children;
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            },
        }
    }

    /// The document's root element, if the tree has one.
    pub fn root_element(&self) -> Option<NodeId> {
        self.roots.iter().copied().find(|id| self.is_element(*id))
    }

    /// Whether the node is an element (as opposed to text).
    #[inline]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Qualified name of an element node, empty for text nodes.
    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => name,
            NodeKind::Text(_) => "",
        }
    }

    /// Local (prefix-stripped) name of an element node.
    pub fn local_name(&self, id: NodeId) -> &str {
        local_part(self.name(id))
    }

    /// Text content of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element { .. } => None,
        }
    }

    /// Look up an attribute.
    ///
    /// A qualified query name (`w:val`) must match exactly; an unqualified
    /// one (`val`) matches on the local part.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let qualified = name.contains(':');
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| if qualified { k == name } else { local_part(k) == name })
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Set (or replace) an attribute on an element node.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(entry) = attrs.iter_mut().find(|(k, _)| k == name) {
                entry.1 = value.to_string();
            } else {
                attrs.push((name.to_string(), value.to_string()));
            }
        }
    }

    /// Children of a node, in document order.
    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Parent of a node, `None` for roots and detached nodes.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Element children whose local name matches.
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |&c| self.local_name(c) == local)
    }

    /// All descendant elements (excluding `id` itself) whose local name
    /// matches, in document order.
    pub fn descendants_named(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.collect_descendants(id, local, &mut found);
        found
    }

    fn collect_descendants(&self, id: NodeId, local: &str, found: &mut Vec<NodeId>) {
        for &child in &self.nodes[id.0].children {
            if self.local_name(child) == local {
                found.push(child);
            }
            self.collect_descendants(child, local, found);
        }
    }

    /// Concatenated text of an element's direct text children.
    pub fn element_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in &self.nodes[id.0].children {
            if let NodeKind::Text(t) = &self.nodes[child.0].kind {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace an element's text content, leaving element children alone.
    pub fn set_element_text(&mut self, id: NodeId, text: &str) {
        let text_children: Vec<NodeId> = self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|&c| !self.is_element(c))
            .collect();
        for child in text_children {
            self.detach(child);
        }
        let t = self.create_text(text);
        self.append_child(id, t);
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element {
                name: name.to_string(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Make a detached node the document root.
    pub fn append_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert a detached node at `index` among `parent`'s children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Insert a detached node immediately before `reference`.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) {
        if let Some(parent) = self.parent(reference) {
            let index = self.position_in_parent(reference).unwrap_or(0);
            self.insert_child(parent, index, child);
        }
    }

    /// Insert a detached node immediately after `reference`.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) {
        if let Some(parent) = self.parent(reference) {
            let index = self.position_in_parent(reference).unwrap_or(0);
            self.insert_child(parent, index + 1, child);
        }
    }

    /// Index of a node among its parent's children.
    pub fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent.0].children.iter().position(|&c| c == id)
    }

    /// Detach a node from its parent. The node (and its subtree) remains
    /// addressable but is no longer part of the document.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Deep-copy a subtree; the copy is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        let children = self.nodes[id.0].children.clone();
        let copy = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.append_child(copy, child_copy);
        }
        copy
    }
}

impl Default for XmlTree {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn local_part(name: &str) -> &str {
    match name.rfind(':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Resolve the five predefined entities and numeric character references.
/// Malformed references are kept literally rather than rejected.
fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            out.push_str(rest);
            return out;
        };
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let resolved = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32);
                match resolved {
                    Some(c) => out.push(c),
                    None => out.push_str(&rest[..=semi]),
                }
            },
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    out
}
