//! In-memory document the runtime mounts into
//!
//! Nodes live in an arena keyed by [`NodeId`]. Ids are never reused, so a
//! handle to a removed node stays dead instead of aliasing a newer node.

use crate::value::{format_number, Object, Value};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

pub type NodeId = usize;

/// Elements serialized without a closing tag
static VOID_ELEMENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
    ]
    .into_iter()
    .collect()
});

/// Style properties whose numeric values take no `px` suffix
static UNITLESS_STYLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "animationIterationCount",
        "aspectRatio",
        "columnCount",
        "columns",
        "flex",
        "flexGrow",
        "flexShrink",
        "fontWeight",
        "gridArea",
        "gridColumn",
        "gridColumnEnd",
        "gridColumnStart",
        "gridRow",
        "gridRowEnd",
        "gridRowStart",
        "lineClamp",
        "lineHeight",
        "opacity",
        "order",
        "orphans",
        "scale",
        "tabSize",
        "widows",
        "zIndex",
        "zoom",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Event listeners keyed by lower-case event type (`click`, `change`)
    pub listeners: Vec<(String, Value)>,
}

impl std::fmt::Debug for ElementData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementData")
            .field("tag", &self.tag)
            .field("attributes", &self.attributes)
            .field("listeners", &self.listeners.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

pub struct Document {
    nodes: HashMap<NodeId, Node>,
    next_id: NodeId,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document containing only `<body>`
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: HashMap::new(),
            next_id: 0,
            body: 0,
        };
        doc.body = doc.create_element("body");
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.insert(NodeKind::Element(ElementData {
            tag: tag.to_string(),
            attributes: Vec::new(),
            listeners: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.insert(NodeKind::Text(text.to_string()))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(&id)?.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|data| data.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(data) = self.element_mut(id) {
            match data.attributes.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => data.attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(data) = self.element_mut(id) {
            data.attributes.retain(|(k, _)| k != name);
        }
    }

    pub fn add_listener(&mut self, id: NodeId, event: &str, handler: Value) {
        if let Some(data) = self.element_mut(id) {
            data.listeners.push((event.to_string(), handler));
        }
    }

    pub fn listeners(&self, id: NodeId, event: &str) -> Vec<Value> {
        self.element(id)
            .map(|data| {
                data.listeners
                    .iter()
                    .filter(|(k, _)| k == event)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.parent(child) {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|&c| c != child);
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// Insert `child` under `parent` before `reference`, or at the end
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if !self.contains(parent) || !self.contains(child) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            let index = reference
                .and_then(|r| node.children.iter().position(|&c| c == r))
                .unwrap_or(node.children.len());
            node.children.insert(index, child);
        }
    }

    /// Detach a node and free it together with its whole subtree
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children);
            }
        }
    }

    /// Free every descendant of `id`, keeping `id` itself
    pub fn clear_children(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(&id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.parent = None;
            }
            self.remove(child);
        }
    }

    /// Number of nodes currently allocated, attached or not
    pub fn live_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Attached nodes under `root` in document order
    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .find(|&id| self.attribute(id, "id") == Some(element_id))
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|&id| self.tag(id) == Some(tag))
            .collect()
    }

    pub fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|&id| {
                self.attribute(id, "class")
                    .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
            })
            .collect()
    }

    /// `id` and its ancestors, innermost first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = Some(id);
        while let Some(next) = current {
            if !self.contains(next) {
                break;
            }
            out.push(next);
            current = self.parent(next);
        }
        out
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(Node {
                kind: NodeKind::Text(text),
                ..
            }) = self.nodes.get(&node)
            {
                out.push_str(text);
            }
        }
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element(data) => {
                let _ = write!(out, "<{}", data.tag);
                for (name, value) in &data.attributes {
                    if value.is_empty() {
                        let _ = write!(out, " {}", name);
                    } else {
                        let _ = write!(out, " {}=\"{}\"", name, escape_attribute(value));
                    }
                }
                out.push('>');
                if VOID_ELEMENTS.contains(data.tag.as_str()) {
                    return;
                }
                for &child in &node.children {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{}>", data.tag);
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// `backgroundColor` → `background-color`, `WebkitTransform` → `-webkit-transform`
fn css_property_name(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            if i == 0 && name.starts_with("ms") && name[2..].starts_with(|c: char| c.is_ascii_uppercase()) {
                out.push('-');
            }
            out.push(c);
        }
    }
    out
}

/// Serialize a style object to a `style` attribute value
pub fn style_to_css(style: &Object) -> String {
    let mut out = String::new();
    for (name, value) in style.entries() {
        let value = match value {
            Value::Undefined | Value::Null | Value::Bool(_) => continue,
            Value::Number(n) if *n != 0.0 && !UNITLESS_STYLES.contains(name.as_str()) && !name.starts_with("--") => {
                format!("{}px", format_number(*n))
            }
            Value::String(s) if s.is_empty() => continue,
            other => other.to_js_string(),
        };
        let _ = write!(out, "{}:{};", css_property_name(name), value.trim());
    }
    out.pop();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        doc.set_attribute(root, "id", "preview-root");
        doc.append_child(doc.body(), root);
        let p = doc.create_element("p");
        let text = doc.create_text("a < b & c");
        doc.append_child(p, text);
        doc.append_child(root, p);
        (doc, root)
    }

    #[test]
    fn test_lookup_and_serialize() {
        let (doc, root) = sample();
        assert_eq!(doc.get_element_by_id("preview-root"), Some(root));
        assert_eq!(doc.inner_html(root), "<p>a &lt; b &amp; c</p>");
        assert_eq!(doc.text_content(root), "a < b & c");
    }

    #[test]
    fn test_clear_children_frees_subtree() {
        let (mut doc, root) = sample();
        assert_eq!(doc.live_node_count(), 4);
        doc.clear_children(root);
        assert_eq!(doc.live_node_count(), 2);
        assert!(doc.children(root).is_empty());
    }

    #[test]
    fn test_detached_nodes_not_found() {
        let mut doc = Document::new();
        let orphan = doc.create_element("div");
        doc.set_attribute(orphan, "id", "x");
        assert_eq!(doc.get_element_by_id("x"), None);
    }

    #[test]
    fn test_removed_ids_stay_dead() {
        let (mut doc, root) = sample();
        let p = doc.children(root)[0];
        doc.remove(p);
        let fresh = doc.create_element("span");
        assert_ne!(fresh, p);
        assert!(!doc.contains(p));
    }

    #[test]
    fn test_void_and_boolean_attributes() {
        let mut doc = Document::new();
        let input = doc.create_element("input");
        doc.set_attribute(input, "disabled", "");
        doc.set_attribute(input, "value", "say \"hi\"");
        assert_eq!(doc.outer_html(input), "<input disabled value=\"say &quot;hi&quot;\">");
    }

    #[test]
    fn test_insert_before() {
        let (mut doc, root) = sample();
        let banner = doc.create_element("div");
        let first = doc.children(root)[0];
        doc.insert_before(root, banner, Some(first));
        assert_eq!(doc.children(root), &[banner, first]);
    }

    #[test]
    fn test_style_to_css() {
        let style = Object::with_props(vec![
            ("padding".to_string(), Value::Number(20.0)),
            ("height".to_string(), Value::string("100%")),
            ("zIndex".to_string(), Value::Number(2.0)),
            ("backgroundColor".to_string(), Value::string("#fff")),
            ("margin".to_string(), Value::Number(0.0)),
            ("color".to_string(), Value::Null),
        ]);
        assert_eq!(
            style_to_css(&style),
            "padding:20px;height:100%;z-index:2;background-color:#fff;margin:0"
        );
    }
}
