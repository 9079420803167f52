//! In-memory output tree
//!
//! [`OutputTree`] is a slotmap arena implementing [`OutputSurface`]. It plays
//! the role of the live document for headless hosts and tests, and can be
//! built from markup and serialised back for inspection.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;
use weave_core::{Result, WeaveError};

use crate::surface::{NodeHandle, NodeType, OutputSurface, COMPONENT_ID_ATTR};
use crate::template::{self, escape_html, Node};

/// Tag of the document root node
pub const DOCUMENT_TAG: &str = "#document";

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "hr", "img", "input", "link", "meta", "source", "wbr",
];

#[derive(Clone, Debug)]
enum OutputKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Clone, Debug)]
struct OutputNode {
    kind: OutputKind,
    parent: Option<NodeHandle>,
    children: SmallVec<[NodeHandle; 4]>,
}

/// Arena-backed output tree with a document root
#[derive(Debug)]
pub struct OutputTree {
    nodes: SlotMap<NodeHandle, OutputNode>,
    document: NodeHandle,
    title: String,
}

impl Default for OutputTree {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputTree {
    /// Create an empty document
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let document = nodes.insert(OutputNode {
            kind: OutputKind::Element {
                tag: DOCUMENT_TAG.to_string(),
                attributes: Vec::new(),
            },
            parent: None,
            children: SmallVec::new(),
        });
        Self {
            nodes,
            document,
            title: String::new(),
        }
    }

    /// Build a document whose top-level nodes come from `markup`
    pub fn from_markup(markup: &str) -> Result<Self> {
        let mut tree = Self::new();
        let document = tree.document;
        for node in template::parse_fragment(markup)? {
            let handle = tree.build(&node);
            tree.append_child(document, handle)?;
        }
        Ok(tree)
    }

    /// Wrap the tree for sharing with a runtime
    pub fn into_shared(self) -> Rc<RefCell<OutputTree>> {
        Rc::new(RefCell::new(self))
    }

    fn build(&mut self, node: &Node) -> NodeHandle {
        match node {
            Node::Text(text) => self.create_text(text),
            Node::Element(el) => {
                let handle = self.create_element(&el.tag);
                if let Some(OutputKind::Element { attributes, .. }) =
                    self.nodes.get_mut(handle).map(|n| &mut n.kind)
                {
                    attributes.extend(el.attributes.iter().cloned());
                }
                for child in &el.children {
                    let child = self.build(child);
                    self.attach(handle, child, None);
                }
                handle
            }
        }
    }

    /// The document root
    pub fn document(&self) -> NodeHandle {
        self.document
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of live nodes, document root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Serialise the subtree at `node` as markup
    pub fn to_markup(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out, false);
        out
    }

    /// Serialise the subtree at `node`, leaving out tagged component ids
    pub fn to_markup_untagged(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out, true);
        out
    }

    fn write_markup(&self, node: NodeHandle, out: &mut String, skip_ids: bool) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        match &n.kind {
            OutputKind::Text(text) => out.push_str(&escape_html(text)),
            OutputKind::Element { tag, .. } if tag == DOCUMENT_TAG => {
                for &child in &n.children {
                    self.write_markup(child, out, skip_ids);
                }
            }
            OutputKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attributes {
                    if skip_ids && key == COMPONENT_ID_ATTR {
                        continue;
                    }
                    let _ = write!(out, " {}=\"{}\"", key, escape_html(value));
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for &child in &n.children {
                    self.write_markup(child, out, skip_ids);
                }
                let _ = write!(out, "</{}>", tag);
            }
        }
    }

    /// Preorder walk of the subtree at `root`
    fn descendants(&self, root: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let Some(n) = self.nodes.get(node) else {
                continue;
            };
            out.push(node);
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    fn check(&self, node: NodeHandle) -> Result<()> {
        if self.nodes.contains_key(node) {
            Ok(())
        } else {
            Err(WeaveError::StaleNode {
                node: node.to_raw(),
            })
        }
    }

    fn element_attributes_mut(&mut self, node: NodeHandle) -> Result<&mut Vec<(String, String)>> {
        match self.nodes.get_mut(node).map(|n| &mut n.kind) {
            Some(OutputKind::Element { attributes, .. }) => Ok(attributes),
            // Text nodes carry no attributes
            _ => Err(WeaveError::StaleNode {
                node: node.to_raw(),
            }),
        }
    }

    /// Remove `node` from its parent's child list
    fn detach(&mut self, node: NodeHandle) {
        let Some(parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|c| *c != node);
        }
    }

    /// Attach `child` under `parent` at `index` (end when `None`)
    fn attach(&mut self, parent: NodeHandle, child: NodeHandle, index: Option<usize>) {
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            match index {
                Some(i) if i <= p.children.len() => p.children.insert(i, child),
                _ => p.children.push(child),
            }
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn is_ancestor_or_self(&self, candidate: NodeHandle, node: NodeHandle) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == candidate {
                return true;
            }
            current = self.nodes.get(n).and_then(|n| n.parent);
        }
        false
    }
}

impl OutputSurface for OutputTree {
    fn create_element(&mut self, tag: &str) -> NodeHandle {
        self.nodes.insert(OutputNode {
            kind: OutputKind::Element {
                tag: tag.to_ascii_lowercase(),
                attributes: Vec::new(),
            },
            parent: None,
            children: SmallVec::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeHandle {
        self.nodes.insert(OutputNode {
            kind: OutputKind::Text(text.to_string()),
            parent: None,
            children: SmallVec::new(),
        })
    }

    fn set_attribute(&mut self, node: NodeHandle, key: &str, value: &str) -> Result<()> {
        let attributes = self.element_attributes_mut(node)?;
        match attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => attributes.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn remove_attribute(&mut self, node: NodeHandle, key: &str) -> Result<()> {
        self.element_attributes_mut(node)?.retain(|(k, _)| k != key);
        Ok(())
    }

    fn append_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        self.check(parent)?;
        self.check(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(WeaveError::StaleNode {
                node: child.to_raw(),
            });
        }
        self.attach(parent, child, None);
        Ok(())
    }

    fn prepend(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        self.check(parent)?;
        self.check(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(WeaveError::StaleNode {
                node: child.to_raw(),
            });
        }
        self.attach(parent, child, Some(0));
        Ok(())
    }

    fn insert_before(&mut self, anchor: NodeHandle, node: NodeHandle) -> Result<()> {
        self.check(node)?;
        let parent = self
            .nodes
            .get(anchor)
            .and_then(|n| n.parent)
            .ok_or(WeaveError::StaleNode {
                node: anchor.to_raw(),
            })?;
        if node == anchor || self.is_ancestor_or_self(node, parent) {
            return Err(WeaveError::StaleNode {
                node: node.to_raw(),
            });
        }

        self.detach(node);
        let index = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == anchor);
        self.attach(parent, node, index);
        Ok(())
    }

    fn remove(&mut self, node: NodeHandle) -> Result<()> {
        self.check(node)?;
        if node == self.document {
            return Err(WeaveError::StaleNode {
                node: node.to_raw(),
            });
        }
        self.detach(node);
        for handle in self.descendants(node) {
            self.nodes.remove(handle);
        }
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn query_by_tagged_id(&self, root: NodeHandle, id: &str) -> Option<NodeHandle> {
        self.descendants(root)
            .into_iter()
            .find(|&node| self.attribute(node, COMPONENT_ID_ATTR) == Some(id))
    }

    fn query_selector(&self, selector: &str) -> Option<NodeHandle> {
        let selector = selector.trim();
        let mut nodes = self.descendants(self.document).into_iter().skip(1);
        match selector.strip_prefix('#') {
            Some(id) => nodes.find(|&node| self.attribute(node, "id") == Some(id)),
            None => nodes.find(|&node| {
                self.tag(node)
                    .is_some_and(|tag| tag.eq_ignore_ascii_case(selector))
            }),
        }
    }

    fn node_type(&self, node: NodeHandle) -> Option<NodeType> {
        self.nodes.get(node).map(|n| match n.kind {
            OutputKind::Element { .. } => NodeType::Element,
            OutputKind::Text(_) => NodeType::Text,
        })
    }

    fn tag(&self, node: NodeHandle) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            OutputKind::Element { tag, .. } => Some(tag),
            OutputKind::Text(_) => None,
        }
    }

    fn text(&self, node: NodeHandle) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            OutputKind::Text(text) => Some(text),
            OutputKind::Element { .. } => None,
        }
    }

    fn attribute(&self, node: NodeHandle, key: &str) -> Option<&str> {
        match &self.nodes.get(node)?.kind {
            OutputKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            OutputKind::Text(_) => None,
        }
    }

    fn attributes(&self, node: NodeHandle) -> Vec<(String, String)> {
        match self.nodes.get(node).map(|n| &n.kind) {
            Some(OutputKind::Element { attributes, .. }) => attributes.clone(),
            _ => Vec::new(),
        }
    }

    fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .get(node)
            .map(|n| n.children.to_vec())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(node)?.parent
    }

    fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(node)
    }
}
