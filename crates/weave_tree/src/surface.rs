//! Output tree capabilities required by the reconciler
//!
//! The reconciler never talks to a concrete document API. It drives any type
//! implementing [`OutputSurface`]: node creation, attribute and child
//! manipulation, plus the handful of read operations needed to compare the
//! previous output against a freshly parsed template.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::{new_key_type, Key};
use weave_core::Result;

/// Attribute carrying a component's id on its root output node
pub const COMPONENT_ID_ATTR: &str = "data-weave-id";

new_key_type! {
    /// Handle to a node of an output tree
    pub struct NodeHandle;
}

impl NodeHandle {
    /// Convert to a raw u64 representation
    ///
    /// This is useful for storing node handles in type-erased contexts such as
    /// error values.
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Create from a raw u64 representation
    ///
    /// The raw value must have been created by `to_raw()`.
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// Kind of an output node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
}

/// An output tree the reconciler can render into
///
/// Structural operations move nodes: inserting a node that already has a
/// parent detaches it first. [`OutputSurface::remove`] detaches a node and
/// discards its whole subtree.
pub trait OutputSurface {
    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    fn create_element(&mut self, tag: &str) -> NodeHandle;

    fn create_text(&mut self, text: &str) -> NodeHandle;

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    fn set_attribute(&mut self, node: NodeHandle, key: &str, value: &str) -> Result<()>;

    fn remove_attribute(&mut self, node: NodeHandle, key: &str) -> Result<()>;

    /// Append `child` as the last child of `parent`
    fn append_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()>;

    /// Insert `child` as the first child of `parent`
    fn prepend(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()>;

    /// Insert `node` immediately before `anchor`, under the anchor's parent
    fn insert_before(&mut self, anchor: NodeHandle, node: NodeHandle) -> Result<()>;

    /// Detach `node` and discard it together with its descendants
    fn remove(&mut self, node: NodeHandle) -> Result<()>;

    /// Set the document title
    fn set_title(&mut self, title: &str);

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Find the node inside `root` (inclusive) whose tagged component id is `id`
    fn query_by_tagged_id(&self, root: NodeHandle, id: &str) -> Option<NodeHandle>;

    /// Resolve `#id` or a bare tag name against the whole document
    fn query_selector(&self, selector: &str) -> Option<NodeHandle>;

    fn node_type(&self, node: NodeHandle) -> Option<NodeType>;

    /// Tag name of an element node
    fn tag(&self, node: NodeHandle) -> Option<&str>;

    /// Content of a text node
    fn text(&self, node: NodeHandle) -> Option<&str>;

    fn attribute(&self, node: NodeHandle, key: &str) -> Option<&str>;

    /// Attributes of an element node, in insertion order
    fn attributes(&self, node: NodeHandle) -> Vec<(String, String)>;

    fn children(&self, node: NodeHandle) -> Vec<NodeHandle>;

    fn parent(&self, node: NodeHandle) -> Option<NodeHandle>;

    /// Check whether `node` still exists
    fn contains(&self, node: NodeHandle) -> bool;
}

/// Output surface shared by every component of an application
pub type SharedSurface = Rc<RefCell<dyn OutputSurface>>;
