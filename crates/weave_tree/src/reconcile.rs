//! Tree reconciliation
//!
//! This module weaves a component's parsed template into the output tree:
//!
//! - **Render mode**: first mount. Every template node is synthesised and
//!   every component slot mounts a fresh child instance.
//! - **Update mode**: the template is re-parsed and compared position by
//!   position against the existing output. Plain nodes are patched in place
//!   when their tag matches, otherwise replaced. A component slot whose old
//!   output node carries the tagged id of a mounted child reuses that child
//!   and runs its own update pass.
//! - **Eager destruction**: output removed during an update tears down every
//!   child instance rooted inside it (descendants first, `after_destroy`
//!   before the node is detached).
//!
//! Child matching is by tag name only. Reordering same-type siblings
//! therefore recreates them instead of moving them.
//!
//! Each template node is dispatched once through [`classify`] into a
//! [`NodeKind`], so the component/plain decision is made in a single place.

use std::rc::Rc;

use tracing::{debug, trace};
use weave_core::{Params, Result, Value};

use crate::component::{ComponentClass, ComponentInstance, ComponentSet};
use crate::surface::{NodeHandle, NodeType, OutputSurface, COMPONENT_ID_ATTR};
use crate::template::{Element, Node};

// =============================================================================
// NodeKind - Match Decision
// =============================================================================

/// How a template node is woven into the output
#[derive(Clone, Copy, Debug)]
pub enum NodeKind<'a> {
    /// An element synthesised directly
    PlainElement(&'a Element),
    /// A text node synthesised directly
    PlainText(&'a str),
    /// An element whose tag names a usable component class
    ComponentSlot {
        class: &'a ComponentClass,
        element: &'a Element,
    },
}

/// Decide how `node` is handled given the owner's usable classes
pub fn classify<'a>(node: &'a Node, components: &'a ComponentSet) -> NodeKind<'a> {
    match node {
        Node::Text(text) => NodeKind::PlainText(text),
        Node::Element(element) => match components.lookup(&element.tag) {
            Some(class) => NodeKind::ComponentSlot { class, element },
            None => NodeKind::PlainElement(element),
        },
    }
}

/// Parameter map for a component slot: attributes as plain strings
pub fn slot_params(element: &Element) -> Params {
    element
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), Value::Str(value.clone())))
        .collect()
}

// =============================================================================
// ReconcileReport
// =============================================================================

/// Summary of the output operations performed by one render or update pass.
///
/// Counts cover the owning instance only; child passes keep their own report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Output nodes synthesised where nothing stood before
    pub created: usize,
    /// Existing elements whose attributes were patched
    pub updated: usize,
    /// Output nodes synthesised in place of an incompatible old node
    pub replaced: usize,
    /// Surplus old output nodes discarded
    pub removed: usize,
    /// Child instances reused by tagged id
    pub reused: usize,
    /// Child instances constructed and mounted
    pub mounted: usize,
    /// Child instances torn down, descendants included
    pub destroyed: usize,
}

impl ReconcileReport {
    /// Returns true if the pass touched the output tree or the child map
    pub fn any(&self) -> bool {
        self.created + self.updated + self.replaced + self.removed + self.mounted + self.destroyed
            > 0
    }
}

/// Where a freshly synthesised node goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Last child of the given parent
    Append(NodeHandle),
    /// Immediately before the given sibling
    Before(NodeHandle),
}

impl Placement {
    fn place(self, surface: &mut dyn OutputSurface, node: NodeHandle) -> Result<()> {
        match self {
            Placement::Append(parent) => surface.append_child(parent, node),
            Placement::Before(anchor) => surface.insert_before(anchor, node),
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Runs one pass for one component instance
pub(crate) struct Reconciler<'a> {
    owner: &'a ComponentInstance,
    report: ReconcileReport,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(owner: &'a ComponentInstance) -> Self {
        Self {
            owner,
            report: ReconcileReport::default(),
        }
    }

    /// Render mode: build the owner's output from scratch at `placement`
    pub(crate) fn render(mut self, placement: Placement) -> Result<ReconcileReport> {
        let template = self.owner.parse_template()?;
        self.render_template(&template, placement)?;
        Ok(self.report)
    }

    fn render_template(&mut self, template: &Element, placement: Placement) -> Result<()> {
        let root = self.synthesize_root(template, placement)?;
        self.render_children(root, &template.children)
    }

    /// Update mode: bring the owner's existing output in line with a
    /// freshly parsed template
    pub(crate) fn update(mut self) -> Result<ReconcileReport> {
        let owner = self.owner;
        let runtime = owner.runtime();
        let template = owner.parse_template()?;

        // The cached root is checked first; the subtree query only runs once
        // that root is gone or has lost its tagged id
        let old_root = runtime.read_surface(|s| {
            let cached = owner.root().filter(|&root| s.contains(root));
            cached
                .filter(|&root| s.attribute(root, COMPONENT_ID_ATTR) == Some(owner.id()))
                .or_else(|| s.query_by_tagged_id(owner.attachment(), owner.id()))
                .or(cached)
        });
        let Some(old_root) = old_root else {
            debug!(id = %owner.id(), "no live output, rendering afresh");
            let placement = Placement::Append(owner.attachment());
            self.render_template(&template, placement)?;
            return Ok(self.report);
        };

        let same_tag = runtime.read_surface(|s| s.tag(old_root) == Some(template.tag.as_str()));
        if same_tag {
            owner.set_root(old_root);
            self.sync_attributes(old_root, &template.attributes, Some(owner.id()))?;
            self.update_children(old_root, &template.children)?;
        } else {
            trace!(id = %owner.id(), tag = %template.tag, "replacing component root");
            // The new root takes the old root's position before the old one goes
            let root = self.synthesize_root(&template, Placement::Before(old_root))?;
            self.report.created -= 1;
            self.report.replaced += 1;
            self.discard(old_root)?;
            self.render_children(root, &template.children)?;
        }
        Ok(self.report)
    }

    fn synthesize_root(&mut self, template: &Element, placement: Placement) -> Result<NodeHandle> {
        let id = self.owner.id();
        let root = self.owner.runtime().with_surface(|s| -> Result<NodeHandle> {
            let root = s.create_element(&template.tag);
            for (key, value) in &template.attributes {
                s.set_attribute(root, key, value)?;
            }
            s.set_attribute(root, COMPONENT_ID_ATTR, id)?;
            placement.place(s, root)?;
            Ok(root)
        })?;
        self.owner.set_root(root);
        self.report.created += 1;
        Ok(root)
    }

    fn render_children(&mut self, parent: NodeHandle, children: &[Node]) -> Result<()> {
        for child in children {
            self.render_node(child, Placement::Append(parent))?;
        }
        Ok(())
    }

    /// Synthesise `node` (recursively) or mount its component at `placement`
    fn render_node(&mut self, node: &Node, placement: Placement) -> Result<()> {
        let owner = self.owner;
        match classify(node, owner.components()) {
            NodeKind::PlainText(text) => {
                owner.runtime().with_surface(|s| {
                    let handle = s.create_text(text);
                    placement.place(s, handle)
                })?;
            }
            NodeKind::PlainElement(element) => {
                let handle = owner.runtime().with_surface(|s| -> Result<NodeHandle> {
                    let handle = s.create_element(&element.tag);
                    for (key, value) in &element.attributes {
                        s.set_attribute(handle, key, value)?;
                    }
                    placement.place(s, handle)?;
                    Ok(handle)
                })?;
                trace!(tag = %element.tag, "synthesised element");
                self.render_children(handle, &element.children)?;
            }
            NodeKind::ComponentSlot { class, element } => {
                self.mount_child(class, element, placement)?;
                return Ok(());
            }
        }
        self.report.created += 1;
        Ok(())
    }

    fn mount_child(
        &mut self,
        class: &ComponentClass,
        element: &Element,
        placement: Placement,
    ) -> Result<()> {
        let owner = self.owner;
        let runtime = owner.runtime();
        let attachment = match placement {
            Placement::Append(parent) => parent,
            Placement::Before(anchor) => runtime
                .read_surface(|s| s.parent(anchor))
                .unwrap_or_else(|| owner.attachment()),
        };

        let child = class.construct(runtime, attachment, slot_params(element))?;
        child.mount_at(placement)?;
        debug!(parent = %owner.id(), child = %child.id(), "child component mounted");
        owner.adopt(child);
        self.report.mounted += 1;
        Ok(())
    }

    /// Position-wise update of `parent`'s children against `template`
    fn update_children(&mut self, parent: NodeHandle, template: &[Node]) -> Result<()> {
        let owner = self.owner;
        let runtime = owner.runtime();
        let old = runtime.read_surface(|s| s.children(parent));

        for (index, node) in template.iter().enumerate() {
            let Some(&old_node) = old.get(index) else {
                self.render_node(node, Placement::Append(parent))?;
                continue;
            };

            match classify(node, owner.components()) {
                NodeKind::ComponentSlot { class, element } => {
                    if let Some(child) = self.reusable_child(old_node, class) {
                        trace!(child = %child.id(), "reusing child component");
                        child.update()?;
                        self.report.reused += 1;
                        continue;
                    }
                    self.mount_child(class, element, Placement::Before(old_node))?;
                    self.discard(old_node)?;
                }
                NodeKind::PlainElement(element) => {
                    let patchable = runtime.read_surface(|s| {
                        s.tag(old_node) == Some(element.tag.as_str())
                            && s.attribute(old_node, COMPONENT_ID_ATTR).is_none()
                    });
                    if patchable {
                        self.sync_attributes(old_node, &element.attributes, None)?;
                        self.update_children(old_node, &element.children)?;
                        continue;
                    }
                    self.replace(node, old_node)?;
                }
                NodeKind::PlainText(text) => {
                    let unchanged = runtime.read_surface(|s| {
                        s.node_type(old_node) == Some(NodeType::Text)
                            && s.text(old_node) == Some(text)
                    });
                    if !unchanged {
                        self.replace(node, old_node)?;
                    }
                }
            }
        }

        for &surplus in old.iter().skip(template.len()) {
            self.discard(surplus)?;
            self.report.removed += 1;
        }
        Ok(())
    }

    /// Synthesise `node` before `old_node`, then discard `old_node`
    fn replace(&mut self, node: &Node, old_node: NodeHandle) -> Result<()> {
        self.render_node(node, Placement::Before(old_node))?;
        self.report.created -= 1;
        self.report.replaced += 1;
        self.discard(old_node)
    }

    /// The mounted child of `class` whose root is `node`, if any
    fn reusable_child(
        &self,
        node: NodeHandle,
        class: &ComponentClass,
    ) -> Option<Rc<ComponentInstance>> {
        let id = self
            .owner
            .runtime()
            .read_surface(|s| s.attribute(node, COMPONENT_ID_ATTR).map(str::to_string))?;
        self.owner
            .child(&id)
            .filter(|child| class.matches(child.name()) && child.root() == Some(node))
    }

    /// Make attributes of `node` equal `desired`, keeping the tagged id
    fn sync_attributes(
        &mut self,
        node: NodeHandle,
        desired: &[(String, String)],
        tagged_id: Option<&str>,
    ) -> Result<()> {
        let changed = self.owner.runtime().with_surface(|s| -> Result<bool> {
            let mut changed = false;
            for (key, _) in s.attributes(node) {
                let keep = desired.iter().any(|(k, _)| *k == key)
                    || (tagged_id.is_some() && key == COMPONENT_ID_ATTR);
                if !keep {
                    s.remove_attribute(node, &key)?;
                    changed = true;
                }
            }
            for (key, value) in desired {
                if s.attribute(node, key) != Some(value.as_str()) {
                    s.set_attribute(node, key, value)?;
                    changed = true;
                }
            }
            if let Some(id) = tagged_id {
                if s.attribute(node, COMPONENT_ID_ATTR) != Some(id) {
                    s.set_attribute(node, COMPONENT_ID_ATTR, id)?;
                }
            }
            Ok(changed)
        })?;

        if changed {
            self.report.updated += 1;
        }
        Ok(())
    }

    /// Tear down every owned child rooted inside `node`, then remove `node`
    fn discard(&mut self, node: NodeHandle) -> Result<()> {
        let owner = self.owner;
        let runtime = owner.runtime();
        let doomed: Vec<Rc<ComponentInstance>> = owner
            .children()
            .into_iter()
            .filter(|child| {
                child
                    .root()
                    .is_some_and(|root| runtime.read_surface(|s| is_within(s, root, node)))
            })
            .collect();

        for child in doomed {
            owner.release(child.id());
            self.report.destroyed += child.teardown()?;
        }
        runtime.with_surface(|s| s.remove(node))
    }
}

/// Whether `node` is `ancestor` or lies beneath it
fn is_within(surface: &dyn OutputSurface, node: NodeHandle, ancestor: NodeHandle) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = surface.parent(n);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentClass};
    use crate::runtime::Runtime;
    use crate::template::parse;
    use weave_core::{state_map, StateMap};

    #[derive(Default)]
    struct Widget;

    impl Component for Widget {
        fn template(&self, _cx: &ComponentInstance) -> String {
            "<span>widget</span>".to_string()
        }
    }

    /// Component whose template is whatever `state.markup` holds
    struct Dynamic {
        markup: &'static str,
    }

    impl Component for Dynamic {
        fn template(&self, cx: &ComponentInstance) -> String {
            cx.state().get_str("markup").unwrap_or_default()
        }

        fn initial_state(&self) -> StateMap {
            state_map([("markup", Value::from(self.markup))])
        }

        fn used_components(&self) -> Vec<ComponentClass> {
            vec![ComponentClass::of::<Widget>("Widget")]
        }
    }

    fn mount_dynamic(markup: &'static str) -> (Rc<ComponentInstance>, Runtime) {
        let (runtime, _tree) = Runtime::headless(3);
        let attachment = runtime.with_surface(|s| s.create_element("main"));
        let class = ComponentClass::new("Dynamic", move |_| Box::new(Dynamic { markup }));
        let instance = class.construct(&runtime, attachment, Params::new()).unwrap();
        instance.mount().unwrap();
        (instance, runtime)
    }

    fn markup(instance: &ComponentInstance, runtime: &Runtime) -> String {
        fn walk(s: &dyn OutputSurface, node: NodeHandle, out: &mut String) {
            if let Some(text) = s.text(node) {
                out.push_str(text);
                return;
            }
            let tag = s.tag(node).unwrap_or_default().to_string();
            out.push('<');
            out.push_str(&tag);
            for (k, v) in s.attributes(node) {
                if k != COMPONENT_ID_ATTR {
                    out.push_str(&format!(" {}=\"{}\"", k, v));
                }
            }
            out.push('>');
            for child in s.children(node) {
                walk(s, child, out);
            }
            out.push_str(&format!("</{}>", tag));
        }
        let mut out = String::new();
        runtime.read_surface(|s| walk(s, instance.root().unwrap(), &mut out));
        out
    }

    #[test]
    fn test_classify() {
        let set = ComponentSet::new(vec![ComponentClass::of::<Widget>("Widget")]);
        let root = parse("<div><WIDGET a=\"1\"></WIDGET><p>x</p>text</div>").unwrap();

        assert!(matches!(
            classify(&root.children[0], &set),
            NodeKind::ComponentSlot { class, .. } if class.name() == "Widget"
        ));
        assert!(matches!(
            classify(&root.children[1], &set),
            NodeKind::PlainElement(el) if el.tag == "p"
        ));
        assert!(matches!(classify(&root.children[2], &set), NodeKind::PlainText("text")));
    }

    #[test]
    fn test_slot_params_are_strings() {
        let root = parse("<widget foo=\"1\" flag></widget>").unwrap();
        let params = slot_params(&root);
        assert_eq!(params.get("foo"), Some(&Value::from("1")));
        assert_eq!(params.get("flag"), Some(&Value::from("")));
    }

    #[test]
    fn test_render_report() {
        let (instance, runtime) = mount_dynamic("<div><p>a</p><widget></widget></div>");
        let report = instance.last_report();
        // div, p and the text inside p
        assert_eq!(report.created, 3);
        assert_eq!(report.mounted, 1);
        assert_eq!(
            markup(&instance, &runtime),
            "<div><p>a</p><span>widget</span></div>"
        );
    }

    #[test]
    fn test_update_patches_attributes_in_place() {
        let (instance, runtime) = mount_dynamic("<div><p class=\"a\" title=\"t\">x</p></div>");
        let p = runtime.read_surface(|s| s.children(instance.root().unwrap())[0]);

        instance
            .state()
            .set("markup", "<div><p class=\"b\">x</p></div>")
            .unwrap();

        let report = instance.last_report();
        assert_eq!(report.updated, 1);
        assert_eq!(report.replaced, 0);
        assert_eq!(runtime.read_surface(|s| s.children(instance.root().unwrap())[0]), p);
        assert_eq!(markup(&instance, &runtime), "<div><p class=\"b\">x</p></div>");
    }

    #[test]
    fn test_update_replaces_changed_tags_and_text() {
        let (instance, runtime) = mount_dynamic("<div><p>x</p>one</div>");
        instance.state().set("markup", "<div><h2>x</h2>two</div>").unwrap();

        let report = instance.last_report();
        assert_eq!(report.replaced, 2);
        assert_eq!(markup(&instance, &runtime), "<div><h2>x</h2>two</div>");
    }

    #[test]
    fn test_update_appends_and_removes_surplus() {
        let (instance, runtime) = mount_dynamic("<ul><li>1</li></ul>");
        instance
            .state()
            .set("markup", "<ul><li>1</li><li>2</li><li>3</li></ul>")
            .unwrap();
        assert_eq!(instance.last_report().created, 4);
        assert_eq!(
            markup(&instance, &runtime),
            "<ul><li>1</li><li>2</li><li>3</li></ul>"
        );

        instance.state().set("markup", "<ul><li>1</li></ul>").unwrap();
        assert_eq!(instance.last_report().removed, 2);
        assert_eq!(markup(&instance, &runtime), "<ul><li>1</li></ul>");
    }

    #[test]
    fn test_root_tag_change_keeps_position_and_id() {
        let (instance, runtime) = mount_dynamic("<div>x</div>");
        let attachment = instance.attachment();
        let sibling = runtime.with_surface(|s| {
            let sibling = s.create_element("footer");
            s.append_child(attachment, sibling).unwrap();
            sibling
        });
        let old_root = instance.root().unwrap();

        instance.state().set("markup", "<section>x</section>").unwrap();

        let new_root = instance.root().unwrap();
        assert_ne!(new_root, old_root);
        runtime.read_surface(|s| {
            assert!(!s.contains(old_root));
            assert_eq!(s.children(attachment), vec![new_root, sibling]);
            assert_eq!(s.attribute(new_root, COMPONENT_ID_ATTR), Some(instance.id()));
        });
        assert_eq!(instance.last_report().replaced, 1);
    }

    #[test]
    fn test_component_slot_over_plain_node_mounts_child() {
        let (instance, runtime) = mount_dynamic("<div><p>x</p></div>");
        assert_eq!(instance.child_count(), 0);

        instance.state().set("markup", "<div><widget></widget></div>").unwrap();
        assert_eq!(instance.child_count(), 1);
        assert_eq!(instance.last_report().mounted, 1);
        assert_eq!(markup(&instance, &runtime), "<div><span>widget</span></div>");

        instance.state().set("markup", "<div><p>y</p></div>").unwrap();
        assert_eq!(instance.child_count(), 0);
        assert_eq!(instance.last_report().destroyed, 1);
    }

    #[test]
    fn test_inline_whitespace_rendered() {
        let (instance, runtime) = mount_dynamic("<p><b>Hello</b> <i>world</i></p>");
        assert_eq!(
            markup(&instance, &runtime),
            "<p><b>Hello</b> <i>world</i></p>"
        );

        instance
            .state()
            .set("markup", "<p><b>Hello</b> <i>there</i></p>")
            .unwrap();
        assert_eq!(
            markup(&instance, &runtime),
            "<p><b>Hello</b> <i>there</i></p>"
        );
    }

    #[test]
    fn test_update_prefers_cached_root() {
        let (instance, runtime) = mount_dynamic("<div>x</div>");
        let attachment = instance.attachment();
        let root = instance.root().unwrap();
        // An earlier node carrying the same tagged id
        let decoy = runtime.with_surface(|s| {
            let decoy = s.create_element("div");
            s.set_attribute(decoy, COMPONENT_ID_ATTR, instance.id()).unwrap();
            s.prepend(attachment, decoy).unwrap();
            decoy
        });

        instance.state().set("markup", "<div>y</div>").unwrap();

        assert_eq!(instance.root(), Some(root));
        assert_eq!(markup(&instance, &runtime), "<div>y</div>");
        runtime.read_surface(|s| assert!(s.children(decoy).is_empty()));
    }

    #[test]
    fn test_update_finds_root_by_tagged_id() {
        let (instance, runtime) = mount_dynamic("<div>x</div>");
        let attachment = instance.attachment();
        let root = instance.root().unwrap();
        runtime
            .with_surface(|s| s.remove_attribute(root, COMPONENT_ID_ATTR))
            .unwrap();
        let tagged = runtime.with_surface(|s| {
            let tagged = s.create_element("div");
            s.set_attribute(tagged, COMPONENT_ID_ATTR, instance.id()).unwrap();
            s.append_child(attachment, tagged).unwrap();
            tagged
        });

        instance.state().set("markup", "<div>y</div>").unwrap();

        runtime.read_surface(|s| {
            assert_eq!(s.children(tagged).len(), 1);
            assert_eq!(s.text(s.children(tagged)[0]), Some("y"));
            assert_eq!(s.text(s.children(root)[0]), Some("x"));
        });
        assert_eq!(instance.root(), Some(tagged));
    }

    #[test]
    fn test_report_any() {
        assert!(!ReconcileReport::default().any());
        let reused_only = ReconcileReport {
            reused: 2,
            ..Default::default()
        };
        assert!(!reused_only.any());
    }
}
