//! Components and component instances
//!
//! A concrete component implements [`Component`]: it supplies a template, its
//! initial state, the component classes its template may use and, optionally,
//! lifecycle hooks. A [`ComponentClass`] pairs a declared name with a factory
//! for that behaviour, and is what parents list in `used_components`.
//!
//! [`ComponentInstance`] is the live unit of composition. It owns:
//!
//! - a process-unique id issued by the shared registry
//! - the parameter map its parent supplied (read-only)
//! - a [`ReactiveState`] whose writes run an update pass on this instance
//! - the ordered map of mounted child instances, keyed by their ids
//! - the attachment point and root of its output subtree
//!
//! # Lifecycle
//!
//! ```text
//! constructed -> before_mount -> render -> after_mount
//!             -> (state write -> update -> after_update)*
//!             -> after_destroy
//! ```
//!
//! # Example
//!
//! ```
//! use weave_core::{state_map, StateMap, Value};
//! use weave_tree::component::{Component, ComponentClass, ComponentInstance};
//! use weave_tree::runtime::Runtime;
//! use weave_tree::surface::OutputSurface;
//!
//! #[derive(Default)]
//! struct Greeting;
//!
//! impl Component for Greeting {
//!     fn template(&self, _cx: &ComponentInstance) -> String {
//!         "<p>{state.text}</p>".into()
//!     }
//!
//!     fn initial_state(&self) -> StateMap {
//!         state_map([("text", Value::from("hello"))])
//!     }
//! }
//!
//! let (runtime, tree) = Runtime::headless(1);
//! let body = runtime.with_surface(|s| s.create_element("body"));
//! let greeting = ComponentClass::of::<Greeting>("Greeting")
//!     .construct(&runtime, body, Default::default())
//!     .unwrap();
//! greeting.mount().unwrap();
//!
//! greeting.state().set("text", "bye").unwrap();
//! let root = greeting.root().unwrap();
//! assert_eq!(tree.borrow().to_markup_untagged(root), "<p>bye</p>");
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};
use weave_core::{Params, ReactiveState, Result, StateMap};

use crate::reconcile::{Placement, ReconcileReport, Reconciler};
use crate::runtime::Runtime;
use crate::surface::NodeHandle;
use crate::template::{self, Element, PlaceholderScope};

// =============================================================================
// Component - Extension Points
// =============================================================================

/// Behaviour of a concrete component.
///
/// Hooks receive the instance they belong to and default to no-ops. Errors
/// returned from a hook abort the pass that invoked it.
pub trait Component: 'static {
    /// Markup for this component. `{state.key}` and `{params.key}`
    /// placeholders are substituted before parsing.
    fn template(&self, cx: &ComponentInstance) -> String;

    fn initial_state(&self) -> StateMap {
        StateMap::new()
    }

    /// Classes whose tag names this component's template may use
    fn used_components(&self) -> Vec<ComponentClass> {
        Vec::new()
    }

    fn before_mount(&self, _cx: &ComponentInstance) -> Result<()> {
        Ok(())
    }

    fn after_mount(&self, _cx: &ComponentInstance) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _cx: &ComponentInstance) -> Result<()> {
        Ok(())
    }

    fn after_destroy(&self, _cx: &ComponentInstance) -> Result<()> {
        Ok(())
    }
}

type Factory = dyn Fn(&Params) -> Box<dyn Component>;

// =============================================================================
// ComponentClass
// =============================================================================

/// A named, instantiable component descriptor
#[derive(Clone)]
pub struct ComponentClass {
    name: Rc<str>,
    factory: Rc<Factory>,
}

impl ComponentClass {
    /// Create a class from a behaviour factory
    pub fn new<F>(name: impl Into<Rc<str>>, factory: F) -> Self
    where
        F: Fn(&Params) -> Box<dyn Component> + 'static,
    {
        Self {
            name: name.into(),
            factory: Rc::new(factory),
        }
    }

    /// Class for a component type constructed with `Default`
    pub fn of<C: Component + Default>(name: impl Into<Rc<str>>) -> Self {
        Self::new(name, |_| Box::new(C::default()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive tag match
    pub fn matches(&self, tag: &str) -> bool {
        self.name.eq_ignore_ascii_case(tag)
    }

    /// Construct an instance attached under `attachment`
    pub fn construct(
        &self,
        runtime: &Runtime,
        attachment: NodeHandle,
        params: Params,
    ) -> Result<Rc<ComponentInstance>> {
        let behavior = (self.factory)(&params);
        ComponentInstance::new(runtime.clone(), attachment, self.name(), params, behavior)
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentClass").field(&self.name).finish()
    }
}

/// Lookup table from lower-cased tag name to component class
#[derive(Clone, Debug, Default)]
pub struct ComponentSet {
    classes: FxHashMap<String, ComponentClass>,
}

impl ComponentSet {
    /// Build the table. When two classes share a name the first one wins.
    pub fn new(classes: impl IntoIterator<Item = ComponentClass>) -> Self {
        let mut map = FxHashMap::default();
        for class in classes {
            let key = class.name().to_ascii_lowercase();
            if map.contains_key(&key) {
                warn!(name = %class.name(), "duplicate component class name, keeping the first");
                continue;
            }
            map.insert(key, class);
        }
        Self { classes: map }
    }

    /// Class matching `tag`, ignoring case
    pub fn lookup(&self, tag: &str) -> Option<&ComponentClass> {
        self.classes.get(&tag.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

// =============================================================================
// ComponentInstance
// =============================================================================

/// Lifecycle phase of an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Created,
    Mounted,
    Destroyed,
}

/// A live component
pub struct ComponentInstance {
    id: String,
    name: String,
    params: Params,
    state: Rc<ReactiveState>,
    behavior: Box<dyn Component>,
    components: ComponentSet,
    children: RefCell<IndexMap<String, Rc<ComponentInstance>>>,
    /// The instance whose children map holds this one
    parent: RefCell<Weak<ComponentInstance>>,
    this: Weak<ComponentInstance>,
    attachment: NodeHandle,
    root: Cell<Option<NodeHandle>>,
    phase: Cell<Phase>,
    /// A render or update pass is running
    in_pass: Cell<bool>,
    /// Writes that landed during a running pass
    deferred_updates: Cell<usize>,
    render_count: Cell<u64>,
    update_count: Cell<u64>,
    last_report: Cell<ReconcileReport>,
    runtime: Runtime,
}

impl ComponentInstance {
    /// Create an instance and issue its id.
    ///
    /// The state container is bound to this instance's update pass.
    pub fn new(
        runtime: Runtime,
        attachment: NodeHandle,
        name: &str,
        params: Params,
        behavior: Box<dyn Component>,
    ) -> Result<Rc<Self>> {
        let id = runtime.registry().borrow_mut().issue_id(name)?;
        let initial = behavior.initial_state();
        let components = ComponentSet::new(behavior.used_components());
        debug!(id = %id, name, "component constructed");

        Ok(Rc::new_cyclic(|this: &Weak<Self>| {
            let weak = this.clone();
            let state = ReactiveState::new(initial, move || match weak.upgrade() {
                Some(instance) => instance.update(),
                None => Ok(()),
            });

            Self {
                id,
                name: name.to_string(),
                params,
                state: Rc::new(state),
                behavior,
                components,
                children: RefCell::new(IndexMap::new()),
                parent: RefCell::new(Weak::new()),
                this: this.clone(),
                attachment,
                root: Cell::new(None),
                phase: Cell::new(Phase::Created),
                in_pass: Cell::new(false),
                deferred_updates: Cell::new(0),
                render_count: Cell::new(0),
                update_count: Cell::new(0),
                last_report: Cell::new(ReconcileReport::default()),
                runtime,
            }
        }))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn state(&self) -> &ReactiveState {
        &self.state
    }

    /// Owned handle to the state, for deferred tasks
    pub fn state_handle(&self) -> Rc<ReactiveState> {
        self.state.clone()
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    /// Output node this instance was attached under
    pub fn attachment(&self) -> NodeHandle {
        self.attachment
    }

    /// Root of this instance's output subtree, once rendered
    pub fn root(&self) -> Option<NodeHandle> {
        self.root.get()
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.phase.get() == Phase::Mounted
    }

    /// Mounted children in mount order
    pub fn children(&self) -> Vec<Rc<ComponentInstance>> {
        self.children.borrow().values().cloned().collect()
    }

    pub fn child(&self, id: &str) -> Option<Rc<ComponentInstance>> {
        self.children.borrow().get(id).cloned()
    }

    pub fn child_ids(&self) -> Vec<String> {
        self.children.borrow().keys().cloned().collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// The instance that mounted this one, while both are alive
    pub fn parent(&self) -> Option<Rc<ComponentInstance>> {
        self.parent.borrow().upgrade()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Completed render passes
    pub fn render_count(&self) -> u64 {
        self.render_count.get()
    }

    /// Completed update passes
    pub fn update_count(&self) -> u64 {
        self.update_count.get()
    }

    pub fn last_report(&self) -> ReconcileReport {
        self.last_report.get()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Mount as the last child of the attachment point
    pub fn mount(&self) -> Result<()> {
        self.mount_at(Placement::Append(self.attachment))
    }

    /// Produce this instance's output: mounts a fresh instance, updates a
    /// mounted one. Destroyed instances are left alone.
    pub fn render(&self) -> Result<()> {
        match self.phase.get() {
            Phase::Created => self.mount(),
            Phase::Mounted => self.update(),
            Phase::Destroyed => {
                warn!(id = %self.id, "render on destroyed component ignored");
                Ok(())
            }
        }
    }

    pub(crate) fn mount_at(&self, placement: Placement) -> Result<()> {
        if self.phase.get() != Phase::Created {
            warn!(id = %self.id, phase = ?self.phase.get(), "component already mounted");
            return Ok(());
        }

        self.behavior.before_mount(self)?;

        self.in_pass.set(true);
        let result = Reconciler::new(self).render(placement);
        self.in_pass.set(false);
        let report = result?;

        self.render_count.set(self.render_count.get() + 1);
        self.last_report.set(report);
        self.phase.set(Phase::Mounted);
        debug!(id = %self.id, children = self.child_count(), "component mounted");

        self.behavior.after_mount(self)
    }

    /// Run an update pass against the current state.
    ///
    /// Called by the state container after every committed write. Does
    /// nothing unless the instance is mounted. A call that arrives while a
    /// pass is running is queued and run once that pass finishes.
    pub fn update(&self) -> Result<()> {
        if self.phase.get() != Phase::Mounted {
            trace!(id = %self.id, phase = ?self.phase.get(), "update skipped");
            return Ok(());
        }
        if self.in_pass.get() {
            self.deferred_updates.set(self.deferred_updates.get() + 1);
            trace!(id = %self.id, "update deferred until the running pass ends");
            return Ok(());
        }

        self.run_update()?;
        while self.deferred_updates.get() > 0 && self.is_mounted() {
            self.deferred_updates.set(self.deferred_updates.get() - 1);
            self.run_update()?;
        }
        Ok(())
    }

    fn run_update(&self) -> Result<()> {
        self.in_pass.set(true);
        let result = Reconciler::new(self).update();
        self.in_pass.set(false);

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.deferred_updates.set(0);
                warn!(id = %self.id, error = %err, "update pass abandoned");
                return Err(err);
            }
        };

        self.update_count.set(self.update_count.get() + 1);
        self.last_report.set(report);
        debug!(
            id = %self.id,
            version = self.state.version(),
            created = report.created,
            replaced = report.replaced,
            reused = report.reused,
            destroyed = report.destroyed,
            "component updated"
        );

        self.behavior.after_update(self)
    }

    /// Destroy this instance and its descendants, then remove its output.
    ///
    /// The instance is also dropped from its parent's children, so the
    /// parent's next pass mounts a fresh child at the vacated slot.
    pub fn unmount(&self) -> Result<usize> {
        let parent = self.parent.replace(Weak::new()).upgrade();
        if let Some(parent) = parent {
            parent.release(&self.id);
        }

        let root = self.root.get();
        let destroyed = self.teardown()?;
        if let Some(root) = root {
            self.runtime.with_surface(|s| {
                if s.contains(root) {
                    s.remove(root)
                } else {
                    Ok(())
                }
            })?;
        }
        Ok(destroyed)
    }

    /// Destroy descendants first, then this instance. Output is left in
    /// place for the caller to detach. Returns the number of instances
    /// destroyed.
    pub(crate) fn teardown(&self) -> Result<usize> {
        if self.phase.get() == Phase::Destroyed {
            return Ok(0);
        }

        let children: Vec<_> = self.children.borrow_mut().drain(..).map(|(_, c)| c).collect();
        let mut destroyed = 0;
        for child in children {
            destroyed += child.teardown()?;
        }

        self.phase.set(Phase::Destroyed);
        self.deferred_updates.set(0);
        debug!(id = %self.id, "component destroyed");
        self.behavior.after_destroy(self)?;
        self.root.set(None);
        Ok(destroyed + 1)
    }

    // -------------------------------------------------------------------------
    // Reconciler support
    // -------------------------------------------------------------------------

    /// Evaluate and parse the template against current state and params
    pub(crate) fn parse_template(&self) -> Result<Element> {
        let source = self.behavior.template(self);
        let rendered = template::interpolate(&source, |scope, key| match scope {
            PlaceholderScope::State => self.state.get_str(key),
            PlaceholderScope::Params => self.params.get(key).map(ToString::to_string),
        });
        template::parse(&rendered)
    }

    pub(crate) fn set_root(&self, root: NodeHandle) {
        self.root.set(Some(root));
    }

    pub(crate) fn adopt(&self, child: Rc<ComponentInstance>) {
        *child.parent.borrow_mut() = self.this.clone();
        self.children.borrow_mut().insert(child.id.clone(), child);
    }

    pub(crate) fn release(&self, id: &str) -> Option<Rc<ComponentInstance>> {
        self.children.borrow_mut().shift_remove(id)
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase.get())
            .field("params", &self.params)
            .field("state", &self.state)
            .field("children", &self.child_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{OutputSurface, COMPONENT_ID_ATTR};
    use crate::tree::OutputTree;
    use weave_core::{state_map, Value, WeaveError, StructuralError};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every lifecycle hook it sees
    struct Recorder {
        log: Log,
        markup: String,
    }

    impl Component for Recorder {
        fn template(&self, _cx: &ComponentInstance) -> String {
            self.markup.clone()
        }

        fn initial_state(&self) -> StateMap {
            state_map([("header", Value::from("Application"))])
        }

        fn used_components(&self) -> Vec<ComponentClass> {
            vec![leaf_class(self.log.clone())]
        }

        fn before_mount(&self, cx: &ComponentInstance) -> Result<()> {
            self.log.borrow_mut().push(format!("before_mount {}", cx.name()));
            Ok(())
        }

        fn after_mount(&self, cx: &ComponentInstance) -> Result<()> {
            self.log.borrow_mut().push(format!("after_mount {}", cx.name()));
            Ok(())
        }

        fn after_update(&self, cx: &ComponentInstance) -> Result<()> {
            self.log.borrow_mut().push(format!("after_update {}", cx.name()));
            Ok(())
        }

        fn after_destroy(&self, cx: &ComponentInstance) -> Result<()> {
            self.log.borrow_mut().push(format!("after_destroy {}", cx.name()));
            Ok(())
        }
    }

    fn leaf_class(log: Log) -> ComponentClass {
        ComponentClass::new("Leaf", move |_| {
            Box::new(Recorder {
                log: log.clone(),
                markup: "<i>{params.label}</i>".into(),
            })
        })
    }

    fn recorder_class(log: Log, markup: &str) -> ComponentClass {
        let markup = markup.to_string();
        ComponentClass::new("Recorder", move |_| {
            Box::new(Recorder {
                log: log.clone(),
                markup: markup.clone(),
            })
        })
    }

    fn setup() -> (Runtime, Rc<RefCell<OutputTree>>, NodeHandle) {
        let (runtime, tree) = Runtime::headless(42);
        let body = runtime.with_surface(|s| s.create_element("body"));
        (runtime, tree, body)
    }

    #[test]
    fn test_class_matching() {
        let class = ComponentClass::of::<Counter>("Widget");
        assert!(class.matches("widget"));
        assert!(class.matches("WIDGET"));
        assert!(!class.matches("widgets"));
    }

    #[test]
    fn test_component_set_first_wins() {
        let first = ComponentClass::new("Widget", |_| Box::new(Counter::default()));
        let second = ComponentClass::new("widget", |_| Box::new(Counter::default()));
        let set = ComponentSet::new(vec![first, second]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.lookup("WIDGET").map(ComponentClass::name), Some("Widget"));
        assert!(set.lookup("other").is_none());
    }

    #[test]
    fn test_mount_tags_root_with_id() {
        let (runtime, tree, body) = setup();
        let log = Log::default();
        let instance = recorder_class(log.clone(), "<div><h1>{state.header}</h1></div>")
            .construct(&runtime, body, Params::new())
            .unwrap();
        assert_eq!(instance.phase(), Phase::Created);
        assert!(runtime.registry().borrow().contains(instance.id()));

        instance.mount().unwrap();
        let root = instance.root().unwrap();
        let tree = tree.borrow();
        assert_eq!(tree.attribute(root, COMPONENT_ID_ATTR), Some(instance.id()));
        assert_eq!(tree.parent(root), Some(body));
        assert_eq!(tree.to_markup_untagged(root), "<div><h1>Application</h1></div>");
        assert_eq!(instance.render_count(), 1);
        assert_eq!(
            *log.borrow(),
            vec!["before_mount Recorder".to_string(), "after_mount Recorder".to_string()]
        );
    }

    #[test]
    fn test_each_write_runs_one_pass() {
        let (runtime, tree, body) = setup();
        let log = Log::default();
        let instance = recorder_class(log.clone(), "<div><h1>{state.header}</h1></div>")
            .construct(&runtime, body, Params::new())
            .unwrap();
        instance.mount().unwrap();

        instance.state().set("header", "One").unwrap();
        instance.state().set("header", "Two").unwrap();
        instance.state().set("other", 1).unwrap();
        assert_eq!(instance.update_count(), 3);
        assert_eq!(
            log.borrow().iter().filter(|l| l.starts_with("after_update")).count(),
            3
        );

        let root = instance.root().unwrap();
        assert_eq!(tree.borrow().to_markup_untagged(root), "<div><h1>Two</h1></div>");
    }

    #[test]
    fn test_batch_coalesces_writes() {
        let (runtime, _tree, body) = setup();
        let instance = recorder_class(Log::default(), "<p>{state.a}{state.b}</p>")
            .construct(&runtime, body, Params::new())
            .unwrap();
        instance.mount().unwrap();

        instance
            .state()
            .batch(|state| {
                state.set("a", 1).unwrap();
                state.set("b", 2).unwrap();
            })
            .unwrap();
        assert_eq!(instance.update_count(), 1);
    }

    #[test]
    fn test_writes_before_mount_do_not_render() {
        let (runtime, _tree, body) = setup();
        let instance = recorder_class(Log::default(), "<p>{state.header}</p>")
            .construct(&runtime, body, Params::new())
            .unwrap();
        instance.state().set("header", "early").unwrap();
        assert_eq!(instance.update_count(), 0);
        assert!(instance.root().is_none());

        instance.render().unwrap();
        assert!(instance.is_mounted());
        instance.render().unwrap();
        assert_eq!(instance.update_count(), 1);
    }

    #[test]
    fn test_child_params_and_reuse() {
        let (runtime, tree, body) = setup();
        let log = Log::default();
        let instance = recorder_class(
            log.clone(),
            "<div><h1>{state.header}</h1><leaf label=\"x\"></leaf></div>",
        )
        .construct(&runtime, body, Params::new())
        .unwrap();
        instance.mount().unwrap();

        let children = instance.children();
        assert_eq!(children.len(), 1);
        let leaf = children[0].clone();
        assert_eq!(leaf.name(), "Leaf");
        assert_eq!(leaf.params().get("label"), Some(&Value::from("x")));
        assert!(leaf.id().starts_with("l-"));

        instance.state().set("header", "New App").unwrap();
        assert!(Rc::ptr_eq(&instance.children()[0], &leaf));
        assert_eq!(leaf.update_count(), 1);
        assert_eq!(instance.last_report().reused, 1);
        assert_eq!(instance.last_report().mounted, 0);

        let root = instance.root().unwrap();
        assert_eq!(
            tree.borrow().to_markup_untagged(root),
            "<div><h1>New App</h1><i>x</i></div>"
        );
    }

    #[test]
    fn test_unmount_destroys_descendants_first() {
        let (runtime, tree, body) = setup();
        let log = Log::default();
        let instance = recorder_class(log.clone(), "<div><leaf></leaf><leaf></leaf></div>")
            .construct(&runtime, body, Params::new())
            .unwrap();
        instance.mount().unwrap();
        log.borrow_mut().clear();

        let leaves = instance.children();
        assert_eq!(instance.unmount().unwrap(), 3);
        assert_eq!(
            *log.borrow(),
            vec![
                "after_destroy Leaf".to_string(),
                "after_destroy Leaf".to_string(),
                "after_destroy Recorder".to_string()
            ]
        );
        assert!(leaves.iter().all(|leaf| leaf.phase() == Phase::Destroyed));
        assert!(tree.borrow().children(body).is_empty());

        // Writes after destruction commit silently
        instance.state().set("header", "gone").unwrap();
        assert_eq!(instance.update_count(), 0);
    }

    #[test]
    fn test_unmounted_child_leaves_parent() {
        let (runtime, tree, body) = setup();
        let instance = recorder_class(
            Log::default(),
            "<div><h1>{state.header}</h1><leaf label=\"x\"></leaf></div>",
        )
        .construct(&runtime, body, Params::new())
        .unwrap();
        instance.mount().unwrap();

        let leaf = instance.children()[0].clone();
        assert!(Rc::ptr_eq(&leaf.parent().unwrap(), &instance));
        assert_eq!(leaf.unmount().unwrap(), 1);
        assert_eq!(leaf.phase(), Phase::Destroyed);
        assert!(leaf.parent().is_none());
        assert_eq!(instance.child_count(), 0);
        assert!(instance.child(leaf.id()).is_none());

        // The next pass fills the vacated slot with a fresh child
        instance.state().set("header", "New App").unwrap();
        assert_eq!(instance.last_report().mounted, 1);
        let children = instance.children();
        assert_eq!(children.len(), 1);
        assert_ne!(children[0].id(), leaf.id());
        assert!(children.iter().all(|c| c.phase() == Phase::Mounted));
        let root = instance.root().unwrap();
        assert_eq!(
            tree.borrow().to_markup_untagged(root),
            "<div><h1>New App</h1><i>x</i></div>"
        );
    }

    /// Renders fixed markup with the given component set
    struct Shell {
        markup: &'static str,
        uses: Vec<ComponentClass>,
    }

    impl Component for Shell {
        fn template(&self, _cx: &ComponentInstance) -> String {
            self.markup.into()
        }

        fn initial_state(&self) -> StateMap {
            state_map([("title", Value::from("t"))])
        }

        fn used_components(&self) -> Vec<ComponentClass> {
            self.uses.clone()
        }
    }

    fn shell_class(
        name: &'static str,
        markup: &'static str,
        uses: Vec<ComponentClass>,
    ) -> ComponentClass {
        ComponentClass::new(name, move |_| {
            Box::new(Shell {
                markup,
                uses: uses.clone(),
            })
        })
    }

    #[test]
    fn test_grandchildren_reused_across_updates() {
        let (runtime, tree, body) = setup();
        let inner = shell_class("Inner", "<i>{params.label}</i>", vec![]);
        let middle = shell_class(
            "Middle",
            "<section><inner label=\"deep\"></inner></section>",
            vec![inner],
        );
        let outer = shell_class(
            "Outer",
            "<div><h1>{state.title}</h1><middle></middle></div>",
            vec![middle],
        );
        let instance = outer.construct(&runtime, body, Params::new()).unwrap();
        instance.mount().unwrap();

        let middle = instance.children()[0].clone();
        let inner = middle.children()[0].clone();
        assert_eq!(inner.name(), "Inner");
        assert!(Rc::ptr_eq(&inner.parent().unwrap(), &middle));
        assert_eq!(runtime.registry().borrow().len(), 3);

        instance.state().set("title", "changed").unwrap();

        assert!(Rc::ptr_eq(&instance.children()[0], &middle));
        assert!(Rc::ptr_eq(&middle.children()[0], &inner));
        assert_eq!(middle.update_count(), 1);
        assert_eq!(inner.update_count(), 1);
        assert_eq!(inner.phase(), Phase::Mounted);
        assert_eq!(runtime.registry().borrow().len(), 3);
        let root = instance.root().unwrap();
        assert_eq!(
            tree.borrow().to_markup_untagged(root),
            "<div><h1>changed</h1><section><i>deep</i></section></div>"
        );
    }

    #[test]
    fn test_child_under_plain_element_reused() {
        let (runtime, tree, body) = setup();
        let inner = shell_class("Inner", "<i>{params.label}</i>", vec![]);
        let outer = shell_class(
            "Outer",
            "<div><section><inner label=\"a\"></inner></section><p>{state.title}</p></div>",
            vec![inner],
        );
        let instance = outer.construct(&runtime, body, Params::new()).unwrap();
        instance.mount().unwrap();
        let inner = instance.children()[0].clone();

        instance.state().set("title", "changed").unwrap();

        assert_eq!(instance.child_ids(), vec![inner.id().to_string()]);
        assert!(Rc::ptr_eq(&instance.children()[0], &inner));
        assert_eq!(inner.update_count(), 1);
        assert_eq!(instance.last_report().reused, 1);
        assert_eq!(instance.last_report().destroyed, 0);
        assert_eq!(runtime.registry().borrow().len(), 2);
        let root = instance.root().unwrap();
        assert_eq!(
            tree.borrow().to_markup_untagged(root),
            "<div><section><i>a</i></section><p>changed</p></div>"
        );
    }

    #[test]
    fn test_structural_error_surfaces() {
        let (runtime, _tree, body) = setup();
        let instance = recorder_class(Log::default(), "<a></a><b></b>")
            .construct(&runtime, body, Params::new())
            .unwrap();
        assert_eq!(
            instance.mount(),
            Err(WeaveError::Structural(StructuralError::MultipleRoots { count: 2 }))
        );
        assert_eq!(instance.phase(), Phase::Created);
    }

    /// Writes to itself from `after_update` until `count` reaches 3
    #[derive(Default)]
    struct Counter;

    impl Component for Counter {
        fn template(&self, _cx: &ComponentInstance) -> String {
            "<b>{state.count}</b>".into()
        }

        fn initial_state(&self) -> StateMap {
            state_map([("count", Value::from(0))])
        }

        fn after_update(&self, cx: &ComponentInstance) -> Result<()> {
            cx.state()
                .update("count", |v| Value::from(v.as_i64().unwrap_or(0) + 1))
        }

        fn after_mount(&self, cx: &ComponentInstance) -> Result<()> {
            cx.state().set("count", 1)
        }
    }

    struct Reentrant {
        writes: Cell<u32>,
    }

    impl Component for Reentrant {
        fn template(&self, cx: &ComponentInstance) -> String {
            // A write from inside the pass is deferred, not nested
            if self.writes.get() < 2 {
                self.writes.set(self.writes.get() + 1);
                cx.state().set("seen", self.writes.get() as i64).ok();
            }
            "<p>{state.seen}</p>".into()
        }
    }

    #[test]
    fn test_writes_during_pass_are_deferred() {
        let (runtime, tree, body) = setup();
        let class = ComponentClass::new("Reentrant", |_| {
            Box::new(Reentrant {
                writes: Cell::new(0),
            })
        });
        let instance = class.construct(&runtime, body, Params::new()).unwrap();
        instance.mount().unwrap();
        // The first write happened before mount finished and is dropped
        assert_eq!(instance.update_count(), 0);

        instance.state().set("seen", 0).unwrap();
        // One pass for the write, one deferred pass for the template's write
        assert_eq!(instance.update_count(), 2);
        let root = instance.root().unwrap();
        assert_eq!(tree.borrow().to_markup_untagged(root), "<p>2</p>");
    }

    #[test]
    fn test_hook_errors_propagate() {
        struct Failing;
        impl Component for Failing {
            fn template(&self, _cx: &ComponentInstance) -> String {
                "<p></p>".into()
            }
            fn after_mount(&self, _cx: &ComponentInstance) -> Result<()> {
                Err(WeaveError::Config("hook failed".into()))
            }
        }

        let (runtime, _tree, body) = setup();
        let instance = ComponentClass::new("Failing", |_| Box::new(Failing))
            .construct(&runtime, body, Params::new())
            .unwrap();
        assert!(instance.mount().is_err());
        // Output was produced before the hook ran
        assert!(instance.is_mounted());
    }

    #[test]
    fn test_self_writes_from_hooks_terminate() {
        let (runtime, tree, body) = setup();
        let limited = ComponentClass::new("Limited", |_| Box::new(Limited));
        let instance = limited.construct(&runtime, body, Params::new()).unwrap();
        instance.mount().unwrap();
        assert_eq!(instance.state().get("count"), Some(Value::from(3)));
        let root = instance.root().unwrap();
        assert_eq!(tree.borrow().to_markup_untagged(root), "<b>3</b>");
    }

    /// Like [`Counter`] but stops writing once `count` reaches 3
    struct Limited;

    impl Component for Limited {
        fn template(&self, cx: &ComponentInstance) -> String {
            Counter.template(cx)
        }

        fn initial_state(&self) -> StateMap {
            Counter.initial_state()
        }

        fn after_mount(&self, cx: &ComponentInstance) -> Result<()> {
            Counter.after_mount(cx)
        }

        fn after_update(&self, cx: &ComponentInstance) -> Result<()> {
            if cx.state().get("count").and_then(|v| v.as_i64()) < Some(3) {
                Counter.after_update(cx)?;
            }
            Ok(())
        }
    }
}
