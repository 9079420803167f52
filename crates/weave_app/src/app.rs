//! Weave Application Shell
//!
//! Owns the output document, the id registry and the scheduler, and mounts a
//! root component into the configured mount point.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;
use weave_core::{Params, Result, Scheduler, SharedRegistry, SharedScheduler, WeaveError};
use weave_tree::{
    ComponentClass, ComponentInstance, OutputSurface, OutputTree, Runtime, SharedSurface,
};

use crate::config::AppConfig;

/// Document used when the host supplies none
pub const DEFAULT_DOCUMENT: &str = "<html><head></head><body><div id=\"app\"></div></body></html>";

/// The main Weave application
///
/// # Example
///
/// ```
/// use weave_app::prelude::*;
///
/// #[derive(Default)]
/// struct Hello;
///
/// impl Component for Hello {
///     fn template(&self, _cx: &ComponentInstance) -> String {
///         "<p>Hello</p>".into()
///     }
/// }
///
/// let mut app = WeaveApp::new(AppConfig::default().with_title("Hello")).unwrap();
/// app.mount(&ComponentClass::of::<Hello>("Hello")).unwrap();
/// assert_eq!(app.tree().title(), "Hello");
/// assert!(app.markup_untagged().contains("<div id=\"app\"><p>Hello</p></div>"));
/// ```
pub struct WeaveApp {
    config: AppConfig,
    tree: Rc<RefCell<OutputTree>>,
    runtime: Runtime,
    root: Option<Rc<ComponentInstance>>,
}

impl WeaveApp {
    /// Create an application over [`DEFAULT_DOCUMENT`]
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::from_markup(config, DEFAULT_DOCUMENT)
    }

    /// Create an application over a document built from `markup`
    pub fn from_markup(config: AppConfig, markup: &str) -> Result<Self> {
        Ok(Self::with_document(config, OutputTree::from_markup(markup)?))
    }

    /// Create an application over an existing document
    pub fn with_document(config: AppConfig, document: OutputTree) -> Self {
        let tree = document.into_shared();
        let surface: SharedSurface = tree.clone();
        let registry = config.registry.build().into_shared();
        let scheduler: SharedScheduler = Rc::new(Scheduler::new());

        Self {
            runtime: Runtime::new(surface, registry, scheduler),
            tree,
            config,
            root: None,
        }
    }

    /// Mount `class` as the root component.
    ///
    /// Fails with [`WeaveError::MissingAttachment`] when the configured root
    /// selector matches nothing. A previously mounted root is unmounted
    /// first.
    pub fn mount(&mut self, class: &ComponentClass) -> Result<Rc<ComponentInstance>> {
        let selector = &self.config.root_selector;
        let attachment = self
            .runtime
            .read_surface(|s| s.query_selector(selector))
            .ok_or_else(|| WeaveError::MissingAttachment {
                selector: selector.clone(),
            })?;

        if let Some(previous) = self.root.take() {
            debug!(id = %previous.id(), "replacing mounted root component");
            previous.unmount()?;
        }

        let title = &self.config.title;
        self.runtime.with_surface(|s| s.set_title(title));

        let root = class.construct(&self.runtime, attachment, Params::new())?;
        debug!(id = %root.id(), selector = %selector, "mounting root component");
        self.root = Some(root.clone());
        root.mount()?;
        Ok(root)
    }

    /// Unmount the root component, if any
    pub fn unmount(&mut self) -> Result<()> {
        if let Some(root) = self.root.take() {
            root.unmount()?;
        }
        Ok(())
    }

    /// Advance the virtual clock, running due tasks
    pub fn advance(&self, by: Duration) -> Result<usize> {
        self.runtime.scheduler().advance(by)
    }

    /// Run every pending task, however far in the future
    pub fn run_until_idle(&self) -> Result<usize> {
        let scheduler = self.runtime.scheduler();
        let mut executed = 0;
        while let Some(due) = scheduler.next_due() {
            executed += scheduler.advance(due.saturating_sub(scheduler.now()))?;
        }
        Ok(executed)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn registry(&self) -> &SharedRegistry {
        self.runtime.registry()
    }

    pub fn root_component(&self) -> Option<&Rc<ComponentInstance>> {
        self.root.as_ref()
    }

    /// Borrow the output document
    pub fn tree(&self) -> Ref<'_, OutputTree> {
        self.tree.borrow()
    }

    /// Serialised document, tagged ids included
    pub fn markup(&self) -> String {
        let tree = self.tree.borrow();
        tree.to_markup(tree.document())
    }

    /// Serialised document without tagged ids
    pub fn markup_untagged(&self) -> String {
        let tree = self.tree.borrow();
        tree.to_markup_untagged(tree.document())
    }
}

impl std::fmt::Debug for WeaveApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaveApp")
            .field("config", &self.config)
            .field("root", &self.root.as_ref().map(|r| r.id().to_string()))
            .finish_non_exhaustive()
    }
}
