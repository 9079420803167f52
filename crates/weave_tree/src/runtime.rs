//! Shared runtime handles
//!
//! Every component instance of an application holds a clone of the same
//! [`Runtime`]: the output surface it renders into, the id registry and the
//! task scheduler. Cloning is cheap (three reference counts).

use std::cell::RefCell;
use std::rc::Rc;

use weave_core::{ComponentRegistry, Scheduler, SharedRegistry, SharedScheduler};

use crate::surface::{OutputSurface, SharedSurface};
use crate::tree::OutputTree;

/// Handles shared by all components of an application
#[derive(Clone)]
pub struct Runtime {
    surface: SharedSurface,
    registry: SharedRegistry,
    scheduler: SharedScheduler,
}

impl Runtime {
    pub fn new(
        surface: SharedSurface,
        registry: SharedRegistry,
        scheduler: SharedScheduler,
    ) -> Self {
        Self {
            surface,
            registry,
            scheduler,
        }
    }

    /// Runtime over a fresh [`OutputTree`] with a seeded registry.
    ///
    /// Returns the concrete tree alongside so callers can inspect output.
    pub fn headless(seed: u64) -> (Self, Rc<RefCell<OutputTree>>) {
        let tree = OutputTree::new().into_shared();
        let surface: SharedSurface = tree.clone();
        let runtime = Self::new(
            surface,
            ComponentRegistry::with_seed(seed).into_shared(),
            Rc::new(Scheduler::new()),
        );
        (runtime, tree)
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    /// Run `f` with mutable access to the surface.
    ///
    /// The borrow ends when `f` returns; never call back into components
    /// from inside `f`.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut dyn OutputSurface) -> R) -> R {
        let mut surface = self.surface.borrow_mut();
        f(&mut *surface)
    }

    /// Run `f` with shared access to the surface
    pub fn read_surface<R>(&self, f: impl FnOnce(&dyn OutputSurface) -> R) -> R {
        let surface = self.surface.borrow();
        f(&*surface)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.registry.borrow())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_runtime_shares_tree() {
        let (runtime, tree) = Runtime::headless(7);
        let node = runtime.with_surface(|surface| surface.create_element("div"));
        assert!(tree.borrow().contains(node));
        assert!(runtime.read_surface(|surface| surface.contains(node)));

        let clone = runtime.clone();
        let id = clone.registry().borrow_mut().issue_id("App").unwrap();
        assert!(runtime.registry().borrow().contains(&id));
    }
}
