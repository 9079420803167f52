//! Weave Tree
//!
//! The reconciliation engine of the Weave component framework:
//!
//! - **Templates**: markup parsed into a single-root [`template::Element`]
//! - **Output Surface**: the tree capabilities the engine renders into
//! - **Output Tree**: an in-memory, arena-backed surface
//! - **Components**: classes, instances and their lifecycle
//! - **Reconciliation**: render and update passes with identity reuse
//!
//! # Example
//!
//! ```rust
//! use weave_core::{state_map, StateMap, Value};
//! use weave_tree::prelude::*;
//!
//! #[derive(Default)]
//! struct App;
//!
//! impl Component for App {
//!     fn template(&self, _cx: &ComponentInstance) -> String {
//!         "<div><h1>{state.header}</h1></div>".into()
//!     }
//!
//!     fn initial_state(&self) -> StateMap {
//!         state_map([("header", Value::from("Application"))])
//!     }
//! }
//!
//! let (runtime, tree) = Runtime::headless(0);
//! let body = runtime.with_surface(|s| s.create_element("body"));
//! let app = ComponentClass::of::<App>("App")
//!     .construct(&runtime, body, Params::new())
//!     .unwrap();
//! app.mount().unwrap();
//! app.state().set("header", "New App").unwrap();
//!
//! let markup = tree.borrow().to_markup_untagged(app.root().unwrap());
//! assert_eq!(markup, "<div><h1>New App</h1></div>");
//! ```

pub mod component;
pub mod reconcile;
pub mod runtime;
pub mod surface;
pub mod template;
pub mod tree;

pub use component::{Component, ComponentClass, ComponentInstance, ComponentSet, Phase};
pub use reconcile::{classify, NodeKind, Placement, ReconcileReport};
pub use runtime::Runtime;
pub use surface::{NodeHandle, NodeType, OutputSurface, SharedSurface, COMPONENT_ID_ATTR};
pub use template::{parse, parse_fragment, Element, Node};
pub use tree::OutputTree;

/// Commonly used items
pub mod prelude {
    pub use crate::component::{Component, ComponentClass, ComponentInstance};
    pub use crate::runtime::Runtime;
    pub use crate::surface::{NodeHandle, OutputSurface};
    pub use crate::tree::OutputTree;
    pub use weave_core::{Params, Result, StateMap, Value};
}
