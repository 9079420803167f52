//! Weave Core Runtime
//!
//! Foundational primitives for the Weave component framework. Nothing in this
//! crate knows about templates or output trees:
//!
//! - **Reactive State**: state maps whose writes trigger an update pass
//! - **Component Registry**: collision-free, human-readable instance ids
//! - **Scheduler**: deferred tasks on a virtual clock
//! - **Values**: dynamic values for state and parameters
//!
//! # Example
//!
//! ```rust
//! use weave_core::{ComponentRegistry, ReactiveState, Value};
//! use weave_core::value::state_map;
//!
//! let mut registry = ComponentRegistry::with_seed(1);
//! let id = registry.issue_id("App").unwrap();
//! assert!(id.starts_with("a-"));
//!
//! let state = ReactiveState::detached(state_map([("header", Value::from("Application"))]));
//! state.set("header", "New App").unwrap();
//! assert_eq!(state.get_str("header").as_deref(), Some("New App"));
//! ```

pub mod error;
pub mod reactive;
pub mod registry;
pub mod scheduler;
pub mod value;

pub use error::{Result, StructuralError, WeaveError};
pub use reactive::{ReactiveState, ReactiveStats, UpdateHook};
pub use registry::{ComponentRegistry, SharedRegistry};
pub use scheduler::{Scheduler, SharedScheduler, Task, TaskId};
pub use value::{state_map, Params, StateMap, Value};
