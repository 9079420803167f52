//! Weave Application Framework
//!
//! Thin shell around the reconciliation engine: configuration, logging setup
//! and mounting a root component into a document.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use weave_app::prelude::*;
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
//!
//!     fn after_mount(&self, cx: &ComponentInstance) -> Result<()> {
//!         let state = cx.state_handle();
//!         cx.runtime()
//!             .scheduler()
//!             .schedule(Duration::from_secs(1), move || state.set("header", "New App"));
//!         Ok(())
//!     }
//! }
//!
//! let mut app = WeaveApp::new(AppConfig::default()).unwrap();
//! app.mount(&ComponentClass::of::<App>("App")).unwrap();
//! app.advance(Duration::from_secs(1)).unwrap();
//! assert!(app.markup_untagged().contains("<h1>New App</h1>"));
//! ```

mod app;
pub mod config;
pub mod logging;


pub use app::{WeaveApp, DEFAULT_DOCUMENT};
pub use config::{AppConfig, RegistryConfig};
pub use weave_core::{Result, WeaveError};

/// Prelude module - import everything commonly needed
pub mod prelude {
    pub use crate::app::WeaveApp;
    pub use crate::config::AppConfig;

    // Engine
    pub use weave_tree::prelude::*;
    pub use weave_tree::ReconcileReport;

    // Core types
    pub use weave_core::{state_map, Params, Result, StateMap, Value, WeaveError};
}
