//! Reactive component state
//!
//! [`ReactiveState`] is the explicit replacement for transparent property
//! interception: every write goes through [`ReactiveState::set`], which
//! commits the value first and then invokes the update hook bound when the
//! container was created. Reads inside the hook therefore observe the value
//! that was just written.
//!
//! Writes are not coalesced by default: N writes fire N update passes.
//! [`ReactiveState::batch`] opts into coalescing for a group of writes.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use weave_core::reactive::ReactiveState;
//! use weave_core::value::{state_map, Value};
//!
//! let passes = Rc::new(Cell::new(0));
//! let counter = passes.clone();
//! let state = ReactiveState::new(state_map([("count", Value::from(0))]), move || {
//!     counter.set(counter.get() + 1);
//!     Ok(())
//! });
//!
//! state.set("count", 1).unwrap();
//! state.set("count", 2).unwrap();
//! assert_eq!(passes.get(), 2);
//! assert_eq!(state.get("count"), Some(Value::from(2)));
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::trace;

use crate::error::Result;
use crate::value::{StateMap, Value};

/// Callback fired after every committed write
pub type UpdateHook = Box<dyn Fn() -> Result<()>>;

/// A state map whose writes trigger an update callback
pub struct ReactiveState {
    values: RefCell<StateMap>,
    hook: Option<UpdateHook>,
    /// Monotonic write counter
    version: Cell<u64>,
    /// Number of times the hook has been invoked
    notifications: Cell<u64>,
    /// Current batch depth (> 0 means writes are being coalesced)
    batch_depth: Cell<u32>,
    /// A write landed inside the current batch
    batch_dirty: Cell<bool>,
}

impl ReactiveState {
    /// Create a state container bound to `hook`
    pub fn new<F>(initial: StateMap, hook: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self {
            hook: Some(Box::new(hook)),
            ..Self::detached(initial)
        }
    }

    /// Create a state container that notifies nobody
    pub fn detached(initial: StateMap) -> Self {
        Self {
            values: RefCell::new(initial),
            hook: None,
            version: Cell::new(0),
            notifications: Cell::new(0),
            batch_depth: Cell::new(0),
            batch_dirty: Cell::new(false),
        }
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    /// Get the value under `key` rendered as a string
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).map(ToString::to_string)
    }

    /// Run `f` against the value under `key` without cloning it
    pub fn with<R>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(self.values.borrow().get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    /// Copy of the whole state map
    pub fn snapshot(&self) -> StateMap {
        self.values.borrow().clone()
    }

    /// Write `value` under `key`, then fire the update hook.
    ///
    /// Errors raised by the update pass are returned to the caller.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        trace!(key = %key, "state write");
        self.values.borrow_mut().insert(key, value.into());
        self.version.set(self.version.get() + 1);
        self.notify()
    }

    /// Replace the value under `key` with `f(old)`; a missing key reads as `Null`
    pub fn update(&self, key: &str, f: impl FnOnce(Value) -> Value) -> Result<()> {
        let current = self.get(key).unwrap_or_default();
        self.set(key, f(current))
    }

    /// Run `f` with writes coalesced into a single update pass.
    ///
    /// Values are committed immediately; the hook fires once when the
    /// outermost batch closes, and only if something was written.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> Result<R> {
        self.batch_depth.set(self.batch_depth.get() + 1);
        let result = f(self);
        let depth = self.batch_depth.get() - 1;
        self.batch_depth.set(depth);

        if depth == 0 && self.batch_dirty.replace(false) {
            self.fire()?;
        }
        Ok(result)
    }

    /// Number of committed writes
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn stats(&self) -> ReactiveStats {
        ReactiveStats {
            key_count: self.len(),
            version: self.version.get(),
            notifications: self.notifications.get(),
        }
    }

    fn notify(&self) -> Result<()> {
        if self.batch_depth.get() > 0 {
            self.batch_dirty.set(true);
            return Ok(());
        }
        self.fire()
    }

    fn fire(&self) -> Result<()> {
        match &self.hook {
            Some(hook) => {
                self.notifications.set(self.notifications.get() + 1);
                hook()
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ReactiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveState")
            .field("values", &self.values.borrow())
            .field("version", &self.version.get())
            .field("bound", &self.hook.is_some())
            .finish()
    }
}

/// Counters describing a state container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactiveStats {
    pub key_count: usize,
    pub version: u64,
    pub notifications: u64,
}
