//! Process-unique, human-readable component instance ids.
//!
//! Ids take the form `{slug}-{suffix}` where the slug is built from the
//! capital letters of the component name (`TodoList` → `tl`) and the suffix is
//! a random number in `1000..=9999`. The registry remembers every id it has
//! ever issued, so an id is never handed out twice, even after the instance
//! owning it has been destroyed.
//!
//! Ids are never reclaimed. A long-lived application that keeps creating
//! instances therefore grows the registry without bound, and a single slug
//! runs out after 9000 instances.
//!
//! # Example
//!
//! ```
//! use weave_core::registry::ComponentRegistry;
//!
//! let mut registry = ComponentRegistry::with_seed(7);
//! let id = registry.issue_id("AppBar").unwrap();
//! assert!(id.starts_with("ab-"));
//! assert!(registry.contains(&id));
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::error::{Result, WeaveError};

/// Smallest numeric suffix
pub const SUFFIX_MIN: u16 = 1000;
/// Largest numeric suffix (inclusive)
pub const SUFFIX_MAX: u16 = 9999;
/// Random draws attempted before falling back to a linear scan
pub const DEFAULT_MAX_RANDOM_ATTEMPTS: usize = 1000;

const SUFFIX_SPACE: usize = (SUFFIX_MAX - SUFFIX_MIN) as usize + 1;

/// Registry shared between the application shell and every component
pub type SharedRegistry = Rc<RefCell<ComponentRegistry>>;

/// Issues collision-free component ids
pub struct ComponentRegistry {
    /// Suffixes issued per slug
    suffixes: FxHashMap<String, FxHashSet<u16>>,
    /// Every id, in issue order
    issued: Vec<String>,
    ids: FxHashSet<String>,
    rng: StdRng,
    max_random_attempts: usize,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    /// Create a registry seeded from OS entropy
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a registry with a deterministic suffix sequence
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            suffixes: FxHashMap::default(),
            issued: Vec::new(),
            ids: FxHashSet::default(),
            rng,
            max_random_attempts: DEFAULT_MAX_RANDOM_ATTEMPTS,
        }
    }

    /// Limit the random draws made before scanning for a free suffix
    pub fn with_max_random_attempts(mut self, attempts: usize) -> Self {
        self.max_random_attempts = attempts;
        self
    }

    /// Wrap the registry for sharing
    pub fn into_shared(self) -> SharedRegistry {
        Rc::new(RefCell::new(self))
    }

    /// Abbreviation slug for a component name.
    ///
    /// Capital letters, lower-cased. Names without capitals fall back to
    /// their first alphanumeric character, and empty names to `"c"`.
    pub fn slug(name: &str) -> String {
        let capitals: String = name
            .chars()
            .filter(|c| c.is_uppercase())
            .flat_map(char::to_lowercase)
            .collect();
        if !capitals.is_empty() {
            return capitals;
        }

        name.chars()
            .find(|c| c.is_alphanumeric())
            .map(|c| c.to_lowercase().collect())
            .unwrap_or_else(|| "c".to_string())
    }

    /// Issue a fresh id for an instance of `component_name`
    pub fn issue_id(&mut self, component_name: &str) -> Result<String> {
        let slug = Self::slug(component_name);
        let taken = self.suffixes.entry(slug.clone()).or_default();

        for _ in 0..self.max_random_attempts {
            let suffix = self.rng.gen_range(SUFFIX_MIN..=SUFFIX_MAX);
            if taken.insert(suffix) {
                return Ok(self.record(component_name, &slug, suffix));
            }
        }

        // Random draws keep missing: the slug is nearly full.
        warn!(
            slug = %slug,
            issued = taken.len(),
            "random id draws exhausted, scanning for a free suffix"
        );
        match (SUFFIX_MIN..=SUFFIX_MAX).find(|s| !taken.contains(s)) {
            Some(suffix) => {
                taken.insert(suffix);
                Ok(self.record(component_name, &slug, suffix))
            }
            None => Err(WeaveError::RegistryExhausted {
                slug,
                attempts: self.max_random_attempts + SUFFIX_SPACE,
            }),
        }
    }

    fn record(&mut self, component_name: &str, slug: &str, suffix: u16) -> String {
        let id = format!("{}-{}", slug, suffix);
        debug!(id = %id, component = component_name, "issued component id");
        self.ids.insert(id.clone());
        self.issued.push(id.clone());
        id
    }

    /// Check whether `id` has ever been issued
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of ids issued so far
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// All issued ids in issue order
    pub fn issued(&self) -> &[String] {
        &self.issued
    }

    /// Number of ids issued for a slug
    pub fn slug_count(&self, slug: &str) -> usize {
        self.suffixes.get(slug).map_or(0, |s| s.len())
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("issued", &self.issued.len())
            .field("slugs", &self.suffixes.len())
            .field("max_random_attempts", &self.max_random_attempts)
            .finish()
    }
}
