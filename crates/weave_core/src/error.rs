//! Error types shared by every Weave crate

use thiserror::Error;

/// Ways a template can violate the single-root rule
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralError {
    /// The template contains no nodes at all
    #[error("template has no root element")]
    Empty,

    /// More than one top-level node
    #[error("template has {count} top-level nodes, expected exactly one")]
    MultipleRoots { count: usize },

    /// The only top-level node is text
    #[error("template root is a text node, expected an element")]
    TextRoot,
}

/// Errors that can occur while rendering or updating components
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeaveError {
    /// Template violates the single element root rule
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    /// Template markup could not be parsed
    #[error("template syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// The mount point does not exist in the output tree
    #[error("no element matches mount selector {selector:?}")]
    MissingAttachment { selector: String },

    /// Every suffix for a slug has been issued
    #[error("component id space for slug {slug:?} exhausted after {attempts} attempts")]
    RegistryExhausted { slug: String, attempts: usize },

    /// An output tree operation referenced a node that no longer exists
    #[error("output node {node:#x} does not exist")]
    StaleNode { node: u64 },

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(String),
}

impl WeaveError {
    /// Returns true for errors caused by the template itself
    pub fn is_template_error(&self) -> bool {
        matches!(self, WeaveError::Structural(_) | WeaveError::Syntax { .. })
    }
}

/// Result type for Weave operations
pub type Result<T> = std::result::Result<T, WeaveError>;
