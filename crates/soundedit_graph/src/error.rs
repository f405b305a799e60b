// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error type shared by the manifest, graph and translator.

use thiserror::Error;

/// Errors raised while loading manifests, editing graphs or translating stacks.
///
/// Every failure is synchronous and leaves the caller's previous state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Manifest source is missing, unreadable or malformed
    #[error("Failed to load manifest {origin}: {reason}")]
    Load {
        /// Path or label of the manifest source
        origin: String,
        /// What went wrong
        reason: String,
    },

    /// Unknown operator type or manifest name
    #[error("Not found: {0}")]
    NotFound(String),

    /// Value-type tag outside the known set
    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    /// `import_stack` names a stack missing from its group
    #[error("Stack '{stack}' imports unknown stack '{import}'")]
    UnresolvedImport {
        /// Importing stack
        stack: String,
        /// Missing stack name
        import: String,
    },

    /// An import chain revisits a stack that is already being merged
    #[error("Cyclic import: {}", chain.join(" -> "))]
    CyclicImport {
        /// Stacks in the chain, ending with the repeated one
        chain: Vec<String>,
    },

    /// A node's `operator` is not in the active manifest
    #[error("Node '{node}' has unknown operator type '{operator}'")]
    UnknownOperatorType {
        /// Node name
        node: String,
        /// Operator type name
        operator: String,
    },

    /// Enum key-value set to something other than one of its choices
    #[error("'{value}' is not a valid choice for '{key}' (expected one of: {})", choices.join(", "))]
    InvalidEnumChoice {
        /// Key-value name
        key: String,
        /// Rejected value
        value: String,
        /// Allowed values
        choices: Vec<String>,
    },

    /// Literal does not parse as its declared type
    #[error("'{value}' is not a valid {expected} for '{key}'")]
    InvalidLiteral {
        /// Input or key-value name
        key: String,
        /// Rejected value
        value: String,
        /// Type the value should have been
        expected: String,
    },

    /// `@` reference that is not `@node.output`
    #[error("Malformed reference '{0}', expected '@node.output'")]
    MalformedReference(String),

    /// `@` reference to a node or output that does not exist
    #[error("Unresolved reference '{reference}': {reason}")]
    UnresolvedReference {
        /// The full reference text
        reference: String,
        /// Which part failed to resolve
        reason: String,
    },

    /// Input port already has an incoming connection
    #[error("Input '{port}' on node '{node}' is already connected")]
    DuplicateConnection {
        /// Node name
        node: String,
        /// Input port name
        port: String,
    },

    /// Node lookup failed
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Port lookup failed
    #[error("Node '{node}' has no {direction} port '{port}'")]
    PortNotFound {
        /// Node name
        node: String,
        /// Port name
        port: String,
        /// "input" or "output"
        direction: &'static str,
    },

    /// A node with this name already exists
    #[error("A node named '{0}' already exists")]
    DuplicateName(String),

    /// Stack document has the wrong shape
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Graph contains a cycle
    #[error("Graph contains a cycle")]
    CycleDetected,
}

/// Result type for graph and manifest operations
pub type Result<T> = std::result::Result<T, Error>;
