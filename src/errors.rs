//! Error Types
//!
//! This module defines the error types used throughout the runtime.
//!
//! # Overview
//!
//! The main error type [`KuesaError`] covers:
//! - Invalid arguments handed to the configuration surface
//! - Frame-graph arena misuse (stale ids, cyclic parenting)
//! - Settings loading and decoding errors
//!
//! # Propagation
//!
//! Internal frame-graph and stage operations return [`Result<T>`]. The
//! [`View`](crate::view::View) boundary never propagates them: it logs the
//! failure and degrades to a no-op, so a half-configured view renders nothing
//! instead of failing.
//!
//! ```rust,ignore
//! use kuesa::errors::{KuesaError, Result};
//!
//! fn attach(graph: &mut FrameGraph, node: FrameGraphNodeId, parent: FrameGraphNodeId) -> Result<()> {
//!     graph.set_parent(node, Some(parent))?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the Kuesa runtime.
#[derive(Error, Debug)]
pub enum KuesaError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// An argument was rejected by a configuration operation.
    #[error("Invalid argument for {operation}: {reason}")]
    InvalidArgument {
        /// The operation that rejected the argument
        operation: &'static str,
        /// Why it was rejected
        reason: String,
    },

    // ========================================================================
    // Frame Graph Errors
    // ========================================================================
    /// A frame-graph node id does not refer to a live node.
    #[error("Unknown frame-graph node ({context})")]
    UnknownNode {
        /// What was being accessed
        context: &'static str,
    },

    /// A render target id does not refer to a live render target.
    #[error("Unknown render target ({context})")]
    UnknownRenderTarget {
        /// What was being accessed
        context: &'static str,
    },

    /// Re-parenting would make a node its own ancestor.
    #[error("Cannot parent frame-graph node '{node}' under its own descendant '{parent}'")]
    CyclicParent {
        /// Name of the node being moved
        node: String,
        /// Name of the requested parent
        parent: String,
    },

    // ========================================================================
    // Settings Errors
    // ========================================================================
    /// View settings could not be decoded.
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// View settings decoded but hold an unusable value.
    #[error("Invalid settings value '{field}': {reason}")]
    InvalidSettings {
        /// The offending field
        field: &'static str,
        /// Why it is unusable
        reason: String,
    },

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for `Result<T, KuesaError>`.
pub type Result<T> = std::result::Result<T, KuesaError>;

impl KuesaError {
    pub(crate) fn invalid_argument(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }
}
