//! # Object Error Types
//!
//! All errors that can occur while resolving or building objects on one rank.

use meridian_shared::Handle;
use thiserror::Error;

use crate::object::ObjectKind;

/// Errors raised by the handle table and object construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// Handle was never assigned on this rank, or has been released.
    #[error("dangling handle {handle}")]
    DanglingHandle {
        /// The handle that failed to resolve.
        handle: Handle,
    },

    /// The null handle was used where an object is required.
    #[error("null handle where an object is required")]
    NullHandle,

    /// A handle's slot index lies too far past every slot in use.
    #[error("handle {handle} is out of range, the table grows by at most {max_gap} slots at a time")]
    HandleOutOfRange {
        /// The handle in question.
        handle: Handle,
        /// Largest growth allowed past the current slab.
        max_gap: usize,
    },

    /// A handle was assigned twice on the same rank.
    #[error("handle {handle} is already assigned")]
    AlreadyAssigned {
        /// The handle in question.
        handle: Handle,
    },

    /// A handle resolved to an object of the wrong kind.
    #[error("handle {handle} is a {found}, expected a {expected}")]
    KindMismatch {
        /// The handle in question.
        handle: Handle,
        /// Kind the command needed.
        expected: ObjectKind,
        /// Kind actually stored.
        found: ObjectKind,
    },

    /// The factory does not know the requested type name.
    #[error("unknown {kind} type: {type_name:?}")]
    UnknownType {
        /// Kind being created.
        kind: ObjectKind,
        /// Requested type name.
        type_name: String,
    },

    /// A data buffer's length does not match its element type and count.
    #[error("data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch {
        /// Bytes implied by element type and count.
        expected: u64,
        /// Bytes actually supplied.
        actual: u64,
    },
}

/// Result type for object operations.
pub type ObjectResult<T> = Result<T, ObjectError>;
