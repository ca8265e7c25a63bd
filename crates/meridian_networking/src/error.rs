//! # Cluster Error Types
//!
//! All errors that can occur while replicating or executing commands.

use meridian_core::ObjectError;
use meridian_shared::{CodecError, Handle};
use thiserror::Error;

use crate::group::GroupKind;

/// Errors raised by the replication protocol.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// An object operation failed on a rank that keeps a full mirror.
    #[error("rank {rank}: {source}")]
    Object {
        /// World rank the failure happened on.
        rank: usize,
        /// The underlying failure.
        #[source]
        source: ObjectError,
    },

    /// A command could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The communication substrate reported a failure.
    #[error("substrate failure: {0}")]
    Substrate(String),

    /// A bulk payload exceeds what one command may carry.
    #[error("payload of {bytes} bytes exceeds the {limit} byte limit")]
    OversizedPayload {
        /// Payload size.
        bytes: u64,
        /// Allowed maximum.
        limit: u64,
    },

    /// A frame carried a tag no work item is registered under.
    #[error("unknown work tag {0:#x}")]
    UnknownWorkTag(u32),

    /// Two work items were registered under the same tag.
    #[error("work tag {0:#x} registered twice")]
    DuplicateWorkTag(u32),

    /// A volume rejected a region update.
    #[error("volume {handle} rejected the region")]
    SetRegionFailed {
        /// The volume.
        handle: Handle,
    },

    /// A group operation was attempted by a non-member.
    #[error("this rank is not a member of the {group} group")]
    NotAMember {
        /// The group.
        group: GroupKind,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O failure (config files, runtime threads).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
