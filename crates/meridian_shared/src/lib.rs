//! # MERIDIAN Shared
//!
//! Wire-level types used by the master and by every worker.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - the object model (`meridian_core`)
//! - any threading or transport crate
//!
//! If a type needs to cross a process boundary it lives here; everything
//! that only exists inside one rank lives elsewhere.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod constants;
pub mod handle;
pub mod math;
pub mod param;
pub mod types;

pub use codec::{CodecError, CodecResult, Decode, Encode, ReadStream, WriteStream};
pub use constants::{
    COMMAND_MESSAGE_TAG, DEFAULT_MAX_BATCH_BYTES, FIRST_WORKER_RANK, MASTER_RANK, MAX_REGION_BYTES,
};
pub use handle::Handle;
pub use math::{
    Affine3f, Box1f, Box2f, Box3f, Box4f, Linear3f, Vec2f, Vec2i, Vec3f, Vec3i, Vec4f, Vec4i,
};
pub use param::{ObjectRef, ParamKind, ParamType, ParamValue};
pub use types::{DataType, FrameBufferChannels, FrameBufferFormat, PickResult};
