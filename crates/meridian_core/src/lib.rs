//! # MERIDIAN Core
//!
//! The object model each rank keeps for itself:
//! - Managed objects and the collaborator interfaces commands call on them
//! - A generational handle table mapping cluster handles to local instances
//! - The master's handle allocator
//!
//! ## Architecture Rules
//!
//! 1. **One writer per rank** - only the rank's dispatch stream touches its table
//! 2. **Handles, never pointers** - objects reference each other across ranks by handle
//! 3. **Stale handles fail** - a released handle never resolves again
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_core::{BasicFactory, HandleAllocator, ObjectFactory, ObjectHandleTable, ObjectKind};
//!
//! let mut allocator = HandleAllocator::new();
//! let mut table = ObjectHandleTable::new();
//!
//! let handle = allocator.allocate();
//! table.assign(handle, BasicFactory::new().create(ObjectKind::Renderer, "scivis")?)?;
//! table.lookup(handle)?.commit();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocator;
pub mod basic;
pub mod data;
pub mod error;
pub mod factory;
pub mod future;
pub mod object;
pub mod table;

pub use allocator::HandleAllocator;
pub use basic::{
    BasicFactory, BasicFrameBuffer, BasicInstance, BasicModuleLoader, BasicObject, BasicRenderer, BasicVolume,
};
pub use data::{check_data_size, Data, DataItems, DATA_SHARED_BUFFER};
pub use error::{ObjectError, ObjectResult};
pub use factory::{ModuleLoader, ObjectFactory};
pub use future::RenderFuture;
pub use object::{
    FrameBuffer, FrameEvent, ManagedObject, MasterOp, ObjectBase, ObjectKind, Param, Renderer, Volume,
};
pub use table::ObjectHandleTable;
