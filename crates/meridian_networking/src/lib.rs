//! # MERIDIAN Networking
//!
//! Replicated command protocol for render clusters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   [tag][payload] batches   ┌──────────────────────┐
//! │  MASTER (rank 0)     │ ─────────────────────────► │  WORKER (rank 1..n)  │
//! │  MasterDispatcher    │                            │  WorkerLoop          │
//! │  partial mirror      │ ◄───── pick reply ──────── │  full mirror         │
//! └──────────────────────┘                            └──────────────────────┘
//!            │                                                  │
//!            └──────────── barriers (world / worker) ───────────┘
//! ```
//!
//! ## Architecture Rules
//!
//! 1. **One dispatch stream per rank** - commands run in arrival order, never concurrently
//! 2. **Handles are minted by the master** - workers bind what they receive
//! 3. **Renders are the only async work** - pinned by ref counts until they finish
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meridian_core::{BasicFactory, BasicModuleLoader, ObjectKind};
//! use meridian_networking::{ClusterConfig, LocalCluster};
//!
//! let mut cluster = LocalCluster::start(
//!     ClusterConfig::default(),
//!     Arc::new(BasicFactory::new()),
//!     Arc::new(BasicModuleLoader::default()),
//! )?;
//! let master = cluster.master()?;
//! let renderer = master.new_object(ObjectKind::Renderer, "scivis")?;
//! master.set_param(renderer, "pixelSamples", 4)?;
//! master.commit(renderer)?;
//! cluster.shutdown()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod local;
pub mod render_task;
pub mod work;

pub use config::ClusterConfig;
pub use context::{ClusterContext, Role, TiledLoadBalancer};
pub use dispatch::{MasterDispatcher, WorkerLoop};
pub use error::{ClusterError, ClusterResult};
pub use group::{Communicator, Group, GroupKind, LocalEndpoint, LocalFabric, ProcessGroups};
pub use local::LocalCluster;
pub use render_task::{RenderTask, TaskScheduler};
pub use work::{register_work_items, tags, Work, WorkItem, WorkTag, WorkTypeRegistry};
