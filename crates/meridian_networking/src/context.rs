//! # Cluster Context
//!
//! Everything a work item may touch while it runs on one rank: the rank's
//! role and groups, its communicator, its handle table, the collaborators
//! that build objects, the selected load balancer and the task scheduler.
//!
//! One context exists per rank and is owned by that rank's dispatch stream.

use std::collections::HashMap;
use std::sync::Arc;

use meridian_core::{
    ManagedObject, ModuleLoader, ObjectError, ObjectFactory, ObjectHandleTable, ObjectKind, RenderFuture,
};
use meridian_shared::{Handle, MASTER_RANK};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::group::{Communicator, ProcessGroups};
use crate::render_task::TaskScheduler;

/// Which side of the protocol a rank plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The coordinating rank; keeps a partial mirror.
    Master,
    /// A rendering rank; keeps the full mirror.
    Worker,
}

/// Tile load balancer selected by `SetLoadBalancer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TiledLoadBalancer {
    /// Static tile assignment, master side.
    StaticMaster,
    /// Static tile assignment, worker side.
    StaticWorker,
    /// Dynamic assignment, master side.
    DynamicMaster {
        /// Handle of the balancer object.
        handle: Handle,
        /// Tiles handed out before workers start asking.
        tiles_preallocated: i32,
    },
    /// Dynamic assignment, worker side.
    DynamicWorker {
        /// Handle of the balancer object.
        handle: Handle,
    },
}

/// Per-rank execution state.
pub struct ClusterContext {
    role: Role,
    groups: ProcessGroups,
    comm: Arc<dyn Communicator>,
    /// This rank's objects.
    pub objects: ObjectHandleTable,
    /// Typed view of the render futures in `objects`.
    futures: HashMap<Handle, Arc<RenderFuture>>,
    factory: Arc<dyn ObjectFactory>,
    modules: Arc<dyn ModuleLoader>,
    load_balancer: Option<TiledLoadBalancer>,
    scheduler: TaskScheduler,
    config: ClusterConfig,
    terminated: bool,
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("rank", &self.rank())
            .field("role", &self.role)
            .field("objects", &self.objects.len())
            .field("load_balancer", &self.load_balancer)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl ClusterContext {
    /// Creates the context for the rank behind `comm`.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration or a communicator whose world
    /// size disagrees with it, `Io` if the task scheduler cannot start.
    pub fn new(
        config: ClusterConfig,
        comm: Arc<dyn Communicator>,
        factory: Arc<dyn ObjectFactory>,
        modules: Arc<dyn ModuleLoader>,
    ) -> ClusterResult<Self> {
        config.validate()?;
        if comm.size() != config.world_size {
            return Err(ClusterError::Config(format!(
                "communicator has {} ranks, configuration expects {}",
                comm.size(),
                config.world_size
            )));
        }

        let rank = comm.rank();
        let role = if rank == MASTER_RANK { Role::Master } else { Role::Worker };
        let scheduler = TaskScheduler::new(config.render_threads, rank)?;

        Ok(Self {
            role,
            groups: ProcessGroups::new(rank, comm.size()),
            comm,
            objects: ObjectHandleTable::new(),
            futures: HashMap::new(),
            factory,
            modules,
            load_balancer: None,
            scheduler,
            config,
            terminated: false,
        })
    }

    /// This rank's world rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// This rank's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns true on the master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }

    /// The rank's groups.
    #[must_use]
    pub const fn groups(&self) -> &ProcessGroups {
        &self.groups
    }

    /// The rank's communicator.
    #[must_use]
    pub fn comm(&self) -> &dyn Communicator {
        &*self.comm
    }

    /// The object factory.
    #[must_use]
    pub fn factory(&self) -> &dyn ObjectFactory {
        &*self.factory
    }

    /// The module loader.
    #[must_use]
    pub fn modules(&self) -> &dyn ModuleLoader {
        &*self.modules
    }

    /// The task scheduler for deferred renders.
    #[must_use]
    pub const fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The configuration this rank was started with.
    #[must_use]
    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The selected load balancer, if any.
    #[must_use]
    pub const fn load_balancer(&self) -> Option<TiledLoadBalancer> {
        self.load_balancer
    }

    /// Replaces the load balancer.
    pub fn set_load_balancer(&mut self, balancer: TiledLoadBalancer) {
        tracing::debug!(rank = self.rank(), ?balancer, "load balancer selected");
        self.load_balancer = Some(balancer);
    }

    /// Tags an object failure with this rank.
    #[must_use]
    pub fn object_error(&self, source: ObjectError) -> ClusterError {
        ClusterError::Object {
            rank: self.rank(),
            source,
        }
    }

    /// Resolves a handle that must be live here.
    ///
    /// # Errors
    ///
    /// `Object` with `DanglingHandle` or `NullHandle`.
    pub fn lookup(&self, handle: Handle) -> ClusterResult<&Arc<dyn ManagedObject>> {
        self.objects.lookup(handle).map_err(|e| self.object_error(e))
    }

    /// Resolves a handle that must be live here and of `kind`.
    ///
    /// # Errors
    ///
    /// As [`ClusterContext::lookup`], plus `KindMismatch`.
    pub fn lookup_kind(&self, handle: Handle, kind: ObjectKind) -> ClusterResult<&Arc<dyn ManagedObject>> {
        self.objects.lookup_kind(handle, kind).map_err(|e| self.object_error(e))
    }

    /// Resolves a handle that may be null.
    ///
    /// # Errors
    ///
    /// `Object` with `DanglingHandle` for a non-null handle that is not live.
    pub fn lookup_optional(&self, handle: Handle) -> ClusterResult<Option<&Arc<dyn ManagedObject>>> {
        self.objects.lookup_optional(handle).map_err(|e| self.object_error(e))
    }

    /// Binds a freshly built object to `handle`.
    ///
    /// # Errors
    ///
    /// `Object` with `AlreadyAssigned` or `NullHandle`.
    pub fn assign(&mut self, handle: Handle, object: Arc<dyn ManagedObject>) -> ClusterResult<()> {
        self.objects.assign(handle, object).map_err(|e| self.object_error(e))
    }

    /// Binds a render future, keeping a typed reference for polling.
    ///
    /// # Errors
    ///
    /// As [`ClusterContext::assign`].
    pub fn assign_future(&mut self, handle: Handle, future: Arc<RenderFuture>) -> ClusterResult<()> {
        self.assign(handle, Arc::clone(&future) as Arc<dyn ManagedObject>)?;
        self.futures.insert(handle, future);
        Ok(())
    }

    /// Releases a handle.
    ///
    /// # Errors
    ///
    /// `Object` with `DanglingHandle` if it is not live.
    pub fn release(&mut self, handle: Handle) -> ClusterResult<Arc<dyn ManagedObject>> {
        self.futures.remove(&handle);
        self.objects.release(handle).map_err(|e| self.object_error(e))
    }

    /// The render future bound to `handle`, if live on this rank.
    #[must_use]
    pub fn future(&self, handle: Handle) -> Option<Arc<RenderFuture>> {
        self.futures.get(&handle).cloned()
    }

    /// Ends this rank's participation.
    ///
    /// Exits the OS process when configured to, otherwise flags the dispatch
    /// loop to return.
    pub fn terminate(&mut self) {
        tracing::info!(rank = self.rank(), "rank finalized");
        if self.config.exit_on_finalize {
            std::process::exit(0);
        }
        self.terminated = true;
    }

    /// Returns true once finalized.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }
}
