//! Cluster-level commands: load balancing, modules and shutdown.

use meridian_shared::{CodecResult, Decode, Encode, Handle, ReadStream, WriteStream};

use super::{tags, WorkItem, WorkTag};
use crate::context::{ClusterContext, TiledLoadBalancer};
use crate::error::ClusterResult;

/// Selects the tile load balancer on every rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetLoadBalancer {
    /// Dynamic instead of static assignment.
    pub dynamic: bool,
    /// Tiles the dynamic balancer hands out up front. Opaque to the protocol.
    pub tiles_preallocated: i32,
    /// Handle of the balancer object.
    pub handle: Handle,
}

impl SetLoadBalancer {
    /// Creates the command.
    #[must_use]
    pub const fn new(dynamic: bool, tiles_preallocated: i32, handle: Handle) -> Self {
        Self {
            dynamic,
            tiles_preallocated,
            handle,
        }
    }
}

impl Encode for SetLoadBalancer {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.dynamic)
            .put(&self.tiles_preallocated)
            .put(&self.handle);
    }
}

impl Decode for SetLoadBalancer {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self {
            dynamic: stream.get()?,
            tiles_preallocated: stream.get()?,
            handle: stream.get()?,
        })
    }
}

impl WorkItem for SetLoadBalancer {
    fn tag(&self) -> WorkTag {
        tags::SET_LOAD_BALANCER
    }

    fn name(&self) -> &'static str {
        "SetLoadBalancer"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        ctx.set_load_balancer(if self.dynamic {
            TiledLoadBalancer::DynamicWorker { handle: self.handle }
        } else {
            TiledLoadBalancer::StaticWorker
        });
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        ctx.set_load_balancer(if self.dynamic {
            TiledLoadBalancer::DynamicMaster {
                handle: self.handle,
                tiles_preallocated: self.tiles_preallocated,
            }
        } else {
            TiledLoadBalancer::StaticMaster
        });
        Ok(())
    }
}

/// Loads a module by name on every rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadModule {
    /// Module name.
    pub name: String,
    /// Loader result on this rank: zero on success. Not part of the payload.
    pub error_code: i32,
}

impl LoadModule {
    /// Creates the command.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error_code: 0,
        }
    }
}

impl Encode for LoadModule {
    fn encode(&self, stream: &mut WriteStream) {
        self.name.encode(stream);
    }
}

impl Decode for LoadModule {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_string().map(Self::new)
    }
}

impl WorkItem for LoadModule {
    fn tag(&self) -> WorkTag {
        tags::LOAD_MODULE
    }

    fn name(&self) -> &'static str {
        "LoadModule"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.error_code = ctx.modules().load_module(&self.name);
        if self.error_code != 0 {
            tracing::warn!(rank = ctx.rank(), module = %self.name, code = self.error_code, "module failed to load");
        }
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.run(ctx)
    }
}

/// Shuts the cluster down.
///
/// On the master this quiesces messaging. Everywhere else it does the same
/// and then ends the rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandFinalize;

impl Encode for CommandFinalize {
    fn encode(&self, _stream: &mut WriteStream) {}
}

impl Decode for CommandFinalize {
    fn decode(_stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self)
    }
}

impl WorkItem for CommandFinalize {
    fn tag(&self) -> WorkTag {
        tags::COMMAND_FINALIZE
    }

    fn name(&self) -> &'static str {
        "CommandFinalize"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.run_on_master(ctx)?;
        ctx.terminate();
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        ctx.comm().shutdown()
    }

    fn flushes(&self) -> bool {
        true
    }
}
