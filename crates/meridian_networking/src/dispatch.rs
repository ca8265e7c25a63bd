//! # Command Dispatch
//!
//! ## Master
//!
//! Every call on [`MasterDispatcher`] builds one work item and:
//! 1. Appends its `[tag][payload]` frame to the outgoing batch
//! 2. Sends the batch to the worker group if it is full or the item needs a
//!    round trip (render, pick, finalize)
//! 3. Runs the item's master-side behavior
//!
//! ## Workers
//!
//! [`WorkerLoop`] receives batches from the master and runs each frame, in
//! order, on the rank's single dispatch stream.

use std::sync::Arc;

use meridian_core::{HandleAllocator, ObjectError, ObjectKind, RenderFuture};
use meridian_shared::{
    DataType, FrameBufferChannels, FrameBufferFormat, Handle, ParamValue, PickResult, ReadStream, Vec2f, Vec2i,
    Vec3i, WriteStream, COMMAND_MESSAGE_TAG, MASTER_RANK,
};

use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};
use crate::work::{
    CommandFinalize, CommandRelease, CommitObject, CreateFrameBuffer, LoadModule, NewData, NewInstance, NewMaterial,
    NewObject, Pick, RemoveParam, RenderFrameAsync, ResetAccumulation, SetLoadBalancer, SetParam, SetRegion, Work,
    WorkTypeRegistry,
};

/// The master's command API.
#[derive(Debug)]
pub struct MasterDispatcher {
    ctx: ClusterContext,
    handles: HandleAllocator,
    batch: WriteStream,
    max_batch_bytes: usize,
}

impl MasterDispatcher {
    /// Wraps the master's context.
    ///
    /// # Errors
    ///
    /// `Config` if `ctx` does not belong to the master rank.
    pub fn new(ctx: ClusterContext) -> ClusterResult<Self> {
        if !ctx.is_master() {
            return Err(ClusterError::Config(format!(
                "rank {} cannot dispatch, only rank {MASTER_RANK} can",
                ctx.rank()
            )));
        }
        let max_batch_bytes = ctx.config().max_batch_bytes;
        Ok(Self {
            ctx,
            handles: HandleAllocator::new(),
            batch: WriteStream::with_capacity(max_batch_bytes),
            max_batch_bytes,
        })
    }

    /// The master's context.
    #[must_use]
    pub const fn context(&self) -> &ClusterContext {
        &self.ctx
    }

    /// Bytes waiting in the outgoing batch.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.batch.len()
    }

    /// Replicates one work item and runs its master-side behavior.
    ///
    /// Returns the item after it ran, so callers can read results it
    /// recorded (pick results, module error codes).
    ///
    /// # Errors
    ///
    /// A substrate failure while sending, or the item's own failure.
    pub fn dispatch(&mut self, work: impl Into<Work>) -> ClusterResult<Work> {
        let mut work = work.into();
        tracing::trace!(tag = work.tag(), name = work.name(), "dispatch");

        work.encode_frame(&mut self.batch);
        if work.as_item().flushes() || self.batch.len() >= self.max_batch_bytes {
            self.flush()?;
        }

        work.as_item_mut().run_on_master(&mut self.ctx)?;
        Ok(work)
    }

    /// Sends the outgoing batch to every worker.
    ///
    /// # Errors
    ///
    /// The first substrate failure.
    pub fn flush(&mut self) -> ClusterResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let bytes = self.batch.take();
        tracing::trace!(bytes = bytes.len(), "flush");
        self.ctx
            .groups()
            .worker
            .send_all(self.ctx.comm(), COMMAND_MESSAGE_TAG, &bytes)
    }

    /// Creates an object described by kind and type name.
    ///
    /// # Errors
    ///
    /// `Object` with `UnknownType` if `kind` is built by another command,
    /// or any dispatch failure.
    pub fn new_object(&mut self, kind: ObjectKind, type_name: &str) -> ClusterResult<Handle> {
        let handle = self.handles.allocate();
        let Some(item) = NewObject::new(kind, type_name, handle) else {
            self.handles.free(handle);
            return Err(self.ctx.object_error(ObjectError::UnknownType {
                kind,
                type_name: type_name.to_owned(),
            }));
        };
        self.dispatch(item)?;
        Ok(handle)
    }

    /// Creates a world.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn new_world(&mut self) -> ClusterResult<Handle> {
        self.new_object(ObjectKind::World, "")
    }

    /// Creates a material for `renderer_type`.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn new_material(&mut self, renderer_type: &str, material_type: &str) -> ClusterResult<Handle> {
        let handle = self.handles.allocate();
        self.dispatch(NewMaterial::new(renderer_type, material_type, handle))?;
        Ok(handle)
    }

    /// Places `model` in the scene as an instance of `kind`.
    ///
    /// # Errors
    ///
    /// `Object` with `UnknownType` if `kind` is not an instance kind, or any
    /// dispatch failure.
    pub fn new_instance(&mut self, kind: ObjectKind, model: Handle) -> ClusterResult<Handle> {
        let handle = self.handles.allocate();
        let Some(item) = NewInstance::new(kind, model, handle) else {
            self.handles.free(handle);
            return Err(self.ctx.object_error(ObjectError::UnknownType {
                kind,
                type_name: String::new(),
            }));
        };
        self.dispatch(item)?;
        Ok(handle)
    }

    /// Creates a data array from raw element bytes.
    ///
    /// # Errors
    ///
    /// `Object` with `DataSizeMismatch`, or any dispatch failure.
    pub fn new_data(&mut self, data_type: DataType, count: usize, flags: u32, bytes: Vec<u8>) -> ClusterResult<Handle> {
        let handle = self.handles.allocate();
        match NewData::new(handle, data_type, count, flags, bytes) {
            Ok(item) => {
                self.dispatch(item)?;
                Ok(handle)
            }
            Err(err) => {
                self.handles.free(handle);
                Err(err)
            }
        }
    }

    /// Creates an array of object references.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn new_object_data(&mut self, data_type: DataType, flags: u32, objects: &[Handle]) -> ClusterResult<Handle> {
        let handle = self.handles.allocate();
        match NewData::from_handles(handle, data_type, flags, objects) {
            Ok(item) => {
                self.dispatch(item)?;
                Ok(handle)
            }
            Err(err) => {
                self.handles.free(handle);
                Err(err)
            }
        }
    }

    /// Creates a framebuffer.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn new_frame_buffer(
        &mut self,
        size: Vec2i,
        format: FrameBufferFormat,
        channels: FrameBufferChannels,
    ) -> ClusterResult<Handle> {
        let handle = self.handles.allocate();
        self.dispatch(CreateFrameBuffer::new(handle, size, format, channels))?;
        Ok(handle)
    }

    /// Sets a parameter.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn set_param(&mut self, handle: Handle, name: &str, value: impl Into<ParamValue>) -> ClusterResult<()> {
        self.dispatch(SetParam::new(handle, name, value)).map(drop)
    }

    /// Removes a parameter.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn remove_param(&mut self, handle: Handle, name: &str) -> ClusterResult<()> {
        self.dispatch(RemoveParam::new(handle, name)).map(drop)
    }

    /// Commits an object.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn commit(&mut self, handle: Handle) -> ClusterResult<()> {
        self.dispatch(CommitObject::new(handle)).map(drop)
    }

    /// Releases a handle everywhere and recycles it.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn release(&mut self, handle: Handle) -> ClusterResult<()> {
        self.dispatch(CommandRelease::new(handle))?;
        self.handles.free(handle);
        Ok(())
    }

    /// Replaces a region of a volume.
    ///
    /// # Errors
    ///
    /// `OversizedPayload` or `Object` before anything is sent, or any
    /// dispatch failure.
    pub fn set_region(
        &mut self,
        volume: Handle,
        bytes: Vec<u8>,
        origin: Vec3i,
        size: Vec3i,
        data_type: DataType,
    ) -> ClusterResult<()> {
        let item = SetRegion::new(volume, bytes, origin, size, data_type)?;
        self.dispatch(item).map(drop)
    }

    /// Clears a framebuffer's accumulated samples.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn reset_accumulation(&mut self, frame_buffer: Handle) -> ClusterResult<()> {
        self.dispatch(ResetAccumulation::new(frame_buffer)).map(drop)
    }

    /// Starts a frame and returns the handle of its future.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn render_frame_async(
        &mut self,
        frame_buffer: Handle,
        renderer: Handle,
        camera: Handle,
        world: Handle,
    ) -> ClusterResult<Handle> {
        let future = self.handles.allocate();
        self.dispatch(RenderFrameAsync::new(frame_buffer, renderer, camera, world, future))?;
        Ok(future)
    }

    /// The master's future for a render started with
    /// [`MasterDispatcher::render_frame_async`].
    #[must_use]
    pub fn future(&self, handle: Handle) -> Option<Arc<RenderFuture>> {
        self.ctx.future(handle)
    }

    /// Casts a ray through `screen` on the first worker.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn pick(
        &mut self,
        frame_buffer: Handle,
        renderer: Handle,
        camera: Handle,
        world: Handle,
        screen: Vec2f,
    ) -> ClusterResult<PickResult> {
        match self.dispatch(Pick::new(frame_buffer, renderer, camera, world, screen))? {
            Work::Pick(pick) => Ok(pick.result),
            _ => Ok(PickResult::miss()),
        }
    }

    /// Loads a module everywhere, returning the master's error code.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn load_module(&mut self, name: &str) -> ClusterResult<i32> {
        match self.dispatch(LoadModule::new(name))? {
            Work::LoadModule(module) => Ok(module.error_code),
            _ => Ok(0),
        }
    }

    /// Selects the tile load balancer.
    ///
    /// # Errors
    ///
    /// Any dispatch failure.
    pub fn set_load_balancer(&mut self, dynamic: bool, tiles_preallocated: i32) -> ClusterResult<()> {
        let handle = if dynamic { self.handles.allocate() } else { Handle::NULL };
        self.dispatch(SetLoadBalancer::new(dynamic, tiles_preallocated, handle))
            .map(drop)
    }

    /// Shuts the cluster down and returns the master's context.
    ///
    /// # Errors
    ///
    /// A substrate failure while sending the final batch.
    pub fn finalize(mut self) -> ClusterResult<ClusterContext> {
        self.dispatch(CommandFinalize)?;
        tracing::info!("master finalized");
        Ok(self.ctx)
    }
}

/// A worker's dispatch stream.
#[derive(Debug)]
pub struct WorkerLoop {
    ctx: ClusterContext,
    registry: Arc<WorkTypeRegistry>,
}

impl WorkerLoop {
    /// Creates the loop for a worker's context.
    #[must_use]
    pub const fn new(ctx: ClusterContext, registry: Arc<WorkTypeRegistry>) -> Self {
        Self { ctx, registry }
    }

    /// The worker's context.
    #[must_use]
    pub const fn context(&self) -> &ClusterContext {
        &self.ctx
    }

    /// Receives and runs batches until finalized.
    ///
    /// Returns the context so callers can inspect the final mirror.
    ///
    /// # Errors
    ///
    /// The first decode, lookup or substrate failure. Failures are fatal for
    /// the rank.
    pub fn run(mut self) -> ClusterResult<ClusterContext> {
        tracing::info!(rank = self.ctx.rank(), "worker started");
        while !self.ctx.is_terminated() {
            let message = self.ctx.comm().recv(MASTER_RANK, COMMAND_MESSAGE_TAG)?;
            self.process_message(&message)?;
        }
        Ok(self.ctx)
    }

    /// Decodes and runs every frame in one batch, returning how many ran.
    ///
    /// # Errors
    ///
    /// As [`WorkerLoop::run`].
    pub fn process_message(&mut self, message: &[u8]) -> ClusterResult<usize> {
        let mut stream = ReadStream::new(message);
        let mut count = 0;
        while !stream.is_exhausted() && !self.ctx.is_terminated() {
            let mut work = self.registry.decode(&mut stream)?;
            tracing::trace!(rank = self.ctx.rank(), name = work.name(), "run");
            if let Err(err) = work.as_item_mut().run(&mut self.ctx) {
                tracing::warn!(rank = self.ctx.rank(), name = work.name(), %err, "work item failed");
                return Err(err);
            }
            count += 1;
        }
        Ok(count)
    }
}
