//! Framebuffer, rendering and pick commands.

use std::sync::Arc;

use meridian_core::{FrameEvent, ObjectKind, RenderFuture};
use meridian_shared::{
    CodecResult, Decode, Encode, FrameBufferChannels, FrameBufferFormat, Handle, PickResult, ReadStream, Vec2f,
    Vec2i, WriteStream, FIRST_WORKER_RANK, MASTER_RANK,
};

use super::{tags, WorkItem, WorkTag};
use crate::context::ClusterContext;
use crate::error::ClusterResult;
use crate::render_task::RenderTask;

/// Creates a framebuffer. Framebuffers are mirrored on every rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreateFrameBuffer {
    /// Handle the framebuffer is bound to.
    pub handle: Handle,
    /// Size in pixels.
    pub size: Vec2i,
    /// Color format.
    pub format: FrameBufferFormat,
    /// Channels to allocate.
    pub channels: FrameBufferChannels,
}

impl CreateFrameBuffer {
    /// Creates the command.
    #[must_use]
    pub const fn new(handle: Handle, size: Vec2i, format: FrameBufferFormat, channels: FrameBufferChannels) -> Self {
        Self {
            handle,
            size,
            format,
            channels,
        }
    }
}

impl Encode for CreateFrameBuffer {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.handle)
            .put(&self.size)
            .put(&self.format)
            .put(&self.channels);
    }
}

impl Decode for CreateFrameBuffer {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self {
            handle: stream.get()?,
            size: stream.get()?,
            format: stream.get()?,
            channels: stream.get()?,
        })
    }
}

impl WorkItem for CreateFrameBuffer {
    fn tag(&self) -> WorkTag {
        tags::CREATE_FRAME_BUFFER
    }

    fn name(&self) -> &'static str {
        "CreateFrameBuffer"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let frame_buffer = ctx
            .factory()
            .create_frame_buffer(self.size, self.format, self.channels)
            .map_err(|e| ctx.object_error(e))?;
        ctx.assign(self.handle, frame_buffer)
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.run(ctx)
    }
}

/// Discards a framebuffer's accumulated samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetAccumulation {
    /// The framebuffer.
    pub handle: Handle,
}

impl ResetAccumulation {
    /// Creates the command.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Encode for ResetAccumulation {
    fn encode(&self, stream: &mut WriteStream) {
        self.handle.encode(stream);
    }
}

impl Decode for ResetAccumulation {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.get().map(Self::new)
    }
}

impl WorkItem for ResetAccumulation {
    fn tag(&self) -> WorkTag {
        tags::RESET_ACCUMULATION
    }

    fn name(&self) -> &'static str {
        "ResetAccumulation"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if let Some(frame_buffer) = ctx.lookup_kind(self.handle, ObjectKind::FrameBuffer)?.as_frame_buffer() {
            frame_buffer.clear();
        }
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.run(ctx)
    }
}

/// Starts rendering a frame without waiting for it.
///
/// The result is published through a [`RenderFuture`] bound to `future`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderFrameAsync {
    /// Target framebuffer.
    pub frame_buffer: Handle,
    /// Renderer to use.
    pub renderer: Handle,
    /// Camera; may be null.
    pub camera: Handle,
    /// World; may be null.
    pub world: Handle,
    /// Handle the future is bound to.
    pub future: Handle,
}

impl RenderFrameAsync {
    /// Creates the command.
    #[must_use]
    pub const fn new(frame_buffer: Handle, renderer: Handle, camera: Handle, world: Handle, future: Handle) -> Self {
        Self {
            frame_buffer,
            renderer,
            camera,
            world,
            future,
        }
    }

    /// Rendezvous, pin the dependencies and hand the render to the pool.
    ///
    /// Only full mirrors pass a camera and world to the renderer.
    fn submit(&self, ctx: &mut ClusterContext, full_mirror: bool) -> ClusterResult<()> {
        ctx.groups().world.barrier(ctx.comm())?;

        let frame_buffer = Arc::clone(ctx.lookup_kind(self.frame_buffer, ObjectKind::FrameBuffer)?);
        let renderer = Arc::clone(ctx.lookup_kind(self.renderer, ObjectKind::Renderer)?);
        let (camera, world) = if full_mirror {
            (
                ctx.lookup_optional(self.camera)?.cloned(),
                ctx.lookup_optional(self.world)?.cloned(),
            )
        } else {
            (None, None)
        };

        if let Some(target) = frame_buffer.as_frame_buffer() {
            target.set_completed_event(FrameEvent::NoneFinished);
        }

        let future = Arc::new(RenderFuture::new(self.frame_buffer));
        let task = RenderTask::new(frame_buffer, renderer, camera, world, Arc::clone(&future));
        if let Err(err) = ctx.assign_future(self.future, future) {
            task.abandon();
            return Err(err);
        }

        tracing::debug!(
            rank = ctx.rank(),
            frame_buffer = %self.frame_buffer,
            future = %self.future,
            "render task submitted"
        );
        ctx.scheduler().submit(move || task.run());
        Ok(())
    }
}

impl Encode for RenderFrameAsync {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.frame_buffer)
            .put(&self.renderer)
            .put(&self.camera)
            .put(&self.world)
            .put(&self.future);
    }
}

impl Decode for RenderFrameAsync {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self {
            frame_buffer: stream.get()?,
            renderer: stream.get()?,
            camera: stream.get()?,
            world: stream.get()?,
            future: stream.get()?,
        })
    }
}

impl WorkItem for RenderFrameAsync {
    fn tag(&self) -> WorkTag {
        tags::RENDER_FRAME_ASYNC
    }

    fn name(&self) -> &'static str {
        "RenderFrameAsync"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.submit(ctx, true)
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        self.submit(ctx, false)
    }

    fn flushes(&self) -> bool {
        true
    }
}

/// Screen-space point query, answered by the first worker.
///
/// ```text
/// master            worker 0 (world rank 1)      other workers
///   │ recv ◄──────── send(PICK)                    │
///   │                 barrier(worker) ◄──────────► barrier(worker)
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pick {
    /// Framebuffer the screen coordinate refers to.
    pub frame_buffer: Handle,
    /// Renderer answering the query.
    pub renderer: Handle,
    /// Camera; may be null.
    pub camera: Handle,
    /// World; may be null.
    pub world: Handle,
    /// Normalized screen coordinate.
    pub screen: Vec2f,
    /// The answer. Filled in on the master and the designated worker; not
    /// part of the wire payload.
    pub result: PickResult,
}

impl Pick {
    /// Creates the command.
    #[must_use]
    pub const fn new(frame_buffer: Handle, renderer: Handle, camera: Handle, world: Handle, screen: Vec2f) -> Self {
        Self {
            frame_buffer,
            renderer,
            camera,
            world,
            screen,
            result: PickResult::miss(),
        }
    }

    fn compute(&self, ctx: &ClusterContext) -> ClusterResult<PickResult> {
        let frame_buffer = ctx.lookup_kind(self.frame_buffer, ObjectKind::FrameBuffer)?;
        let renderer = ctx.lookup_kind(self.renderer, ObjectKind::Renderer)?;
        let camera = ctx.lookup_optional(self.camera)?;
        let world = ctx.lookup_optional(self.world)?;

        Ok(match (renderer.as_renderer(), frame_buffer.as_frame_buffer()) {
            (Some(renderer), Some(frame_buffer)) => renderer.pick(
                frame_buffer,
                camera.map(|object| &**object),
                world.map(|object| &**object),
                self.screen,
            ),
            _ => PickResult::miss(),
        })
    }
}

impl Encode for Pick {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.frame_buffer)
            .put(&self.renderer)
            .put(&self.camera)
            .put(&self.world)
            .put(&self.screen);
    }
}

impl Decode for Pick {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self::new(
            stream.get()?,
            stream.get()?,
            stream.get()?,
            stream.get()?,
            stream.get()?,
        ))
    }
}

impl WorkItem for Pick {
    fn tag(&self) -> WorkTag {
        tags::PICK
    }

    fn name(&self) -> &'static str {
        "Pick"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if ctx.rank() == FIRST_WORKER_RANK {
            self.result = self.compute(ctx)?;
            let mut reply = WriteStream::with_capacity(PickResult::SIZE);
            reply.write_pod(&self.result);
            ctx.comm().send(MASTER_RANK, tags::PICK, reply.into_inner())?;
            tracing::debug!(rank = ctx.rank(), hit = self.result.is_hit(), "pick result sent");
        }
        ctx.groups().worker.barrier(ctx.comm())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let reply = ctx.comm().recv(FIRST_WORKER_RANK, tags::PICK)?;
        self.result = ReadStream::new(&reply).read_pod()?;
        tracing::debug!(hit = self.result.is_hit(), "pick result received");
        Ok(())
    }

    fn flushes(&self) -> bool {
        true
    }
}
