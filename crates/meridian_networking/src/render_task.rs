//! # Deferred Render Tasks
//!
//! `RenderFrameAsync` hands the render call to a thread pool so the
//! dispatch stream keeps accepting commands while a frame renders.
//!
//! ```text
//! dispatch stream ──► RenderTask::new (ref_inc deps)
//!                           │
//!                           ▼ spawn_blocking
//!                   render_frame ─► ref_dec deps ─► future.complete()
//! ```
//!
//! A submitted task always runs to completion; there is no cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use meridian_core::{FrameEvent, ManagedObject, RenderFuture};

use crate::error::ClusterResult;

/// Thread pool that runs deferred renders, one per rank.
#[derive(Debug)]
pub struct TaskScheduler {
    runtime: Runtime,
    in_flight: Arc<AtomicUsize>,
}

impl TaskScheduler {
    /// Starts a pool with `threads` render threads.
    ///
    /// # Errors
    ///
    /// `Io` if the runtime's threads cannot be spawned.
    pub fn new(threads: usize, rank: usize) -> ClusterResult<Self> {
        let threads = threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .max_blocking_threads(threads)
            .thread_name(format!("meridian-render-{rank}"))
            .build()?;
        Ok(Self {
            runtime,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Runs `job` on the pool without waiting for it.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::AcqRel);
        drop(self.runtime.spawn_blocking(move || {
            job();
            in_flight.fetch_sub(1, Ordering::AcqRel);
        }));
    }

    /// Number of submitted jobs that have not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// One deferred render call and the strong references it depends on.
///
/// Building the record increments the ref count of every dependency;
/// running it decrements them again once the render call has returned.
#[derive(Debug)]
pub struct RenderTask {
    frame_buffer: Arc<dyn ManagedObject>,
    renderer: Arc<dyn ManagedObject>,
    camera: Option<Arc<dyn ManagedObject>>,
    world: Option<Arc<dyn ManagedObject>>,
    future: Arc<RenderFuture>,
}

impl RenderTask {
    /// Takes ownership of the dependencies and pins them.
    #[must_use]
    pub fn new(
        frame_buffer: Arc<dyn ManagedObject>,
        renderer: Arc<dyn ManagedObject>,
        camera: Option<Arc<dyn ManagedObject>>,
        world: Option<Arc<dyn ManagedObject>>,
        future: Arc<RenderFuture>,
    ) -> Self {
        let task = Self {
            frame_buffer,
            renderer,
            camera,
            world,
            future,
        };
        for dependency in task.dependencies() {
            dependency.ref_inc();
        }
        task
    }

    fn dependencies(&self) -> impl Iterator<Item = &Arc<dyn ManagedObject>> {
        [Some(&self.frame_buffer), Some(&self.renderer), self.camera.as_ref(), self.world.as_ref()]
            .into_iter()
            .flatten()
    }

    /// Undoes the ref count increments without rendering.
    pub fn abandon(self) {
        for dependency in self.dependencies() {
            dependency.ref_dec();
        }
    }

    /// Renders, unpins the dependencies and completes the future.
    pub fn run(self) {
        let variance = match (self.renderer.as_renderer(), self.frame_buffer.as_frame_buffer()) {
            (Some(renderer), Some(frame_buffer)) => renderer.render_frame(
                frame_buffer,
                self.camera.as_deref(),
                self.world.as_deref(),
            ),
            _ => {
                tracing::warn!(
                    renderer = %self.renderer.kind(),
                    frame_buffer = %self.frame_buffer.kind(),
                    "render task dependencies lack the render interfaces"
                );
                f32::INFINITY
            }
        };

        if let Some(frame_buffer) = self.frame_buffer.as_frame_buffer() {
            frame_buffer.set_completed_event(FrameEvent::TaskFinished);
        }
        for dependency in self.dependencies() {
            dependency.ref_dec();
        }

        tracing::debug!(frame_buffer = %self.future.frame_buffer(), variance, "render task complete");
        self.future.complete(variance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{BasicFrameBuffer, BasicRenderer};
    use meridian_shared::{FrameBufferChannels, FrameBufferFormat, Handle, Vec2i};
    use std::time::Duration;

    fn frame_buffer() -> Arc<dyn ManagedObject> {
        Arc::new(BasicFrameBuffer::new(
            Vec2i::new(8, 8),
            FrameBufferFormat::Rgba8,
            FrameBufferChannels::COLOR,
        ))
    }

    #[test]
    fn test_task_balances_refs() {
        let fb = frame_buffer();
        let renderer: Arc<dyn ManagedObject> = Arc::new(BasicRenderer::new("scivis"));
        let future = Arc::new(RenderFuture::new(Handle::new(1, 1)));

        let task = RenderTask::new(
            Arc::clone(&fb),
            Arc::clone(&renderer),
            None,
            None,
            Arc::clone(&future),
        );
        assert_eq!(fb.base().ref_count(), 2);
        assert_eq!(renderer.base().ref_count(), 2);
        assert!(!future.is_ready());

        task.run();
        assert!(future.is_ready());
        assert_eq!(fb.base().ref_count(), 1);
        assert_eq!(renderer.base().ref_count(), 1);
        assert_eq!(
            fb.as_frame_buffer().unwrap().completed_event(),
            FrameEvent::TaskFinished
        );
    }

    #[test]
    fn test_abandon_restores_refs() {
        let fb = frame_buffer();
        let renderer: Arc<dyn ManagedObject> = Arc::new(BasicRenderer::new("debug"));
        let task = RenderTask::new(
            Arc::clone(&fb),
            Arc::clone(&renderer),
            None,
            None,
            Arc::new(RenderFuture::new(Handle::NULL)),
        );
        task.abandon();
        assert_eq!(fb.base().ref_count(), 1);
        assert_eq!(renderer.base().ref_count(), 1);
    }

    #[test]
    fn test_scheduler_runs_jobs() {
        let scheduler = TaskScheduler::new(2, 0).unwrap();
        let future = Arc::new(RenderFuture::new(Handle::new(2, 1)));
        let signalled = Arc::clone(&future);

        scheduler.submit(move || signalled.complete(0.5));
        assert_eq!(future.wait_timeout(Duration::from_secs(5)), Some(0.5));
    }
}
