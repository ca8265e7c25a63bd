//! # Render Futures
//!
//! The handle-addressed result of an asynchronous render. The task that
//! produces the value lives elsewhere; a future only records completion and
//! lets callers poll or block on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use meridian_shared::Handle;
use parking_lot::{Condvar, Mutex};

use crate::object::{ManagedObject, ObjectBase, ObjectKind};

/// Signal for task completion, carrying the task's result.
#[derive(Debug)]
struct CompletionSignal {
    done: AtomicBool,
    result: Mutex<Option<f32>>,
    condvar: Condvar,
}

impl CompletionSignal {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            result: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }

    fn signal(&self, value: f32) {
        let mut result = self.result.lock();
        *result = Some(value);
        self.done.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn wait(&self) -> f32 {
        let mut result = self.result.lock();
        loop {
            if let Some(value) = *result {
                return value;
            }
            self.condvar.wait(&mut result);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<f32> {
        let mut result = self.result.lock();
        if result.is_none() {
            self.condvar.wait_for(&mut result, timeout);
        }
        *result
    }
}

/// Pending result of a render submitted with `RenderFrameAsync`.
///
/// Never cancelled: once submitted, the task always runs to completion.
#[derive(Debug)]
pub struct RenderFuture {
    base: ObjectBase,
    frame_buffer: Handle,
    completion: CompletionSignal,
}

impl RenderFuture {
    /// Creates a pending future for a render into `frame_buffer`.
    #[must_use]
    pub fn new(frame_buffer: Handle) -> Self {
        Self {
            base: ObjectBase::new(ObjectKind::Future, ""),
            frame_buffer,
            completion: CompletionSignal::new(),
        }
    }

    /// Framebuffer the render targets.
    #[must_use]
    pub const fn frame_buffer(&self) -> Handle {
        self.frame_buffer
    }

    /// Stores the result and wakes every waiter.
    pub fn complete(&self, result: f32) {
        self.completion.signal(result);
    }

    /// Returns true once the task has returned.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.completion.done.load(Ordering::Acquire)
    }

    /// The result, if ready.
    #[must_use]
    pub fn result(&self) -> Option<f32> {
        if !self.is_ready() {
            return None;
        }
        *self.completion.result.lock()
    }

    /// Blocks until the task returns.
    pub fn wait(&self) -> f32 {
        self.completion.wait()
    }

    /// Blocks for at most `timeout`. Returns the result if it arrived.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<f32> {
        self.completion.wait_timeout(timeout)
    }
}

impl ManagedObject for RenderFuture {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn as_future(&self) -> Option<&RenderFuture> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pending_until_complete() {
        let future = RenderFuture::new(Handle::new(1, 1));
        assert!(!future.is_ready());
        assert_eq!(future.result(), None);
        assert_eq!(future.wait_timeout(Duration::from_millis(5)), None);

        future.complete(0.25);
        assert!(future.is_ready());
        assert_eq!(future.result(), Some(0.25));
        assert_eq!(future.wait(), 0.25);
    }

    #[test]
    fn test_wait_across_threads() {
        let future = Arc::new(RenderFuture::new(Handle::new(2, 1)));
        let producer = Arc::clone(&future);

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.complete(1.5);
        });

        assert_eq!(future.wait(), 1.5);
        worker.join().unwrap();
    }
}
