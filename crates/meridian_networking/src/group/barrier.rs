//! Generation-counting rendezvous for one process group.

use parking_lot::{Condvar, Mutex};

use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Default)]
struct BarrierState {
    /// Parties that reached the current generation.
    arrived: usize,
    /// Bumped every time the barrier opens.
    generation: u64,
    /// A party left for good; the barrier can never open again.
    aborted: bool,
}

/// Reusable barrier for a fixed number of parties.
#[derive(Debug)]
pub struct GroupBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
}

impl GroupBarrier {
    /// Creates a barrier that opens once `parties` callers are waiting.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Number of parties.
    #[must_use]
    pub const fn parties(&self) -> usize {
        self.parties
    }

    /// Blocks until every party has arrived.
    ///
    /// Returns true for exactly one caller per generation (the last to arrive).
    ///
    /// # Errors
    ///
    /// `Substrate` if the barrier was aborted before it opened.
    pub fn wait(&self) -> ClusterResult<bool> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(aborted());
        }
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.condvar.notify_all();
            return Ok(true);
        }

        while state.generation == generation {
            if state.aborted {
                state.arrived -= 1;
                return Err(aborted());
            }
            self.condvar.wait(&mut state);
        }
        Ok(false)
    }

    /// Fails every current and future wait.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if !state.aborted {
            state.aborted = true;
            self.condvar.notify_all();
        }
    }

    /// Returns true once [`GroupBarrier::abort`] has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

fn aborted() -> ClusterError {
    ClusterError::Substrate(String::from("barrier aborted: a party left the group"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_party_never_blocks() {
        let barrier = GroupBarrier::new(1);
        assert!(barrier.wait().unwrap());
        assert!(barrier.wait().unwrap());
    }

    #[test]
    fn test_reusable_across_generations() {
        let barrier = Arc::new(GroupBarrier::new(4));
        let leaders = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let leaders = Arc::clone(&leaders);
                thread::spawn(move || {
                    for _ in 0..10 {
                        if barrier.wait().unwrap() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(leaders.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_abort_releases_waiters() {
        let barrier = Arc::new(GroupBarrier::new(3));
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait())
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(50));
        barrier.abort();

        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Err(ClusterError::Substrate(_))));
        }
        assert!(barrier.is_aborted());
        assert!(barrier.wait().is_err());
    }
}
