//! # Local Fabric
//!
//! An in-process [`Communicator`]: every rank is a thread, every ordered pair
//! of ranks gets its own unbounded `crossbeam` channel, so per-pair ordering
//! is the channel's FIFO order.
//!
//! A receive for (source, tag) parks messages with other tags in a pending
//! queue, the way an MPI receive skips unmatched envelopes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use meridian_shared::MASTER_RANK;

use super::{Communicator, GroupBarrier, GroupKind};
use crate::error::{ClusterError, ClusterResult};

/// One message in flight.
#[derive(Debug)]
struct Envelope {
    tag: u32,
    bytes: Vec<u8>,
}

/// Barriers shared by all endpoints of one fabric.
#[derive(Debug)]
struct FabricBarriers {
    world: GroupBarrier,
    app: GroupBarrier,
    worker: GroupBarrier,
}

impl FabricBarriers {
    fn get(&self, group: GroupKind) -> &GroupBarrier {
        match group {
            GroupKind::World => &self.world,
            GroupKind::App => &self.app,
            GroupKind::Worker => &self.worker,
        }
    }

    /// Aborts every barrier `rank` takes part in.
    fn abort_member(&self, rank: usize) {
        self.world.abort();
        if rank == MASTER_RANK {
            self.app.abort();
        } else {
            self.worker.abort();
        }
    }
}

/// Factory for connected endpoints.
#[derive(Debug)]
pub struct LocalFabric;

impl LocalFabric {
    /// Creates `size` connected endpoints; endpoint `i` is world rank `i`.
    #[must_use]
    pub fn spawn(size: usize) -> Vec<LocalEndpoint> {
        let mut outboxes: Vec<Vec<Sender<Envelope>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();

        for source in 0..size {
            for dest in 0..size {
                let (tx, rx) = unbounded();
                outboxes[source].push(tx);
                inboxes[dest].push(rx);
            }
        }

        let workers = (0..size).filter(|&rank| rank != MASTER_RANK).count();
        let barriers = Arc::new(FabricBarriers {
            world: GroupBarrier::new(size),
            app: GroupBarrier::new(1),
            worker: GroupBarrier::new(workers),
        });

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalEndpoint {
                rank,
                size,
                outboxes,
                pending: Mutex::new(inboxes.iter().map(|_| VecDeque::new()).collect()),
                inboxes,
                barriers: Arc::clone(&barriers),
                shut_down: AtomicBool::new(false),
            })
            .collect()
    }
}

/// One rank's end of a [`LocalFabric`].
#[derive(Debug)]
pub struct LocalEndpoint {
    rank: usize,
    size: usize,
    /// Indexed by destination rank.
    outboxes: Vec<Sender<Envelope>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Envelope>>,
    /// Received but unmatched messages, indexed by source rank.
    pending: Mutex<Vec<VecDeque<Envelope>>>,
    barriers: Arc<FabricBarriers>,
    shut_down: AtomicBool,
}

impl LocalEndpoint {
    /// Returns true once [`Communicator::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn substrate(&self, message: String) -> ClusterError {
        tracing::warn!(rank = self.rank, %message, "substrate failure");
        ClusterError::Substrate(message)
    }

    fn take_pending(&self, source: usize, tag: u32) -> Option<Vec<u8>> {
        let mut pending = self.pending.lock();
        let queue = pending.get_mut(source)?;
        let position = queue.iter().position(|envelope| envelope.tag == tag)?;
        queue.remove(position).map(|envelope| envelope.bytes)
    }
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: u32, bytes: Vec<u8>) -> ClusterResult<()> {
        if self.is_shut_down() {
            return Err(self.substrate(format!("send to rank {dest} after shutdown")));
        }
        let outbox = self
            .outboxes
            .get(dest)
            .ok_or_else(|| self.substrate(format!("no rank {dest} in a world of {}", self.size)))?;
        outbox
            .send(Envelope { tag, bytes })
            .map_err(|_| self.substrate(format!("rank {dest} is gone")))
    }

    fn recv(&self, source: usize, tag: u32) -> ClusterResult<Vec<u8>> {
        let inbox = self
            .inboxes
            .get(source)
            .ok_or_else(|| self.substrate(format!("no rank {source} in a world of {}", self.size)))?;

        if let Some(bytes) = self.take_pending(source, tag) {
            return Ok(bytes);
        }

        loop {
            let envelope = inbox
                .recv()
                .map_err(|_| self.substrate(format!("rank {source} is gone")))?;
            if envelope.tag == tag {
                return Ok(envelope.bytes);
            }
            self.pending.lock()[source].push_back(envelope);
        }
    }

    fn barrier(&self, group: GroupKind) -> ClusterResult<()> {
        match self.barriers.get(group).wait() {
            Ok(_) => Ok(()),
            Err(_) => Err(self.substrate(format!("{group} barrier aborted, a rank left the fabric"))),
        }
    }

    fn shutdown(&self) -> ClusterResult<()> {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!(rank = self.rank, "communicator shut down");
        }
        Ok(())
    }
}

impl Drop for LocalEndpoint {
    /// A rank that is gone can never reach another barrier, so peers
    /// blocked in one would wait forever.
    fn drop(&mut self) {
        self.barriers.abort_member(self.rank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_point_to_point_order() {
        let endpoints = LocalFabric::spawn(2);
        for i in 0..5u8 {
            endpoints[0].send(1, 7, vec![i]).unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(endpoints[1].recv(0, 7).unwrap(), vec![i]);
        }
    }

    #[test]
    fn test_tag_matching_parks_other_tags() {
        let endpoints = LocalFabric::spawn(2);
        endpoints[1].send(0, 1, b"first".to_vec()).unwrap();
        endpoints[1].send(0, 2, b"second".to_vec()).unwrap();

        assert_eq!(endpoints[0].recv(1, 2).unwrap(), b"second");
        assert_eq!(endpoints[0].recv(1, 1).unwrap(), b"first");
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let endpoints = LocalFabric::spawn(2);
        endpoints[0].shutdown().unwrap();
        assert!(endpoints[0].is_shut_down());
        assert!(matches!(endpoints[0].send(1, 0, vec![]), Err(ClusterError::Substrate(_))));
        assert!(endpoints[0].send(5, 0, vec![]).is_err());
    }

    #[test]
    fn test_recv_from_dropped_rank() {
        let mut endpoints = LocalFabric::spawn(2);
        let survivor = endpoints.remove(1);
        drop(endpoints);
        assert!(matches!(survivor.recv(0, 0), Err(ClusterError::Substrate(_))));
    }

    #[test]
    fn test_world_barrier() {
        let endpoints = LocalFabric::spawn(3);
        let threads: Vec<_> = endpoints
            .into_iter()
            .map(|endpoint| {
                thread::spawn(move || {
                    endpoint.barrier(GroupKind::World).unwrap();
                    endpoint.rank()
                })
            })
            .collect();

        let mut ranks: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_dropped_rank_aborts_its_barriers() {
        let mut endpoints = LocalFabric::spawn(3);
        let gone = endpoints.pop().unwrap();
        let worker = endpoints.pop().unwrap();
        let master = endpoints.pop().unwrap();

        let waiter = thread::spawn(move || worker.barrier(GroupKind::Worker));
        thread::sleep(std::time::Duration::from_millis(50));
        drop(gone);

        assert!(matches!(waiter.join().unwrap(), Err(ClusterError::Substrate(_))));
        assert!(matches!(master.barrier(GroupKind::World), Err(ClusterError::Substrate(_))));
        assert!(master.barrier(GroupKind::App).is_ok());
    }
}
