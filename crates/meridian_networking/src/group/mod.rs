//! # Process Groups
//!
//! A cluster is addressed through three well-known groups:
//!
//! ```text
//! world   rank 0 ─ rank 1 ─ rank 2 ─ ... ─ rank n-1
//! app     rank 0                                    (the master)
//! worker            rank 1 ─ rank 2 ─ ... ─ rank n-1 (renumbered from 0)
//! ```
//!
//! The transport underneath is a [`Communicator`]: blocking point-to-point
//! messages matched on (source, tag), plus one barrier per group. None of its
//! operations time out.

mod barrier;
mod fabric;

pub use barrier::GroupBarrier;
pub use fabric::{LocalEndpoint, LocalFabric};

use std::fmt;

use meridian_shared::MASTER_RANK;

use crate::error::{ClusterError, ClusterResult};

/// The well-known groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Every rank.
    World,
    /// The ranks running the application (the master).
    App,
    /// The rendering workers.
    Worker,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::World => "world",
            Self::App => "app",
            Self::Worker => "worker",
        })
    }
}

/// Messaging substrate seen from one rank.
pub trait Communicator: Send + Sync {
    /// This rank's world rank.
    fn rank(&self) -> usize;

    /// Number of ranks in the world.
    fn size(&self) -> usize;

    /// Sends `bytes` to world rank `dest`. Messages between one pair of ranks
    /// arrive in the order they were sent.
    ///
    /// # Errors
    ///
    /// `Substrate` if the message cannot be delivered.
    fn send(&self, dest: usize, tag: u32, bytes: Vec<u8>) -> ClusterResult<()>;

    /// Blocks until a message with `tag` arrives from world rank `source`.
    ///
    /// # Errors
    ///
    /// `Substrate` if the source is gone.
    fn recv(&self, source: usize, tag: u32) -> ClusterResult<Vec<u8>>;

    /// Blocks until every member of `group` has reached the barrier.
    ///
    /// # Errors
    ///
    /// `Substrate` if the barrier cannot be completed.
    fn barrier(&self, group: GroupKind) -> ClusterResult<()>;

    /// Quiesces this rank's messaging. Later sends fail.
    ///
    /// # Errors
    ///
    /// `Substrate` if the substrate cannot be finalized.
    fn shutdown(&self) -> ClusterResult<()>;
}

/// One rank's view of a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    kind: GroupKind,
    /// World ranks of the members, in group-rank order.
    members: Vec<usize>,
    /// This rank's position in `members`, if it is one.
    rank: Option<usize>,
}

impl Group {
    /// Creates the view of `kind` for the rank `world_rank`.
    #[must_use]
    pub fn new(kind: GroupKind, members: Vec<usize>, world_rank: usize) -> Self {
        let rank = members.iter().position(|&member| member == world_rank);
        Self { kind, members, rank }
    }

    /// Which group this is.
    #[must_use]
    pub const fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Returns true if this rank is a member.
    #[must_use]
    pub const fn contains_me(&self) -> bool {
        self.rank.is_some()
    }

    /// This rank's rank within the group.
    #[must_use]
    pub const fn rank(&self) -> Option<usize> {
        self.rank
    }

    /// Number of members.
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// World ranks of the members.
    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Maps a group rank to its world rank.
    #[must_use]
    pub fn world_rank(&self, group_rank: usize) -> Option<usize> {
        self.members.get(group_rank).copied()
    }

    /// Group-wide rendezvous.
    ///
    /// # Errors
    ///
    /// `NotAMember` if this rank is outside the group, or a substrate failure.
    pub fn barrier(&self, comm: &dyn Communicator) -> ClusterResult<()> {
        if !self.contains_me() {
            return Err(ClusterError::NotAMember { group: self.kind });
        }
        comm.barrier(self.kind)
    }

    /// Sends the same message to every member other than this rank.
    ///
    /// # Errors
    ///
    /// The first substrate failure.
    pub fn send_all(&self, comm: &dyn Communicator, tag: u32, bytes: &[u8]) -> ClusterResult<()> {
        let me = comm.rank();
        for &member in self.members.iter().filter(|&&member| member != me) {
            comm.send(member, tag, bytes.to_vec())?;
        }
        Ok(())
    }
}

/// The three groups as seen from one rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessGroups {
    /// Every rank.
    pub world: Group,
    /// The master.
    pub app: Group,
    /// The rendering workers.
    pub worker: Group,
}

impl ProcessGroups {
    /// Builds the master/worker layout for `world_size` ranks.
    #[must_use]
    pub fn new(world_rank: usize, world_size: usize) -> Self {
        Self {
            world: Group::new(GroupKind::World, (0..world_size).collect(), world_rank),
            app: Group::new(GroupKind::App, vec![MASTER_RANK], world_rank),
            worker: Group::new(
                GroupKind::Worker,
                (0..world_size).filter(|&rank| rank != MASTER_RANK).collect(),
                world_rank,
            ),
        }
    }

    /// The group of the given kind.
    #[must_use]
    pub fn group(&self, kind: GroupKind) -> &Group {
        match kind {
            GroupKind::World => &self.world,
            GroupKind::App => &self.app,
            GroupKind::Worker => &self.worker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_view() {
        let groups = ProcessGroups::new(0, 4);
        assert_eq!(groups.world.rank(), Some(0));
        assert_eq!(groups.world.size(), 4);
        assert_eq!(groups.app.rank(), Some(0));
        assert!(!groups.worker.contains_me());
        assert_eq!(groups.worker.size(), 3);
    }

    #[test]
    fn test_worker_view() {
        let groups = ProcessGroups::new(2, 4);
        assert_eq!(groups.world.rank(), Some(2));
        assert!(!groups.app.contains_me());
        assert_eq!(groups.worker.rank(), Some(1));
        assert_eq!(groups.worker.world_rank(0), Some(1));
        assert_eq!(groups.worker.members(), &[1, 2, 3]);
        assert_eq!(groups.group(GroupKind::Worker).kind(), GroupKind::Worker);
    }

    #[test]
    fn test_barrier_requires_membership() {
        let mut endpoints = LocalFabric::spawn(2);
        let master = endpoints.remove(0);
        let groups = ProcessGroups::new(0, 2);
        assert!(matches!(
            groups.worker.barrier(&master),
            Err(ClusterError::NotAMember { group: GroupKind::Worker })
        ));
        assert!(groups.app.barrier(&master).is_ok());
    }
}
