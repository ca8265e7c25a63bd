//! # Protocol Constants
//!
//! Values every rank must agree on. Changing any of them changes the wire
//! protocol, so all ranks must be rebuilt together.

// =============================================================================
// RANKS
// =============================================================================

/// World rank of the coordinating process.
pub const MASTER_RANK: usize = 0;

/// World rank of the first rendering worker.
///
/// This is rank 0 of the worker group and the rank that answers pick queries.
pub const FIRST_WORKER_RANK: usize = 1;

// =============================================================================
// MESSAGE TAGS
// =============================================================================

/// Point-to-point tag carrying batched command frames from master to workers.
pub const COMMAND_MESSAGE_TAG: u32 = 0x00C0_FFEE;

// =============================================================================
// LIMITS
// =============================================================================

/// Largest raw block a single region update may carry, in bytes.
pub const MAX_REGION_BYTES: u64 = 2_000_000_000;

/// Default size at which the master flushes its outgoing command batch.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 64 * 1024;
