//! # Object Handles
//!
//! A handle names one logically shared object on every rank of the cluster.
//! The master allocates it once; every rank then binds its own local instance
//! to the same value.
//!
//! The 64 bits are split like an entity id:
//! - Lower 32 bits: slot index in the per-rank handle table
//! - Upper 32 bits: generation counter for detecting stale references
//!
//! Generation zero is never issued, which keeps the all-zero value free to act
//! as the null handle.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster-wide object identifier.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// The distinguished "no object" handle.
    pub const NULL: Self = Self(0);

    /// Creates a handle from a slot index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - Slot index in the handle table
    /// * `generation` - Generation of that slot (must be non-zero for a live handle)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Reinterprets a raw 64-bit wire value as a handle.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit wire value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the slot index portion.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "#{}.{}", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_roundtrip() {
        let handle = Handle::new(12345, 67890);
        assert_eq!(handle.index(), 12345);
        assert_eq!(handle.generation(), 67890);
        assert_eq!(Handle::from_raw(handle.raw()), handle);
    }

    #[test]
    fn test_null_handle() {
        assert!(Handle::NULL.is_null());
        assert!(Handle::default().is_null());
        assert!(Handle::new(0, 0).is_null());
        assert!(!Handle::new(0, 1).is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Handle::NULL.to_string(), "null");
        assert_eq!(Handle::new(3, 2).to_string(), "#3.2");
    }
}
