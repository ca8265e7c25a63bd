//! # Handle Allocator
//!
//! Master-side source of fresh handles. Workers never allocate: they bind
//! whatever handle arrives in the creation command.

use meridian_shared::Handle;

/// Free-list handle allocator with per-slot generations.
///
/// A freed index is handed out again with a bumped generation, so a stale
/// handle can never alias the next object in the same slot.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    /// Current generation per index.
    generations: Vec<u32>,
    /// Whether each index is currently handed out.
    alive: Vec<bool>,
    /// Indices available for reuse.
    free_list: Vec<u32>,
    /// Number of live handles.
    live: usize,
}

impl HandleAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles currently handed out.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live
    }

    /// Hands out a fresh, never-null handle.
    pub fn allocate(&mut self) -> Handle {
        let index = if let Some(index) = self.free_list.pop() {
            index
        } else {
            let index = u32::try_from(self.generations.len()).unwrap_or(u32::MAX);
            self.generations.push(1);
            self.alive.push(false);
            index
        };

        let slot = index as usize;
        self.alive[slot] = true;
        self.live += 1;
        Handle::new(index, self.generations[slot])
    }

    /// Returns true if `handle` is currently handed out.
    #[must_use]
    pub fn is_live(&self, handle: Handle) -> bool {
        let slot = handle.index() as usize;
        !handle.is_null()
            && self.alive.get(slot).copied().unwrap_or(false)
            && self.generations[slot] == handle.generation()
    }

    /// Returns a handle to the pool. Returns false if it was not live.
    pub fn free(&mut self, handle: Handle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        let slot = handle.index() as usize;
        self.alive[slot] = false;
        // Generation zero is reserved for the null handle
        self.generations[slot] = self.generations[slot].wrapping_add(1).max(1);
        self.free_list.push(handle.index());
        self.live -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_unique() {
        let mut allocator = HandleAllocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        assert_ne!(a, b);
        assert!(!a.is_null());
        assert!(!b.is_null());
        assert_eq!(allocator.live_count(), 2);
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut allocator = HandleAllocator::new();
        let first = allocator.allocate();
        assert!(allocator.free(first));
        assert!(!allocator.free(first));

        let second = allocator.allocate();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!allocator.is_live(first));
        assert!(allocator.is_live(second));
    }

    #[test]
    fn test_null_is_never_live() {
        let mut allocator = HandleAllocator::new();
        let _ = allocator.allocate();
        assert!(!allocator.is_live(Handle::NULL));
        assert!(!allocator.free(Handle::NULL));
    }
}
