//! # Object Handle Table
//!
//! Per-rank mapping from [`Handle`] to the local instance of the object it
//! names.
//!
//! Storage is a slab indexed by the handle's slot index. Each slot remembers
//! the generation it was last assigned with, so a lookup through a released
//! handle fails cleanly even after the slot has been reused.
//!
//! ## Ownership
//!
//! The table holds one `Arc` per live handle. Releasing a handle drops that
//! `Arc`; the object itself survives until every task that cloned it is done.

use std::sync::Arc;

use meridian_shared::Handle;

use crate::error::{ObjectError, ObjectResult};
use crate::object::{ManagedObject, ObjectKind};

/// How far past the current slab a new index may land.
///
/// The master hands out indices densely, so a legitimate index never sits
/// this far past the last slot. Anything beyond it is a corrupt frame.
pub const MAX_INDEX_GAP: usize = 1 << 20;

/// One slab slot.
#[derive(Debug, Default)]
struct Slot {
    /// Generation of the handle last assigned here.
    generation: u32,
    /// The live object, if any.
    object: Option<Arc<dyn ManagedObject>>,
}

/// Handle-to-object table owned by one rank's dispatch stream.
///
/// # Thread Safety
///
/// This table is NOT thread-safe. Only the rank's dispatch stream mutates it.
#[derive(Debug, Default)]
pub struct ObjectHandleTable {
    slots: Vec<Slot>,
    live: usize,
}

impl ObjectHandleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with room for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Number of live objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no object is assigned.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Binds `object` to `handle` on this rank.
    ///
    /// # Errors
    ///
    /// Fails for the null handle, for an index more than [`MAX_INDEX_GAP`]
    /// slots past the slab, or if the slot is already occupied.
    pub fn assign(&mut self, handle: Handle, object: Arc<dyn ManagedObject>) -> ObjectResult<()> {
        if handle.is_null() {
            return Err(ObjectError::NullHandle);
        }

        let index = handle.index() as usize;
        if index >= self.slots.len() {
            if index - self.slots.len() >= MAX_INDEX_GAP {
                return Err(ObjectError::HandleOutOfRange {
                    handle,
                    max_gap: MAX_INDEX_GAP,
                });
            }
            self.slots.resize_with(index + 1, Slot::default);
        }

        let slot = &mut self.slots[index];
        if slot.object.is_some() {
            return Err(ObjectError::AlreadyAssigned { handle });
        }

        tracing::trace!(%handle, kind = %object.kind(), "assign");
        slot.generation = handle.generation();
        slot.object = Some(object);
        self.live += 1;
        Ok(())
    }

    /// Resolves a handle if it is live on this rank.
    ///
    /// Used on the master's partial-mirror paths, where absence is expected.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&Arc<dyn ManagedObject>> {
        if handle.is_null() {
            return None;
        }
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    /// Returns true if the handle is live on this rank.
    #[inline]
    #[must_use]
    pub fn is_defined(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Resolves a handle that must be live.
    ///
    /// # Errors
    ///
    /// `NullHandle` for the null handle, `DanglingHandle` if it was never
    /// assigned here or has been released.
    pub fn lookup(&self, handle: Handle) -> ObjectResult<&Arc<dyn ManagedObject>> {
        if handle.is_null() {
            return Err(ObjectError::NullHandle);
        }
        self.get(handle).ok_or(ObjectError::DanglingHandle { handle })
    }

    /// Resolves a handle that must be live and of the given kind.
    ///
    /// # Errors
    ///
    /// As [`ObjectHandleTable::lookup`], plus `KindMismatch`.
    pub fn lookup_kind(&self, handle: Handle, kind: ObjectKind) -> ObjectResult<&Arc<dyn ManagedObject>> {
        let object = self.lookup(handle)?;
        let found = object.kind();
        if found != kind {
            return Err(ObjectError::KindMismatch {
                handle,
                expected: kind,
                found,
            });
        }
        Ok(object)
    }

    /// Resolves a handle that may be null.
    ///
    /// # Errors
    ///
    /// `DanglingHandle` for a non-null handle that is not live.
    pub fn lookup_optional(&self, handle: Handle) -> ObjectResult<Option<&Arc<dyn ManagedObject>>> {
        if handle.is_null() {
            return Ok(None);
        }
        self.lookup(handle).map(Some)
    }

    /// Removes the mapping and drops this table's reference.
    ///
    /// # Errors
    ///
    /// `DanglingHandle` if the handle is not live.
    pub fn release(&mut self, handle: Handle) -> ObjectResult<Arc<dyn ManagedObject>> {
        if handle.is_null() {
            return Err(ObjectError::NullHandle);
        }
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(ObjectError::DanglingHandle { handle })?;
        let object = slot.object.take().ok_or(ObjectError::DanglingHandle { handle })?;

        tracing::trace!(%handle, kind = %object.kind(), "release");
        self.live -= 1;
        Ok(object)
    }

    /// Iterates over all live entries.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Arc<dyn ManagedObject>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let index = u32::try_from(index).ok()?;
            slot.object
                .as_ref()
                .map(|object| (Handle::new(index, slot.generation), object))
        })
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.object = None;
        }
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectBase;

    #[derive(Debug)]
    struct Plain(ObjectBase);

    impl ManagedObject for Plain {
        fn base(&self) -> &ObjectBase {
            &self.0
        }
    }

    fn object(kind: ObjectKind) -> Arc<dyn ManagedObject> {
        Arc::new(Plain(ObjectBase::new(kind, "")))
    }

    #[test]
    fn test_assign_lookup_release() {
        let mut table = ObjectHandleTable::new();
        let handle = Handle::new(3, 1);

        table.assign(handle, object(ObjectKind::World)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(handle).unwrap().kind(), ObjectKind::World);

        table.release(handle).unwrap();
        assert!(table.is_empty());
        assert_eq!(
            table.lookup(handle).unwrap_err(),
            ObjectError::DanglingHandle { handle }
        );
    }

    #[test]
    fn test_lookup_before_assign() {
        let table = ObjectHandleTable::new();
        let handle = Handle::new(0, 1);
        assert_eq!(table.lookup(handle).unwrap_err(), ObjectError::DanglingHandle { handle });
        assert_eq!(table.lookup(Handle::NULL).unwrap_err(), ObjectError::NullHandle);
        assert!(table.lookup_optional(Handle::NULL).unwrap().is_none());
    }

    #[test]
    fn test_double_assign_rejected() {
        let mut table = ObjectHandleTable::new();
        let handle = Handle::new(0, 1);
        table.assign(handle, object(ObjectKind::Camera)).unwrap();
        assert_eq!(
            table.assign(handle, object(ObjectKind::Camera)).unwrap_err(),
            ObjectError::AlreadyAssigned { handle }
        );
        assert_eq!(table.assign(Handle::NULL, object(ObjectKind::Camera)).unwrap_err(), ObjectError::NullHandle);
    }

    #[test]
    fn test_stale_generation() {
        let mut table = ObjectHandleTable::new();
        let old = Handle::new(5, 1);
        let new = Handle::new(5, 2);

        table.assign(old, object(ObjectKind::Light)).unwrap();
        table.release(old).unwrap();
        table.assign(new, object(ObjectKind::Material)).unwrap();

        assert!(table.get(old).is_none());
        assert!(table.release(old).is_err());
        assert_eq!(table.lookup(new).unwrap().kind(), ObjectKind::Material);
    }

    #[test]
    fn test_lookup_kind() {
        let mut table = ObjectHandleTable::new();
        let handle = Handle::new(1, 1);
        table.assign(handle, object(ObjectKind::Volume)).unwrap();

        assert!(table.lookup_kind(handle, ObjectKind::Volume).is_ok());
        assert_eq!(
            table.lookup_kind(handle, ObjectKind::FrameBuffer).unwrap_err(),
            ObjectError::KindMismatch {
                handle,
                expected: ObjectKind::FrameBuffer,
                found: ObjectKind::Volume,
            }
        );
    }

    #[test]
    fn test_release_keeps_object_alive_for_clones() {
        let mut table = ObjectHandleTable::new();
        let handle = Handle::new(0, 1);
        table.assign(handle, object(ObjectKind::Renderer)).unwrap();

        let held = Arc::clone(table.lookup(handle).unwrap());
        drop(table.release(handle).unwrap());
        assert_eq!(held.kind(), ObjectKind::Renderer);
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn test_iter_and_clear() {
        let mut table = ObjectHandleTable::with_capacity(4);
        table.assign(Handle::new(0, 1), object(ObjectKind::Data)).unwrap();
        table.assign(Handle::new(2, 3), object(ObjectKind::Texture)).unwrap();

        let handles: Vec<_> = table.iter().map(|(handle, _)| handle).collect();
        assert_eq!(handles, vec![Handle::new(0, 1), Handle::new(2, 3)]);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn test_far_index_rejected_without_growth() {
        let mut table = ObjectHandleTable::new();
        let far = Handle::new(u32::MAX, 1);
        assert_eq!(
            table.assign(far, object(ObjectKind::World)).unwrap_err(),
            ObjectError::HandleOutOfRange {
                handle: far,
                max_gap: MAX_INDEX_GAP,
            }
        );
        assert!(table.is_empty());

        let edge = Handle::new(u32::try_from(MAX_INDEX_GAP - 1).unwrap(), 1);
        table.assign(edge, object(ObjectKind::World)).unwrap();
        assert!(table.is_defined(edge));
    }
}
