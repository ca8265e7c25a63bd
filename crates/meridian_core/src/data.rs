//! # Data Arrays
//!
//! Typed arrays referenced by other objects through parameters. Arrays of an
//! object element type hold resolved local objects rather than handles.

use std::sync::Arc;

use meridian_shared::DataType;

use crate::error::{ObjectError, ObjectResult};
use crate::object::{ManagedObject, ObjectBase, ObjectKind};

/// The array shares the caller's buffer instead of copying it.
pub const DATA_SHARED_BUFFER: u32 = 1 << 0;

/// Storage of a [`Data`] array.
#[derive(Debug)]
pub enum DataItems {
    /// Raw little-endian elements.
    Bytes(Vec<u8>),
    /// Resolved objects; `None` where the sender had a null handle.
    Objects(Vec<Option<Arc<dyn ManagedObject>>>),
}

/// A typed array object.
#[derive(Debug)]
pub struct Data {
    base: ObjectBase,
    data_type: DataType,
    count: usize,
    flags: u32,
    items: DataItems,
}

/// Checks that `actual` bytes hold exactly `count` elements of `data_type`.
///
/// # Errors
///
/// Returns `UnknownType` for strings, which have no fixed size, and
/// `DataSizeMismatch` if the lengths disagree.
pub fn check_data_size(data_type: DataType, count: usize, actual: usize) -> ObjectResult<()> {
    let element = data_type.size_in_bytes();
    if element == 0 {
        return Err(ObjectError::UnknownType {
            kind: ObjectKind::Data,
            type_name: format!("{data_type:?}"),
        });
    }
    let expected = (element as u64).saturating_mul(count as u64);
    if expected != actual as u64 {
        return Err(ObjectError::DataSizeMismatch {
            expected,
            actual: actual as u64,
        });
    }
    Ok(())
}

impl Data {
    /// Creates an array of plain elements.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` does not hold exactly `count` elements.
    pub fn from_bytes(data_type: DataType, count: usize, flags: u32, bytes: Vec<u8>) -> ObjectResult<Self> {
        check_data_size(data_type, count, bytes.len())?;
        Ok(Self {
            base: ObjectBase::new(ObjectKind::Data, ""),
            data_type,
            count,
            flags,
            items: DataItems::Bytes(bytes),
        })
    }

    /// Creates an array of resolved objects.
    #[must_use]
    pub fn from_objects(data_type: DataType, flags: u32, objects: Vec<Option<Arc<dyn ManagedObject>>>) -> Self {
        Self {
            base: ObjectBase::new(ObjectKind::Data, ""),
            data_type,
            count: objects.len(),
            flags,
            items: DataItems::Objects(objects),
        }
    }

    /// Element type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the array has no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Creation flags.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Returns true if the array was created over a shared buffer.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.flags & DATA_SHARED_BUFFER != 0
    }

    /// Raw elements, for plain arrays.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.items {
            DataItems::Bytes(bytes) => Some(bytes),
            DataItems::Objects(_) => None,
        }
    }

    /// Resolved elements, for object arrays.
    #[must_use]
    pub fn objects(&self) -> Option<&[Option<Arc<dyn ManagedObject>>]> {
        match &self.items {
            DataItems::Objects(objects) => Some(objects),
            DataItems::Bytes(_) => None,
        }
    }
}

impl ManagedObject for Data {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn as_data(&self) -> Option<&Data> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let data = Data::from_bytes(DataType::Float3, 2, 0, vec![0; 24]).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.bytes().unwrap().len(), 24);
        assert!(data.objects().is_none());
        assert!(!data.is_shared());
        assert_eq!(data.kind(), ObjectKind::Data);
    }

    #[test]
    fn test_size_mismatch() {
        assert_eq!(
            Data::from_bytes(DataType::Int, 3, 0, vec![0; 8]).unwrap_err(),
            ObjectError::DataSizeMismatch { expected: 12, actual: 8 }
        );
        assert!(check_data_size(DataType::String, 1, 0).is_err());
        assert!(check_data_size(DataType::UChar, 0, 0).is_ok());
    }

    #[test]
    fn test_object_array_keeps_nulls() {
        let member: Arc<dyn ManagedObject> =
            Arc::new(Data::from_bytes(DataType::UChar, 1, 0, vec![7]).unwrap());
        let data = Data::from_objects(DataType::Data, DATA_SHARED_BUFFER, vec![Some(member), None]);

        let objects = data.objects().unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects[0].is_some());
        assert!(objects[1].is_none());
        assert!(data.is_shared());
    }
}
