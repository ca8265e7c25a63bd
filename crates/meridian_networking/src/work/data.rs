//! Bulk data commands: typed arrays and volume region updates.

use meridian_core::{check_data_size, Data, ObjectKind};
use meridian_shared::{
    CodecError, CodecResult, DataType, Decode, Encode, Handle, ReadStream, Vec3i, WriteStream, MASTER_RANK,
    MAX_REGION_BYTES,
};

use super::{tags, WorkItem, WorkTag};
use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};

/// Creates a typed data array.
///
/// Arrays of an object element type carry one handle per element; every
/// rank resolves them to its own instances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewData {
    /// Handle the array is bound to.
    pub handle: Handle,
    /// Element type.
    pub data_type: DataType,
    /// Number of elements.
    pub count: usize,
    /// Creation flags, passed through verbatim.
    pub flags: u32,
    /// Little-endian element bytes.
    pub bytes: Vec<u8>,
}

impl NewData {
    /// Creates the command from raw element bytes.
    ///
    /// # Errors
    ///
    /// `Object` with `DataSizeMismatch` if `bytes` does not hold exactly
    /// `count` elements.
    pub fn new(handle: Handle, data_type: DataType, count: usize, flags: u32, bytes: Vec<u8>) -> ClusterResult<Self> {
        check_data_size(data_type, count, bytes.len()).map_err(|source| ClusterError::Object {
            rank: MASTER_RANK,
            source,
        })?;
        Ok(Self {
            handle,
            data_type,
            count,
            flags,
            bytes,
        })
    }

    /// Creates an object array from handles.
    ///
    /// # Errors
    ///
    /// As [`NewData::new`].
    pub fn from_handles(handle: Handle, data_type: DataType, flags: u32, handles: &[Handle]) -> ClusterResult<Self> {
        let mut stream = WriteStream::with_capacity(handles.len() * 8);
        for element in handles {
            element.encode(&mut stream);
        }
        Self::new(handle, data_type, handles.len(), flags, stream.into_inner())
    }
}

impl Encode for NewData {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.handle)
            .put(&self.data_type)
            .put(&(self.count as u64))
            .put(&self.flags)
            .put(&self.bytes);
    }
}

impl Decode for NewData {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        let handle = stream.get()?;
        let data_type = stream.get()?;
        let count = stream.read_u64()?;
        Ok(Self {
            handle,
            data_type,
            count: usize::try_from(count).map_err(|_| CodecError::LengthOverflow(count))?,
            flags: stream.get()?,
            bytes: stream.get()?,
        })
    }
}

impl WorkItem for NewData {
    fn tag(&self) -> WorkTag {
        tags::NEW_DATA
    }

    fn name(&self) -> &'static str {
        "NewData"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let data = if self.data_type.is_object() {
            check_data_size(self.data_type, self.count, self.bytes.len()).map_err(|e| ctx.object_error(e))?;
            let mut elements = ReadStream::new(&self.bytes);
            let mut objects = Vec::with_capacity(self.count);
            for _ in 0..self.count {
                let element: Handle = elements.get()?;
                objects.push(ctx.lookup_optional(element)?.cloned());
            }
            Data::from_objects(self.data_type, self.flags, objects)
        } else {
            let bytes = std::mem::take(&mut self.bytes);
            Data::from_bytes(self.data_type, self.count, self.flags, bytes).map_err(|e| ctx.object_error(e))?
        };
        ctx.assign(self.handle, std::sync::Arc::new(data))
    }
}

/// Checks that a region of `size` elements of `data_type` fits in one
/// command, returning its byte size.
///
/// # Errors
///
/// `OversizedPayload` above [`MAX_REGION_BYTES`], including sizes whose
/// byte count overflows.
pub fn check_region_size(size: Vec3i, data_type: DataType) -> ClusterResult<u64> {
    let bytes = size
        .volume()
        .and_then(|voxels| voxels.checked_mul(data_type.size_in_bytes() as u64))
        .unwrap_or(u64::MAX);
    if bytes > MAX_REGION_BYTES {
        return Err(ClusterError::OversizedPayload {
            bytes,
            limit: MAX_REGION_BYTES,
        });
    }
    Ok(bytes)
}

/// Replaces a box of voxels in a volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetRegion {
    /// Target volume.
    pub handle: Handle,
    /// First voxel of the region.
    pub origin: Vec3i,
    /// Extent of the region in voxels.
    pub size: Vec3i,
    /// Voxel type.
    pub data_type: DataType,
    /// Voxel bytes.
    pub bytes: Vec<u8>,
}

impl SetRegion {
    /// Creates the command. Size limits are enforced here, before anything
    /// is sent.
    ///
    /// # Errors
    ///
    /// `OversizedPayload` if the region exceeds [`MAX_REGION_BYTES`],
    /// `Object` with `DataSizeMismatch` if `bytes` does not cover it.
    pub fn new(handle: Handle, bytes: Vec<u8>, origin: Vec3i, size: Vec3i, data_type: DataType) -> ClusterResult<Self> {
        check_region_size(size, data_type)?;
        let voxels = size
            .volume()
            .and_then(|voxels| usize::try_from(voxels).ok())
            .unwrap_or(usize::MAX);
        check_data_size(data_type, voxels, bytes.len()).map_err(|source| ClusterError::Object {
            rank: MASTER_RANK,
            source,
        })?;
        Ok(Self {
            handle,
            origin,
            size,
            data_type,
            bytes,
        })
    }
}

impl Encode for SetRegion {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.handle)
            .put(&self.origin)
            .put(&self.size)
            .put(&self.data_type)
            .put(&self.bytes);
    }
}

impl Decode for SetRegion {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self {
            handle: stream.get()?,
            origin: stream.get()?,
            size: stream.get()?,
            data_type: stream.get()?,
            bytes: stream.get()?,
        })
    }
}

impl WorkItem for SetRegion {
    fn tag(&self) -> WorkTag {
        tags::SET_REGION
    }

    fn name(&self) -> &'static str {
        "SetRegion"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let target = ctx.lookup_kind(self.handle, ObjectKind::Volume)?;
        let accepted = target
            .as_volume()
            .is_some_and(|volume| volume.set_region(&self.bytes, self.origin, self.size));
        if !accepted {
            return Err(ClusterError::SetRegionFailed { handle: self.handle });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_size_limit() {
        assert_eq!(
            check_region_size(Vec3i::new(1_999_999_999, 1, 1), DataType::UChar).unwrap(),
            1_999_999_999
        );
        assert!(check_region_size(Vec3i::new(2_000_000_000, 1, 1), DataType::UChar).is_ok());
        assert!(matches!(
            check_region_size(Vec3i::new(2_000_000_001, 1, 1), DataType::UChar),
            Err(ClusterError::OversizedPayload {
                bytes: 2_000_000_001,
                limit: MAX_REGION_BYTES,
            })
        ));
        assert!(matches!(
            check_region_size(Vec3i::new(1000, 1000, 1000), DataType::Float),
            Err(ClusterError::OversizedPayload { .. })
        ));
    }

    #[test]
    fn test_region_size_overflow_is_oversized() {
        for size in [
            Vec3i::new(i32::MAX, i32::MAX, i32::MAX),
            Vec3i::new(1 << 21, 1 << 21, 1 << 22),
        ] {
            assert!(matches!(
                check_region_size(size, DataType::UChar),
                Err(ClusterError::OversizedPayload { bytes: u64::MAX, .. })
            ));
            assert!(matches!(
                SetRegion::new(Handle::new(1, 1), Vec::new(), Vec3i::default(), size, DataType::UChar),
                Err(ClusterError::OversizedPayload { .. })
            ));
        }
    }

    #[test]
    fn test_oversized_region_fails_before_data_check() {
        let err = SetRegion::new(
            Handle::new(1, 1),
            Vec::new(),
            Vec3i::default(),
            Vec3i::new(i32::MAX, i32::MAX, 2),
            DataType::Double,
        )
        .unwrap_err();
        assert!(matches!(err, ClusterError::OversizedPayload { .. }));
    }

    #[test]
    fn test_region_data_must_cover_region() {
        let err = SetRegion::new(
            Handle::new(1, 1),
            vec![0; 7],
            Vec3i::default(),
            Vec3i::new(2, 2, 2),
            DataType::UChar,
        )
        .unwrap_err();
        assert!(matches!(err, ClusterError::Object { rank: 0, .. }));
    }

    #[test]
    fn test_new_data_size_check() {
        assert!(NewData::new(Handle::new(1, 1), DataType::Int, 3, 0, vec![0; 12]).is_ok());
        assert!(matches!(
            NewData::new(Handle::new(1, 1), DataType::Int, 3, 0, vec![0; 11]),
            Err(ClusterError::Object { .. })
        ));
        let handles = NewData::from_handles(Handle::new(2, 1), DataType::Light, 0, &[Handle::new(3, 1)]).unwrap();
        assert_eq!(handles.bytes.len(), 8);
        assert_eq!(handles.count, 1);
    }
}
