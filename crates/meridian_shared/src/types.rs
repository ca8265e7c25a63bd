//! Enumerations and fixed records that appear inside command payloads.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, CodecResult, Decode, Encode, ReadStream, WriteStream};
use crate::handle::Handle;
use crate::math::Vec3f;

/// Element type of a data array or volume region.
///
/// Codes are grouped in bands (objects, strings, integers, floats, compounds)
/// and are part of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DataType {
    /// Opaque pointer-sized value.
    VoidPtr = 200,
    /// Any managed object.
    Object = 1000,
    /// Camera object.
    Camera = 1001,
    /// Data array object.
    Data = 1002,
    /// Framebuffer object.
    FrameBuffer = 1003,
    /// Geometry object.
    Geometry = 1004,
    /// Geometry instance object.
    GeometryInstance = 1005,
    /// Light object.
    Light = 1006,
    /// Material object.
    Material = 1007,
    /// Pixel operation object.
    PixelOp = 1008,
    /// Renderer object.
    Renderer = 1009,
    /// Texture object.
    Texture = 1010,
    /// Transfer function object.
    TransferFunction = 1011,
    /// Volume object.
    Volume = 1012,
    /// Volume instance object.
    VolumeInstance = 1013,
    /// World object.
    World = 1014,
    /// String value (not supported in data arrays).
    String = 1500,
    /// Signed 8-bit integer.
    Char = 2000,
    /// Unsigned 8-bit integer.
    UChar = 2500,
    /// Two unsigned 8-bit integers.
    UChar2 = 2501,
    /// Three unsigned 8-bit integers.
    UChar3 = 2502,
    /// Four unsigned 8-bit integers.
    UChar4 = 2503,
    /// Signed 16-bit integer.
    Short = 3000,
    /// Unsigned 16-bit integer.
    UShort = 3500,
    /// Signed 32-bit integer.
    Int = 4000,
    /// Two signed 32-bit integers.
    Int2 = 4001,
    /// Three signed 32-bit integers.
    Int3 = 4002,
    /// Four signed 32-bit integers.
    Int4 = 4003,
    /// Unsigned 32-bit integer.
    UInt = 4500,
    /// Two unsigned 32-bit integers.
    UInt2 = 4501,
    /// Three unsigned 32-bit integers.
    UInt3 = 4502,
    /// Four unsigned 32-bit integers.
    UInt4 = 4503,
    /// Signed 64-bit integer.
    Long = 5000,
    /// Unsigned 64-bit integer.
    ULong = 5500,
    /// 32-bit float.
    Float = 6000,
    /// Two 32-bit floats.
    Float2 = 6001,
    /// Three 32-bit floats.
    Float3 = 6002,
    /// Four 32-bit floats.
    Float4 = 6003,
    /// 64-bit float.
    Double = 7000,
    /// 1D float box.
    Box1f = 8000,
    /// 2D float box.
    Box2f = 8001,
    /// 3D float box.
    Box3f = 8002,
    /// 4D float box.
    Box4f = 8003,
    /// 3x3 float matrix.
    Linear3f = 9000,
    /// 3x4 affine float matrix.
    Affine3f = 9001,
}

impl DataType {
    const ALL: [Self; 45] = [
        Self::VoidPtr,
        Self::Object,
        Self::Camera,
        Self::Data,
        Self::FrameBuffer,
        Self::Geometry,
        Self::GeometryInstance,
        Self::Light,
        Self::Material,
        Self::PixelOp,
        Self::Renderer,
        Self::Texture,
        Self::TransferFunction,
        Self::Volume,
        Self::VolumeInstance,
        Self::World,
        Self::String,
        Self::Char,
        Self::UChar,
        Self::UChar2,
        Self::UChar3,
        Self::UChar4,
        Self::Short,
        Self::UShort,
        Self::Int,
        Self::Int2,
        Self::Int3,
        Self::Int4,
        Self::UInt,
        Self::UInt2,
        Self::UInt3,
        Self::UInt4,
        Self::Long,
        Self::ULong,
        Self::Float,
        Self::Float2,
        Self::Float3,
        Self::Float4,
        Self::Double,
        Self::Box1f,
        Self::Box2f,
        Self::Box3f,
        Self::Box4f,
        Self::Linear3f,
        Self::Affine3f,
    ];

    /// Looks up a type by its wire code.
    pub fn from_code(code: u32) -> CodecResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ty| *ty as u32 == code)
            .ok_or(CodecError::UnknownDataType(code))
    }

    /// Returns true for element types whose wire values are object handles.
    #[must_use]
    pub const fn is_object(self) -> bool {
        (self as u32) >= 1000 && (self as u32) < 1500
    }

    /// Size of one element in bytes.
    ///
    /// Object elements travel as 64-bit handles. Strings have no fixed size
    /// and report zero.
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::String => 0,
            Self::Char | Self::UChar => 1,
            Self::UChar2 | Self::Short | Self::UShort => 2,
            Self::UChar3 => 3,
            Self::UChar4 | Self::Int | Self::UInt | Self::Float => 4,
            Self::Int2 | Self::UInt2 | Self::Float2 | Self::Long | Self::ULong | Self::Double => 8,
            Self::Box1f => 8,
            Self::Int3 | Self::UInt3 | Self::Float3 => 12,
            Self::Int4 | Self::UInt4 | Self::Float4 | Self::Box2f => 16,
            Self::Box3f => 24,
            Self::Box4f => 32,
            Self::Linear3f => 36,
            Self::Affine3f => 48,
            // Pointers and handles
            _ => 8,
        }
    }
}

impl Encode for DataType {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u32(*self as u32);
    }
}

impl Decode for DataType {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Self::from_code(stream.read_u32()?)
    }
}

/// Pixel format of a framebuffer's color channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum FrameBufferFormat {
    /// No color channel.
    None = 0,
    /// 8-bit linear RGBA.
    #[default]
    Rgba8 = 1,
    /// 8-bit sRGB RGBA.
    Srgba = 2,
    /// 32-bit float RGBA.
    Rgba32f = 3,
}

impl FrameBufferFormat {
    /// Maps a wire code back to a format. Unknown codes fall back to `None`.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Rgba8,
            2 => Self::Srgba,
            3 => Self::Rgba32f,
            _ => Self::None,
        }
    }
}

impl Encode for FrameBufferFormat {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u32(*self as u32);
    }
}

impl Decode for FrameBufferFormat {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_u32().map(Self::from_code)
    }
}

/// Channel mask of a framebuffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FrameBufferChannels(pub u32);

impl FrameBufferChannels {
    /// Color channel.
    pub const COLOR: Self = Self(1 << 0);
    /// Depth channel.
    pub const DEPTH: Self = Self(1 << 1);
    /// Accumulation buffer.
    pub const ACCUM: Self = Self(1 << 2);
    /// Per-tile variance estimate.
    pub const VARIANCE: Self = Self(1 << 3);
    /// Surface normals.
    pub const NORMAL: Self = Self(1 << 4);
    /// Surface albedo.
    pub const ALBEDO: Self = Self(1 << 5);

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FrameBufferChannels {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Encode for FrameBufferChannels {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u32(self.0);
    }
}

impl Decode for FrameBufferChannels {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_u32().map(Self)
    }
}

/// Result of a screen-space pick query.
///
/// Shipped as raw bytes from the designated worker to the master.
///
/// Size: 40 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PickResult {
    /// World-space hit position.
    pub world_position: Vec3f,
    /// Non-zero if something was hit.
    pub has_hit: u32,
    /// Instance that was hit.
    pub instance: Handle,
    /// Model (geometry or volume) that was hit.
    pub model: Handle,
    /// Primitive index within the model.
    pub prim_id: u32,
    /// Padding for alignment.
    pub _padding: u32,
}

impl PickResult {
    /// Size in bytes.
    pub const SIZE: usize = 40;

    /// A result reporting no hit.
    #[must_use]
    pub const fn miss() -> Self {
        Self {
            world_position: Vec3f::ZERO,
            has_hit: 0,
            instance: Handle::NULL,
            model: Handle::NULL,
            prim_id: 0,
            _padding: 0,
        }
    }

    /// A result reporting a hit.
    #[must_use]
    pub const fn hit(world_position: Vec3f, instance: Handle, model: Handle, prim_id: u32) -> Self {
        Self {
            world_position,
            has_hit: 1,
            instance,
            model,
            prim_id,
            _padding: 0,
        }
    }

    /// Returns true if something was hit.
    #[inline]
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        self.has_hit != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_codes_roundtrip() {
        for ty in DataType::ALL {
            assert_eq!(DataType::from_code(ty as u32).unwrap(), ty);
        }
        assert_eq!(DataType::from_code(42), Err(CodecError::UnknownDataType(42)));
    }

    #[test]
    fn test_object_types() {
        assert!(DataType::Renderer.is_object());
        assert!(DataType::Object.is_object());
        assert!(!DataType::String.is_object());
        assert!(!DataType::Float3.is_object());
        assert_eq!(DataType::Volume.size_in_bytes(), 8);
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(DataType::UChar.size_in_bytes(), 1);
        assert_eq!(DataType::Float3.size_in_bytes(), 12);
        assert_eq!(DataType::Affine3f.size_in_bytes(), 48);
    }

    #[test]
    fn test_pick_result_size() {
        assert_eq!(std::mem::size_of::<PickResult>(), PickResult::SIZE);
        assert!(!PickResult::miss().is_hit());
    }

    #[test]
    fn test_channels() {
        let channels = FrameBufferChannels::COLOR | FrameBufferChannels::ACCUM;
        assert!(channels.contains(FrameBufferChannels::ACCUM));
        assert!(!channels.contains(FrameBufferChannels::DEPTH));
    }
}
