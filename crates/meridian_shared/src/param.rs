//! # Parameter Values
//!
//! Parameters are strongly but narrowly typed: every supported kind has its
//! own wire tag, so the payload carries no kind byte of its own. The only kind
//! that needs work on arrival is [`ObjectRef`], whose handle is resolved to
//! the receiving rank's local object before it reaches the target.

use serde::{Deserialize, Serialize};

use crate::codec::{CodecResult, Decode, Encode, ReadStream, WriteStream};
use crate::handle::Handle;
use crate::math::{
    Affine3f, Box1f, Box2f, Box3f, Box4f, Linear3f, Vec2f, Vec2i, Vec3f, Vec3i, Vec4f, Vec4i,
};

/// A handle used as a parameter value (a reference to another object).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ObjectRef(pub Handle);

impl Encode for ObjectRef {
    fn encode(&self, stream: &mut WriteStream) {
        self.0.encode(stream);
    }
}

impl Decode for ObjectRef {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Handle::decode(stream).map(Self)
    }
}

/// The closed set of parameter kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParamKind {
    /// Reference to another object.
    Object = 0,
    /// UTF-8 string.
    String = 1,
    /// 32-bit signed integer.
    Int = 2,
    /// Boolean.
    Bool = 3,
    /// 32-bit float.
    Float = 4,
    /// 2D float vector.
    Vec2f = 5,
    /// 2D integer vector.
    Vec2i = 6,
    /// 3D float vector.
    Vec3f = 7,
    /// 3D integer vector.
    Vec3i = 8,
    /// 4D float vector.
    Vec4f = 9,
    /// 4D integer vector.
    Vec4i = 10,
    /// 1D float box.
    Box1f = 11,
    /// 2D float box.
    Box2f = 12,
    /// 3D float box.
    Box3f = 13,
    /// 4D float box.
    Box4f = 14,
    /// 3x3 linear transform.
    Linear3f = 15,
    /// Affine transform.
    Affine3f = 16,
}

impl ParamKind {
    /// Every kind, in wire order.
    pub const ALL: [Self; 17] = [
        Self::Object,
        Self::String,
        Self::Int,
        Self::Bool,
        Self::Float,
        Self::Vec2f,
        Self::Vec2i,
        Self::Vec3f,
        Self::Vec3i,
        Self::Vec4f,
        Self::Vec4i,
        Self::Box1f,
        Self::Box2f,
        Self::Box3f,
        Self::Box4f,
        Self::Linear3f,
        Self::Affine3f,
    ];

    /// Human readable name, used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Vec2f => "vec2f",
            Self::Vec2i => "vec2i",
            Self::Vec3f => "vec3f",
            Self::Vec3i => "vec3i",
            Self::Vec4f => "vec4f",
            Self::Vec4i => "vec4i",
            Self::Box1f => "box1f",
            Self::Box2f => "box2f",
            Self::Box3f => "box3f",
            Self::Box4f => "box4f",
            Self::Linear3f => "linear3f",
            Self::Affine3f => "affine3f",
        }
    }
}

/// A parameter value as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Reference to another object, by handle.
    Object(Handle),
    /// UTF-8 string.
    String(String),
    /// 32-bit signed integer.
    Int(i32),
    /// Boolean.
    Bool(bool),
    /// 32-bit float.
    Float(f32),
    /// 2D float vector.
    Vec2f(Vec2f),
    /// 2D integer vector.
    Vec2i(Vec2i),
    /// 3D float vector.
    Vec3f(Vec3f),
    /// 3D integer vector.
    Vec3i(Vec3i),
    /// 4D float vector.
    Vec4f(Vec4f),
    /// 4D integer vector.
    Vec4i(Vec4i),
    /// 1D float box.
    Box1f(Box1f),
    /// 2D float box.
    Box2f(Box2f),
    /// 3D float box.
    Box3f(Box3f),
    /// 4D float box.
    Box4f(Box4f),
    /// 3x3 linear transform.
    Linear3f(Linear3f),
    /// Affine transform.
    Affine3f(Affine3f),
}

impl ParamValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        match self {
            Self::Object(_) => ParamKind::Object,
            Self::String(_) => ParamKind::String,
            Self::Int(_) => ParamKind::Int,
            Self::Bool(_) => ParamKind::Bool,
            Self::Float(_) => ParamKind::Float,
            Self::Vec2f(_) => ParamKind::Vec2f,
            Self::Vec2i(_) => ParamKind::Vec2i,
            Self::Vec3f(_) => ParamKind::Vec3f,
            Self::Vec3i(_) => ParamKind::Vec3i,
            Self::Vec4f(_) => ParamKind::Vec4f,
            Self::Vec4i(_) => ParamKind::Vec4i,
            Self::Box1f(_) => ParamKind::Box1f,
            Self::Box2f(_) => ParamKind::Box2f,
            Self::Box3f(_) => ParamKind::Box3f,
            Self::Box4f(_) => ParamKind::Box4f,
            Self::Linear3f(_) => ParamKind::Linear3f,
            Self::Affine3f(_) => ParamKind::Affine3f,
        }
    }

    /// Writes the value without any kind marker.
    pub fn encode_payload(&self, stream: &mut WriteStream) {
        match self {
            Self::Object(v) => v.encode(stream),
            Self::String(v) => v.encode(stream),
            Self::Int(v) => v.encode(stream),
            Self::Bool(v) => v.encode(stream),
            Self::Float(v) => v.encode(stream),
            Self::Vec2f(v) => v.encode(stream),
            Self::Vec2i(v) => v.encode(stream),
            Self::Vec3f(v) => v.encode(stream),
            Self::Vec3i(v) => v.encode(stream),
            Self::Vec4f(v) => v.encode(stream),
            Self::Vec4i(v) => v.encode(stream),
            Self::Box1f(v) => v.encode(stream),
            Self::Box2f(v) => v.encode(stream),
            Self::Box3f(v) => v.encode(stream),
            Self::Box4f(v) => v.encode(stream),
            Self::Linear3f(v) => v.encode(stream),
            Self::Affine3f(v) => v.encode(stream),
        }
    }
}

/// A Rust type that maps onto exactly one [`ParamKind`].
///
/// Decoding through a `ParamType` is how the receiver knows which kind a
/// payload holds: the kind is implied by the wire tag it was registered under.
pub trait ParamType: Encode + Decode + Into<ParamValue> {
    /// The kind this type travels as.
    const KIND: ParamKind;
}

/// Implements `ParamType` and the conversion into `ParamValue`.
macro_rules! param_types {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }

            impl ParamType for $ty {
                const KIND: ParamKind = ParamKind::$variant;
            }
        )*
    };
}

param_types! {
    String => String,
    i32 => Int,
    bool => Bool,
    f32 => Float,
    Vec2f => Vec2f,
    Vec2i => Vec2i,
    Vec3f => Vec3f,
    Vec3i => Vec3i,
    Vec4f => Vec4f,
    Vec4i => Vec4i,
    Box1f => Box1f,
    Box2f => Box2f,
    Box3f => Box3f,
    Box4f => Box4f,
    Linear3f => Linear3f,
    Affine3f => Affine3f,
}

impl From<ObjectRef> for ParamValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value.0)
    }
}

impl ParamType for ObjectRef {
    const KIND: ParamKind = ParamKind::Object;
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: ParamType + Clone>(value: T) -> ParamValue {
        let expected: ParamValue = value.clone().into();
        let mut out = WriteStream::new();
        expected.encode_payload(&mut out);

        let mut input = ReadStream::new(out.as_slice());
        let decoded: ParamValue = T::decode(&mut input).unwrap().into();
        assert!(input.is_exhausted());
        assert_eq!(decoded.kind(), T::KIND);
        decoded
    }

    #[test]
    fn test_payload_matches_typed_decode() {
        assert_eq!(roundtrip(7i32), ParamValue::Int(7));
        assert_eq!(roundtrip(true), ParamValue::Bool(true));
        assert_eq!(roundtrip(String::from("spp")), ParamValue::String("spp".into()));
        assert_eq!(
            roundtrip(ObjectRef(Handle::new(4, 1))),
            ParamValue::Object(Handle::new(4, 1))
        );
        assert_eq!(
            roundtrip(Affine3f::IDENTITY),
            ParamValue::Affine3f(Affine3f::IDENTITY)
        );
    }

    #[test]
    fn test_null_object_ref() {
        assert_eq!(roundtrip(ObjectRef(Handle::NULL)), ParamValue::Object(Handle::NULL));
    }

    #[test]
    fn test_kind_names_unique() {
        let mut names: Vec<_> = ParamKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ParamKind::ALL.len());
    }
}
