//! # Wire Codec
//!
//! Binary serialization for work items.
//!
//! ## Encoding
//!
//! - Little-endian, no self-describing schema
//! - Scalars, vectors and handles are fixed width
//! - Strings and byte buffers are prefixed with a `u64` length
//! - `bool` is a single byte (`0` or `1`)
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ Tag (4)      │ Payload (field by field, in declared order)  │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```

use bytemuck::{bytes_of, Pod};
use thiserror::Error;

use crate::handle::Handle;
use crate::math::{
    Affine3f, Box1f, Box2f, Box3f, Box4f, Linear3f, Vec2f, Vec2i, Vec3f, Vec3i, Vec4f, Vec4i,
};

/// Errors raised while decoding a byte stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The stream ended before the field was complete.
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the field needed.
        needed: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A bool field held something other than 0 or 1.
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    /// A data type code did not name a known type.
    #[error("unknown data type code: {0}")]
    UnknownDataType(u32),

    /// A length prefix does not fit in memory on this platform.
    #[error("length prefix {0} does not fit in usize")]
    LengthOverflow(u64),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Types that can be written to a [`WriteStream`].
pub trait Encode {
    /// Appends the wire form of `self`.
    fn encode(&self, stream: &mut WriteStream);
}

/// Types that can be read back from a [`ReadStream`].
pub trait Decode: Sized {
    /// Reads one value, advancing the stream.
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self>;
}

/// Growable output buffer.
///
/// Reused across commands on the master: [`WriteStream::take`] hands the
/// bytes to the transport and leaves an empty buffer with its capacity intact.
#[derive(Debug, Default, Clone)]
pub struct WriteStream {
    buffer: Vec<u8>,
}

impl WriteStream {
    /// Creates an empty stream.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an empty stream with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Resets the stream for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Takes the written bytes, leaving the stream empty.
    pub fn take(&mut self) -> Vec<u8> {
        let capacity = self.buffer.capacity();
        std::mem::replace(&mut self.buffer, Vec::with_capacity(capacity))
    }

    /// Consumes the stream, returning the written bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }

    /// Writes a length-prefixed byte buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Writes any encodable value, returning `self` for chaining.
    #[inline]
    pub fn put<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }
}

/// Cursor over a received buffer.
#[derive(Debug, Clone)]
pub struct ReadStream<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ReadStream<'a> {
    /// Creates a new stream over a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns true once every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current read offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Borrows the next `len` bytes.
    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Reads `N` bytes into an array.
    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> CodecResult<T> {
        let slice = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    /// Reads a `u64` length prefix.
    fn read_len(&mut self) -> CodecResult<usize> {
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))
    }

    /// Reads a length-prefixed byte buffer without copying.
    pub fn read_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> CodecResult<String> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads any decodable value.
    #[inline]
    pub fn get<T: Decode>(&mut self) -> CodecResult<T> {
        T::decode(self)
    }
}

// ============================================================================
// PRIMITIVE IMPLEMENTATIONS
// ============================================================================

impl Encode for u8 {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u8(*self);
    }
}

impl Decode for u8 {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_u8()
    }
}

impl Encode for bool {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u8(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        match stream.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

impl Encode for u32 {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u32(*self);
    }
}

impl Decode for u32 {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_u32()
    }
}

impl Encode for i32 {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_i32(*self);
    }
}

impl Decode for i32 {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_i32()
    }
}

impl Encode for u64 {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_u64()
    }
}

impl Encode for f32 {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_f32(*self);
    }
}

impl Decode for f32 {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_f32()
    }
}

impl Encode for str {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_str(self);
    }
}

impl Encode for String {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_str(self);
    }
}

impl Decode for String {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_string()
    }
}

impl Encode for Vec<u8> {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_bytes(self);
    }
}

impl Decode for Vec<u8> {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_bytes().map(<[u8]>::to_vec)
    }
}

impl Encode for Handle {
    fn encode(&self, stream: &mut WriteStream) {
        stream.write_u64(self.raw());
    }
}

impl Decode for Handle {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.read_u64().map(Handle::from_raw)
    }
}

/// Implements `Encode`/`Decode` for fixed-size Pod value types.
macro_rules! pod_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, stream: &mut WriteStream) {
                    stream.write_pod(self);
                }
            }

            impl Decode for $ty {
                fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
                    stream.read_pod()
                }
            }
        )*
    };
}

pod_codec!(Vec2f, Vec2i, Vec3f, Vec3i, Vec4f, Vec4i, Box1f, Box2f, Box3f, Box4f, Linear3f, Affine3f);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut out = WriteStream::new();
        out.put(&7u8).put(&true).put(&-42i32).put(&u64::MAX).put(&1.5f32);

        let mut input = ReadStream::new(out.as_slice());
        assert_eq!(input.get::<u8>().unwrap(), 7);
        assert!(input.get::<bool>().unwrap());
        assert_eq!(input.get::<i32>().unwrap(), -42);
        assert_eq!(input.get::<u64>().unwrap(), u64::MAX);
        assert_eq!(input.get::<f32>().unwrap(), 1.5);
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut out = WriteStream::new();
        out.write_u32(0x0403_0201);
        assert_eq!(out.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_handle_is_eight_bytes() {
        let mut out = WriteStream::new();
        out.put(&Handle::new(5, 9));
        assert_eq!(out.len(), 8);

        let mut input = ReadStream::new(out.as_slice());
        assert_eq!(input.get::<Handle>().unwrap(), Handle::new(5, 9));
    }

    #[test]
    fn test_empty_and_long_buffers() {
        let long = "x".repeat(1 << 16);
        let mut out = WriteStream::new();
        out.put(&Vec::<u8>::new()).put(&String::new()).put(&long);

        let mut input = ReadStream::new(out.as_slice());
        assert!(input.get::<Vec<u8>>().unwrap().is_empty());
        assert!(input.get::<String>().unwrap().is_empty());
        assert_eq!(input.get::<String>().unwrap(), long);
    }

    #[test]
    fn test_truncated_stream() {
        let mut out = WriteStream::new();
        out.write_str("hello");
        let bytes = out.as_slice();

        let mut input = ReadStream::new(&bytes[..bytes.len() - 1]);
        assert_eq!(
            input.read_string(),
            Err(CodecError::UnexpectedEof { needed: 5, remaining: 4 })
        );
    }

    #[test]
    fn test_invalid_bool() {
        let mut input = ReadStream::new(&[2]);
        assert_eq!(input.get::<bool>(), Err(CodecError::InvalidBool(2)));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut out = WriteStream::new();
        out.write_bytes(&[0xff, 0xfe]);
        let mut input = ReadStream::new(out.as_slice());
        assert_eq!(input.read_string(), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_pod_values() {
        let affine = Affine3f::translate(Vec3f::new(1.0, 2.0, 3.0));
        let bounds = Box3f::new(Vec3f::ZERO, Vec3f::new(4.0, 5.0, 6.0));

        let mut out = WriteStream::new();
        out.put(&affine).put(&bounds).put(&Vec2i::new(-1, 640));

        let mut input = ReadStream::new(out.as_slice());
        assert_eq!(input.get::<Affine3f>().unwrap(), affine);
        assert_eq!(input.get::<Box3f>().unwrap(), bounds);
        assert_eq!(input.get::<Vec2i>().unwrap(), Vec2i::new(-1, 640));
    }

    #[test]
    fn test_random_frames_roundtrip() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..64 {
            let handle = Handle::from_raw(rng.gen());
            let value: i32 = rng.gen();
            let len = rng.gen_range(0..512);
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();

            let mut out = WriteStream::new();
            out.put(&handle).put(&value).put(&payload);

            let mut input = ReadStream::new(out.as_slice());
            assert_eq!(input.get::<Handle>().unwrap(), handle);
            assert_eq!(input.get::<i32>().unwrap(), value);
            assert_eq!(input.get::<Vec<u8>>().unwrap(), payload);
            assert!(input.is_exhausted());
        }
    }

    #[test]
    fn test_take_keeps_capacity() {
        let mut out = WriteStream::with_capacity(64);
        out.write_u64(1);
        let bytes = out.take();
        assert_eq!(bytes.len(), 8);
        assert!(out.is_empty());
        assert!(out.as_slice().is_empty());
    }
}
