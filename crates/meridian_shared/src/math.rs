//! Value types carried by parameter and region commands.
//!
//! These are the canonical wire representations. All of them are `Pod`, so the
//! codec copies them byte-for-byte.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 2D float vector - screen positions, image extents
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec2f {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vec2f {
    /// Creates a new Vec2f
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0);
}

/// 2D integer vector - framebuffer dimensions
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec2i {
    /// X component
    pub x: i32,
    /// Y component
    pub y: i32,
}

impl Vec2i {
    /// Creates a new Vec2i
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Number of cells covered (`x * y`), zero if either side is not positive.
    #[must_use]
    pub fn area(self) -> u64 {
        if self.x <= 0 || self.y <= 0 {
            return 0;
        }
        u64::from(self.x.unsigned_abs()) * u64::from(self.y.unsigned_abs())
    }
}

/// 3D float vector - positions, directions
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3f {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3f {
    /// Creates a new Vec3f
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

impl std::ops::Add for Vec3f {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3f {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3f {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// 3D integer vector - volume region origins and extents
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3i {
    /// X component
    pub x: i32,
    /// Y component
    pub y: i32,
    /// Z component
    pub z: i32,
}

impl Vec3i {
    /// Creates a new Vec3i
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Number of voxels covered, zero if any side is not positive.
    ///
    /// `None` if the count does not fit in a `u64`.
    #[must_use]
    pub fn volume(self) -> Option<u64> {
        if self.x <= 0 || self.y <= 0 || self.z <= 0 {
            return Some(0);
        }
        u64::from(self.x.unsigned_abs())
            .checked_mul(u64::from(self.y.unsigned_abs()))?
            .checked_mul(u64::from(self.z.unsigned_abs()))
    }
}

/// 4D float vector - colors with alpha
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec4f {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Vec4f {
    /// Creates a new Vec4f
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

/// 4D integer vector
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec4i {
    /// X component
    pub x: i32,
    /// Y component
    pub y: i32,
    /// Z component
    pub z: i32,
    /// W component
    pub w: i32,
}

impl Vec4i {
    /// Creates a new Vec4i
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32, w: i32) -> Self {
        Self { x, y, z, w }
    }
}

/// 1D interval
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Box1f {
    /// Lower bound
    pub lower: f32,
    /// Upper bound
    pub upper: f32,
}

impl Box1f {
    /// Creates a new interval
    #[must_use]
    pub const fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }
}

/// 2D box - image regions
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Box2f {
    /// Lower corner
    pub lower: Vec2f,
    /// Upper corner
    pub upper: Vec2f,
}

impl Box2f {
    /// Creates a new box
    #[must_use]
    pub const fn new(lower: Vec2f, upper: Vec2f) -> Self {
        Self { lower, upper }
    }
}

/// 3D box - bounds, clipping regions
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Box3f {
    /// Lower corner
    pub lower: Vec3f,
    /// Upper corner
    pub upper: Vec3f,
}

impl Box3f {
    /// Creates a new box
    #[must_use]
    pub const fn new(lower: Vec3f, upper: Vec3f) -> Self {
        Self { lower, upper }
    }
}

/// 4D box
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Box4f {
    /// Lower corner
    pub lower: Vec4f,
    /// Upper corner
    pub upper: Vec4f,
}

impl Box4f {
    /// Creates a new box
    #[must_use]
    pub const fn new(lower: Vec4f, upper: Vec4f) -> Self {
        Self { lower, upper }
    }
}

/// 3x3 linear transform, stored as three column vectors
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Linear3f {
    /// First column
    pub vx: Vec3f,
    /// Second column
    pub vy: Vec3f,
    /// Third column
    pub vz: Vec3f,
}

impl Linear3f {
    /// Creates a new linear transform from its columns
    #[must_use]
    pub const fn new(vx: Vec3f, vy: Vec3f, vz: Vec3f) -> Self {
        Self { vx, vy, vz }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec3f::X, Vec3f::Y, Vec3f::Z);
}

impl Default for Linear3f {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Affine transform - linear part plus translation
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Affine3f {
    /// Linear part
    pub l: Linear3f,
    /// Translation
    pub p: Vec3f,
}

impl Affine3f {
    /// Creates a new affine transform
    #[must_use]
    pub const fn new(l: Linear3f, p: Vec3f) -> Self {
        Self { l, p }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Linear3f::IDENTITY, Vec3f::ZERO);

    /// Pure translation
    #[must_use]
    pub const fn translate(p: Vec3f) -> Self {
        Self::new(Linear3f::IDENTITY, p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3f_operations() {
        let a = Vec3f::new(1.0, 2.0, 3.0);
        let b = Vec3f::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3f::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0);
    }

    #[test]
    fn test_region_volume() {
        assert_eq!(Vec3i::new(2, 3, 4).volume(), Some(24));
        assert_eq!(Vec3i::new(2, 0, 4).volume(), Some(0));
        assert_eq!(Vec3i::new(-1, 3, 4).volume(), Some(0));
        // Must not overflow i32 arithmetic
        assert_eq!(Vec3i::new(i32::MAX, 2, 1).volume(), Some(2 * i32::MAX as u64));
        assert_eq!(Vec3i::new(i32::MAX, i32::MAX, 2).volume(), Some(2 * (i32::MAX as u64).pow(2)));
        assert_eq!(Vec3i::new(1 << 21, 1 << 21, 1 << 22).volume(), None);
    }

    #[test]
    fn test_wire_sizes() {
        assert_eq!(std::mem::size_of::<Vec3f>(), 12);
        assert_eq!(std::mem::size_of::<Box4f>(), 32);
        assert_eq!(std::mem::size_of::<Linear3f>(), 36);
        assert_eq!(std::mem::size_of::<Affine3f>(), 48);
    }

    #[test]
    fn test_affine_default_is_identity() {
        assert_eq!(Affine3f::default(), Affine3f::IDENTITY);
    }
}
