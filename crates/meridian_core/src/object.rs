//! # Managed Objects
//!
//! Every handle resolves, per rank, to a [`ManagedObject`]. Their internals
//! (renderers, volumes, framebuffers, ...) are collaborators: this module only
//! fixes the operations commands call on them.
//!
//! ## Sharing
//!
//! Objects live in an `Arc` so an async render task can keep its
//! dependencies alive past a release. All mutation therefore goes through
//! `&self`: parameters sit behind a `parking_lot::RwLock`, counters are atomic.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use meridian_shared::{
    FrameBufferChannels, FrameBufferFormat, ParamKind, ParamValue, PickResult, Vec2f, Vec2i, Vec3i,
};

use crate::data::Data;
use crate::future::RenderFuture;

// ============================================================================
// KINDS
// ============================================================================

/// The closed set of object kinds a handle can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Renderer.
    Renderer,
    /// Scene root.
    World,
    /// Geometry.
    Geometry,
    /// Placed geometry.
    GeometryInstance,
    /// Camera.
    Camera,
    /// Volume.
    Volume,
    /// Placed volume.
    VolumeInstance,
    /// Transfer function.
    TransferFunction,
    /// Framebuffer post-processing stage.
    PixelOp,
    /// Material.
    Material,
    /// Light.
    Light,
    /// Typed data array.
    Data,
    /// Texture.
    Texture,
    /// Framebuffer.
    FrameBuffer,
    /// Pending render result.
    Future,
}

/// Operations the master may mirror from the replicated command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MasterOp {
    /// Building the local instance.
    Create,
    /// `commit()`
    Commit,
    /// `set_param()`
    SetParam,
    /// `remove_param()`
    RemoveParam,
}

impl ObjectKind {
    /// Human readable name, used in errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Renderer => "renderer",
            Self::World => "world",
            Self::Geometry => "geometry",
            Self::GeometryInstance => "geometry instance",
            Self::Camera => "camera",
            Self::Volume => "volume",
            Self::VolumeInstance => "volume instance",
            Self::TransferFunction => "transfer function",
            Self::PixelOp => "pixel op",
            Self::Material => "material",
            Self::Light => "light",
            Self::Data => "data",
            Self::Texture => "texture",
            Self::FrameBuffer => "framebuffer",
            Self::Future => "future",
        }
    }

    /// Whether the master's partial mirror applies `op` to objects of this kind.
    ///
    /// The master only builds and updates renderers and volumes for its own
    /// bookkeeping, and only renderers are ever committed there.
    #[must_use]
    pub const fn mirrors_on_master(self, op: MasterOp) -> bool {
        match op {
            MasterOp::Commit => matches!(self, Self::Renderer),
            MasterOp::Create | MasterOp::SetParam | MasterOp::RemoveParam => {
                matches!(self, Self::Renderer | Self::Volume)
            }
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// A parameter as stored on an object.
///
/// Identical to the wire value except that object references have already
/// been resolved to this rank's local instance. A null reference resolves to
/// `Object(None)`.
#[derive(Clone, Debug)]
pub enum Param {
    /// Plain value.
    Value(ParamValue),
    /// Resolved object reference.
    Object(Option<Arc<dyn ManagedObject>>),
}

impl Param {
    /// Kind of the value this parameter was set from.
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Value(value) => value.kind(),
            Self::Object(_) => ParamKind::Object,
        }
    }

    /// Returns the plain value, if this is not an object reference.
    #[must_use]
    pub const fn as_value(&self) -> Option<&ParamValue> {
        match self {
            Self::Value(value) => Some(value),
            Self::Object(_) => None,
        }
    }

    /// Returns the referenced object, if any.
    #[must_use]
    pub fn as_object(&self) -> Option<&Arc<dyn ManagedObject>> {
        match self {
            Self::Object(object) => object.as_ref(),
            Self::Value(_) => None,
        }
    }
}

impl From<ParamValue> for Param {
    fn from(value: ParamValue) -> Self {
        Self::Value(value)
    }
}

// ============================================================================
// OBJECT BASE
// ============================================================================

/// State every managed object carries.
///
/// A freshly created object has a reference count of one, owned by the
/// handle table entry it is assigned to.
#[derive(Debug)]
pub struct ObjectBase {
    kind: ObjectKind,
    type_name: String,
    params: RwLock<HashMap<String, Param>>,
    ref_count: AtomicU32,
    commit_count: AtomicU64,
}

impl ObjectBase {
    /// Creates the base for an object of the given kind and type.
    #[must_use]
    pub fn new(kind: ObjectKind, type_name: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            params: RwLock::new(HashMap::new()),
            ref_count: AtomicU32::new(1),
            commit_count: AtomicU64::new(0),
        }
    }

    /// Object kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Type name the object was created with (may be empty).
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Sets or replaces a parameter.
    pub fn set_param(&self, name: &str, value: Param) {
        self.params.write().insert(name.to_owned(), value);
    }

    /// Removes a parameter. Returns true if it existed.
    pub fn remove_param(&self, name: &str) -> bool {
        self.params.write().remove(name).is_some()
    }

    /// Returns a copy of a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<Param> {
        self.params.read().get(name).cloned()
    }

    /// Returns a plain parameter value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<ParamValue> {
        self.params.read().get(name).and_then(Param::as_value).cloned()
    }

    /// Returns an integer parameter, or `default`.
    #[must_use]
    pub fn int_param(&self, name: &str, default: i32) -> i32 {
        match self.value(name) {
            Some(ParamValue::Int(v)) => v,
            _ => default,
        }
    }

    /// Returns a float parameter, or `default`.
    #[must_use]
    pub fn float_param(&self, name: &str, default: f32) -> f32 {
        match self.value(name) {
            Some(ParamValue::Float(v)) => v,
            _ => default,
        }
    }

    /// Returns the object referenced by a parameter.
    #[must_use]
    pub fn object_param(&self, name: &str) -> Option<Arc<dyn ManagedObject>> {
        self.params.read().get(name).and_then(Param::as_object).cloned()
    }

    /// Returns true if the parameter is set.
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.params.read().contains_key(name)
    }

    /// Number of parameters currently set.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.read().len()
    }

    /// Increments the reference count.
    pub fn ref_inc(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the reference count.
    pub fn ref_dec(&self) -> u32 {
        let previous = self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
        match previous {
            Ok(count) => count - 1,
            Err(_) => {
                tracing::warn!(kind = %self.kind, "reference count underflow");
                0
            }
        }
    }

    /// Current reference count.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Records a commit.
    pub fn mark_committed(&self) {
        self.commit_count.fetch_add(1, Ordering::AcqRel);
    }

    /// How many times the object has been committed.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::Acquire)
    }
}

// ============================================================================
// MANAGED OBJECT
// ============================================================================

/// An object addressable through a handle.
///
/// Implementors embed an [`ObjectBase`] and override only what they need;
/// the capability accessors (`as_renderer`, ...) stand in for downcasts.
pub trait ManagedObject: Send + Sync + fmt::Debug {
    /// Shared object state.
    fn base(&self) -> &ObjectBase;

    /// Object kind.
    fn kind(&self) -> ObjectKind {
        self.base().kind()
    }

    /// Finalizes pending parameter changes.
    fn commit(&self) {
        self.base().mark_committed();
    }

    /// Sets a parameter.
    fn set_param(&self, name: &str, value: Param) {
        self.base().set_param(name, value);
    }

    /// Removes a parameter.
    fn remove_param(&self, name: &str) {
        self.base().remove_param(name);
    }

    /// Takes an extra reference for the duration of some deferred work.
    fn ref_inc(&self) {
        self.base().ref_inc();
    }

    /// Returns a reference taken with [`ManagedObject::ref_inc`].
    fn ref_dec(&self) {
        self.base().ref_dec();
    }

    /// Renderer interface, if this object is one.
    fn as_renderer(&self) -> Option<&dyn Renderer> {
        None
    }

    /// Framebuffer interface, if this object is one.
    fn as_frame_buffer(&self) -> Option<&dyn FrameBuffer> {
        None
    }

    /// Volume interface, if this object is one.
    fn as_volume(&self) -> Option<&dyn Volume> {
        None
    }

    /// Data array, if this object is one.
    fn as_data(&self) -> Option<&Data> {
        None
    }

    /// Render future, if this object is one.
    fn as_future(&self) -> Option<&RenderFuture> {
        None
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Completion state of a framebuffer's current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameEvent {
    /// Nothing has finished yet.
    #[default]
    NoneFinished = 0,
    /// The local render task returned.
    TaskFinished = 1,
    /// The whole frame (all tiles) is complete.
    FrameFinished = 2,
}

impl FrameEvent {
    /// Maps a stored byte back to an event. Unknown values read as `NoneFinished`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::TaskFinished,
            2 => Self::FrameFinished,
            _ => Self::NoneFinished,
        }
    }
}

/// Produces frames and answers pick queries.
pub trait Renderer: Send + Sync {
    /// Renders one frame, returning a convergence estimate.
    ///
    /// The master passes no camera or world: it has no mirror of them.
    fn render_frame(
        &self,
        frame_buffer: &dyn FrameBuffer,
        camera: Option<&dyn ManagedObject>,
        world: Option<&dyn ManagedObject>,
    ) -> f32;

    /// Casts a ray through `screen` (normalized coordinates).
    fn pick(
        &self,
        frame_buffer: &dyn FrameBuffer,
        camera: Option<&dyn ManagedObject>,
        world: Option<&dyn ManagedObject>,
        screen: Vec2f,
    ) -> PickResult;
}

/// Image target of a render.
pub trait FrameBuffer: Send + Sync {
    /// Dimensions in pixels.
    fn size(&self) -> Vec2i;

    /// Color format.
    fn format(&self) -> FrameBufferFormat;

    /// Enabled channels.
    fn channels(&self) -> FrameBufferChannels;

    /// Resets accumulation.
    fn clear(&self);

    /// Updates the completion state.
    fn set_completed_event(&self, event: FrameEvent);

    /// Current completion state.
    fn completed_event(&self) -> FrameEvent;
}

/// Voxel storage.
pub trait Volume: Send + Sync {
    /// Copies a block of voxels. Returns false if the region was rejected.
    fn set_region(&self, data: &[u8], origin: Vec3i, size: Vec3i) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(ObjectBase);

    impl ManagedObject for Plain {
        fn base(&self) -> &ObjectBase {
            &self.0
        }
    }

    #[test]
    fn test_master_capabilities() {
        assert!(ObjectKind::Renderer.mirrors_on_master(MasterOp::Commit));
        assert!(!ObjectKind::Volume.mirrors_on_master(MasterOp::Commit));
        assert!(!ObjectKind::World.mirrors_on_master(MasterOp::Commit));

        for op in [MasterOp::Create, MasterOp::SetParam, MasterOp::RemoveParam] {
            assert!(ObjectKind::Renderer.mirrors_on_master(op));
            assert!(ObjectKind::Volume.mirrors_on_master(op));
            assert!(!ObjectKind::Camera.mirrors_on_master(op));
            assert!(!ObjectKind::FrameBuffer.mirrors_on_master(op));
        }
    }

    #[test]
    fn test_params() {
        let object = Plain(ObjectBase::new(ObjectKind::Camera, "perspective"));
        object.set_param("fovy", ParamValue::Float(60.0).into());
        object.set_param("spp", ParamValue::Int(4).into());

        assert_eq!(object.base().float_param("fovy", 0.0), 60.0);
        assert_eq!(object.base().int_param("spp", 1), 4);
        assert_eq!(object.base().int_param("fovy", 1), 1);

        object.remove_param("spp");
        assert!(!object.base().has_param("spp"));
        assert_eq!(object.base().param_count(), 1);
    }

    #[test]
    fn test_object_param() {
        let target: Arc<dyn ManagedObject> = Arc::new(Plain(ObjectBase::new(ObjectKind::World, "")));
        let object = Plain(ObjectBase::new(ObjectKind::Renderer, "scivis"));

        object.set_param("world", Param::Object(Some(Arc::clone(&target))));
        object.set_param("none", Param::Object(None));

        let resolved = object.base().object_param("world").unwrap();
        assert_eq!(resolved.kind(), ObjectKind::World);
        assert!(object.base().object_param("none").is_none());
        assert_eq!(object.base().param("none").unwrap().kind(), ParamKind::Object);
    }

    #[test]
    fn test_ref_counting() {
        let object = Plain(ObjectBase::new(ObjectKind::FrameBuffer, ""));
        assert_eq!(object.base().ref_count(), 1);

        object.ref_inc();
        object.ref_inc();
        assert_eq!(object.base().ref_count(), 3);

        object.ref_dec();
        object.ref_dec();
        assert_eq!(object.base().ref_count(), 1);

        // Underflow is clamped
        object.ref_dec();
        object.ref_dec();
        assert_eq!(object.base().ref_count(), 0);
    }

    #[test]
    fn test_frame_event_bytes() {
        for event in [FrameEvent::NoneFinished, FrameEvent::TaskFinished, FrameEvent::FrameFinished] {
            assert_eq!(FrameEvent::from_u8(event as u8), event);
        }
    }
}
