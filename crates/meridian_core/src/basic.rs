//! # Basic Objects
//!
//! Small reference implementations of every object kind. They do no real
//! rendering, but they honor the collaborator contracts closely enough to
//! drive a cluster end to end (the demo node and the integration tests).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use meridian_shared::{
    FrameBufferChannels, FrameBufferFormat, Handle, ParamValue, PickResult, Vec2f, Vec2i, Vec3f, Vec3i,
};

use crate::error::{ObjectError, ObjectResult};
use crate::factory::{ModuleLoader, ObjectFactory};
use crate::object::{FrameBuffer, FrameEvent, ManagedObject, ObjectBase, ObjectKind, Renderer, Volume};

// ============================================================================
// KNOWN TYPES
// ============================================================================

const RENDERER_TYPES: &[&str] = &["scivis", "pathtracer", "debug"];
const CAMERA_TYPES: &[&str] = &["perspective", "orthographic", "panoramic"];
const GEOMETRY_TYPES: &[&str] = &["mesh", "spheres", "curves", "boxes", "subdivision"];
const VOLUME_TYPES: &[&str] = &["structured_regular", "unstructured", "amr"];
const TRANSFER_FUNCTION_TYPES: &[&str] = &["piecewise_linear"];
const PIXEL_OP_TYPES: &[&str] = &["tonemapper", "debug"];
const LIGHT_TYPES: &[&str] = &["ambient", "distant", "sphere", "spot", "quad", "hdri"];
const TEXTURE_TYPES: &[&str] = &["texture2d", "volume"];
const MATERIAL_TYPES: &[&str] = &["obj", "principled", "glass", "metal"];

fn known(kind: ObjectKind, types: &[&str], type_name: &str) -> ObjectResult<()> {
    if types.contains(&type_name) {
        Ok(())
    } else {
        Err(ObjectError::UnknownType {
            kind,
            type_name: type_name.to_owned(),
        })
    }
}

// ============================================================================
// GENERIC OBJECTS
// ============================================================================

/// Object with no behavior beyond its parameters.
#[derive(Debug)]
pub struct BasicObject {
    base: ObjectBase,
}

impl BasicObject {
    /// Creates a parameter-only object.
    #[must_use]
    pub fn new(kind: ObjectKind, type_name: &str) -> Self {
        Self {
            base: ObjectBase::new(kind, type_name),
        }
    }
}

impl ManagedObject for BasicObject {
    fn base(&self) -> &ObjectBase {
        &self.base
    }
}

/// A geometry or volume placed in the scene.
#[derive(Debug)]
pub struct BasicInstance {
    base: ObjectBase,
    model: Arc<dyn ManagedObject>,
}

impl BasicInstance {
    /// The instanced geometry or volume.
    #[must_use]
    pub fn model(&self) -> &Arc<dyn ManagedObject> {
        &self.model
    }
}

impl ManagedObject for BasicInstance {
    fn base(&self) -> &ObjectBase {
        &self.base
    }
}

// ============================================================================
// RENDERER
// ============================================================================

/// Renderer that reports a variance of `1 / pixelSamples`.
///
/// The `renderDelayMs` parameter makes each frame take that long, which is
/// how tests keep several frames in flight at once.
#[derive(Debug)]
pub struct BasicRenderer {
    base: ObjectBase,
    frames: AtomicU64,
}

impl BasicRenderer {
    /// Creates a renderer of the given type.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            base: ObjectBase::new(ObjectKind::Renderer, type_name),
            frames: AtomicU64::new(0),
        }
    }

    /// Number of frames rendered so far.
    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl ManagedObject for BasicRenderer {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn as_renderer(&self) -> Option<&dyn Renderer> {
        Some(self)
    }
}

impl Renderer for BasicRenderer {
    fn render_frame(
        &self,
        _frame_buffer: &dyn FrameBuffer,
        _camera: Option<&dyn ManagedObject>,
        _world: Option<&dyn ManagedObject>,
    ) -> f32 {
        let delay = self.base.int_param("renderDelayMs", 0);
        if let Ok(delay) = u64::try_from(delay) {
            if delay > 0 {
                std::thread::sleep(Duration::from_millis(delay));
            }
        }
        self.frames.fetch_add(1, Ordering::AcqRel);

        let samples = u16::try_from(self.base.int_param("pixelSamples", 1).max(1)).unwrap_or(u16::MAX);
        1.0 / f32::from(samples)
    }

    /// Hits whenever the screen position falls inside the world's `bounds`.
    fn pick(
        &self,
        _frame_buffer: &dyn FrameBuffer,
        _camera: Option<&dyn ManagedObject>,
        world: Option<&dyn ManagedObject>,
        screen: Vec2f,
    ) -> PickResult {
        let Some(world) = world else {
            return PickResult::miss();
        };
        let Some(ParamValue::Box3f(bounds)) = world.base().value("bounds") else {
            return PickResult::miss();
        };

        let inside = screen.x >= bounds.lower.x
            && screen.x <= bounds.upper.x
            && screen.y >= bounds.lower.y
            && screen.y <= bounds.upper.y;
        if !inside {
            return PickResult::miss();
        }

        let prim_id = u32::try_from(world.base().int_param("primID", 0)).unwrap_or(0);
        PickResult::hit(
            Vec3f::new(screen.x, screen.y, bounds.lower.z),
            Handle::NULL,
            Handle::NULL,
            prim_id,
        )
    }
}

// ============================================================================
// FRAMEBUFFER
// ============================================================================

/// Framebuffer that tracks its completion state and how often it was cleared.
#[derive(Debug)]
pub struct BasicFrameBuffer {
    base: ObjectBase,
    size: Vec2i,
    format: FrameBufferFormat,
    channels: FrameBufferChannels,
    event: AtomicU8,
    clears: AtomicU32,
}

impl BasicFrameBuffer {
    /// Creates a framebuffer.
    #[must_use]
    pub fn new(size: Vec2i, format: FrameBufferFormat, channels: FrameBufferChannels) -> Self {
        Self {
            base: ObjectBase::new(ObjectKind::FrameBuffer, ""),
            size,
            format,
            channels,
            event: AtomicU8::new(FrameEvent::NoneFinished as u8),
            clears: AtomicU32::new(0),
        }
    }

    /// Number of accumulation resets.
    #[must_use]
    pub fn clear_count(&self) -> u32 {
        self.clears.load(Ordering::Acquire)
    }
}

impl ManagedObject for BasicFrameBuffer {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn as_frame_buffer(&self) -> Option<&dyn FrameBuffer> {
        Some(self)
    }
}

impl FrameBuffer for BasicFrameBuffer {
    fn size(&self) -> Vec2i {
        self.size
    }

    fn format(&self) -> FrameBufferFormat {
        self.format
    }

    fn channels(&self) -> FrameBufferChannels {
        self.channels
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::AcqRel);
    }

    fn set_completed_event(&self, event: FrameEvent) {
        self.event.store(event as u8, Ordering::Release);
    }

    fn completed_event(&self) -> FrameEvent {
        FrameEvent::from_u8(self.event.load(Ordering::Acquire))
    }
}

// ============================================================================
// VOLUME
// ============================================================================

/// Volume that accepts regions inside its committed `dimensions`.
#[derive(Debug)]
pub struct BasicVolume {
    base: ObjectBase,
    regions: Mutex<Vec<(Vec3i, Vec3i)>>,
    bytes: AtomicU64,
}

impl BasicVolume {
    /// Creates a volume of the given type.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            base: ObjectBase::new(ObjectKind::Volume, type_name),
            regions: Mutex::new(Vec::new()),
            bytes: AtomicU64::new(0),
        }
    }

    /// Regions accepted so far, as (origin, size).
    #[must_use]
    pub fn regions(&self) -> Vec<(Vec3i, Vec3i)> {
        self.regions.lock().clone()
    }

    /// Total voxel bytes accepted.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }
}

impl ManagedObject for BasicVolume {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn as_volume(&self) -> Option<&dyn Volume> {
        Some(self)
    }
}

impl Volume for BasicVolume {
    fn set_region(&self, data: &[u8], origin: Vec3i, size: Vec3i) -> bool {
        if size.volume() == Some(0) || origin.x < 0 || origin.y < 0 || origin.z < 0 {
            return false;
        }
        if let Some(ParamValue::Vec3i(dims)) = self.base.value("dimensions") {
            let fits = |o: i32, s: i32, d: i32| o.checked_add(s).is_some_and(|end| end <= d);
            if !(fits(origin.x, size.x, dims.x) && fits(origin.y, size.y, dims.y) && fits(origin.z, size.z, dims.z)) {
                return false;
            }
        }
        self.regions.lock().push((origin, size));
        self.bytes.fetch_add(data.len() as u64, Ordering::AcqRel);
        true
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Factory producing the basic objects above.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicFactory;

impl BasicFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ObjectFactory for BasicFactory {
    fn create(&self, kind: ObjectKind, type_name: &str) -> ObjectResult<Arc<dyn ManagedObject>> {
        let object: Arc<dyn ManagedObject> = match kind {
            ObjectKind::Renderer => {
                known(kind, RENDERER_TYPES, type_name)?;
                Arc::new(BasicRenderer::new(type_name))
            }
            ObjectKind::Volume => {
                known(kind, VOLUME_TYPES, type_name)?;
                Arc::new(BasicVolume::new(type_name))
            }
            ObjectKind::World => Arc::new(BasicObject::new(kind, type_name)),
            ObjectKind::Camera
            | ObjectKind::Geometry
            | ObjectKind::TransferFunction
            | ObjectKind::PixelOp
            | ObjectKind::Light
            | ObjectKind::Texture => {
                let types = match kind {
                    ObjectKind::Camera => CAMERA_TYPES,
                    ObjectKind::Geometry => GEOMETRY_TYPES,
                    ObjectKind::TransferFunction => TRANSFER_FUNCTION_TYPES,
                    ObjectKind::PixelOp => PIXEL_OP_TYPES,
                    ObjectKind::Light => LIGHT_TYPES,
                    _ => TEXTURE_TYPES,
                };
                known(kind, types, type_name)?;
                Arc::new(BasicObject::new(kind, type_name))
            }
            _ => {
                return Err(ObjectError::UnknownType {
                    kind,
                    type_name: type_name.to_owned(),
                })
            }
        };
        Ok(object)
    }

    fn create_material(&self, renderer_type: &str, material_type: &str) -> ObjectResult<Arc<dyn ManagedObject>> {
        known(ObjectKind::Renderer, RENDERER_TYPES, renderer_type)?;
        known(ObjectKind::Material, MATERIAL_TYPES, material_type)?;
        Ok(Arc::new(BasicObject::new(ObjectKind::Material, material_type)))
    }

    fn create_instance(&self, kind: ObjectKind, model: Arc<dyn ManagedObject>) -> ObjectResult<Arc<dyn ManagedObject>> {
        match kind {
            ObjectKind::GeometryInstance | ObjectKind::VolumeInstance => Ok(Arc::new(BasicInstance {
                base: ObjectBase::new(kind, model.base().type_name()),
                model,
            })),
            _ => Err(ObjectError::UnknownType {
                kind,
                type_name: String::from("instance"),
            }),
        }
    }

    fn create_frame_buffer(
        &self,
        size: Vec2i,
        format: FrameBufferFormat,
        channels: FrameBufferChannels,
    ) -> ObjectResult<Arc<dyn ManagedObject>> {
        if size.area() == 0 {
            return Err(ObjectError::UnknownType {
                kind: ObjectKind::FrameBuffer,
                type_name: format!("{}x{}", size.x, size.y),
            });
        }
        Ok(Arc::new(BasicFrameBuffer::new(size, format, channels)))
    }
}

// ============================================================================
// MODULES
// ============================================================================

/// Module loader over a fixed list of available module names.
#[derive(Debug, Default)]
pub struct BasicModuleLoader {
    available: Vec<String>,
    loaded: Mutex<Vec<String>>,
}

impl BasicModuleLoader {
    /// Error code for a module that is not available.
    pub const NOT_FOUND: i32 = 1;

    /// Creates a loader that knows the given modules.
    #[must_use]
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// Modules loaded so far, in load order.
    #[must_use]
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

impl ModuleLoader for BasicModuleLoader {
    fn load_module(&self, name: &str) -> i32 {
        if !self.available.iter().any(|module| module == name) {
            tracing::warn!(module = name, "module not found");
            return Self::NOT_FOUND;
        }
        let mut loaded = self.loaded.lock();
        if !loaded.iter().any(|module| module == name) {
            loaded.push(name.to_owned());
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_shared::Box3f;

    #[test]
    fn test_factory_known_and_unknown_types() {
        let factory = BasicFactory::new();
        let renderer = factory.create(ObjectKind::Renderer, "scivis").unwrap();
        assert!(renderer.as_renderer().is_some());

        assert_eq!(
            factory.create(ObjectKind::Camera, "fisheye").unwrap_err(),
            ObjectError::UnknownType {
                kind: ObjectKind::Camera,
                type_name: "fisheye".into(),
            }
        );
        assert!(factory.create(ObjectKind::FrameBuffer, "").is_err());
        assert!(factory.create_material("scivis", "obj").is_ok());
        assert!(factory.create_material("raycast", "obj").is_err());
    }

    #[test]
    fn test_instances_hold_their_model() {
        let factory = BasicFactory::new();
        let geometry = factory.create(ObjectKind::Geometry, "spheres").unwrap();
        let instance = factory
            .create_instance(ObjectKind::GeometryInstance, Arc::clone(&geometry))
            .unwrap();
        assert_eq!(instance.kind(), ObjectKind::GeometryInstance);
        assert_eq!(Arc::strong_count(&geometry), 2);
        assert!(factory.create_instance(ObjectKind::World, geometry).is_err());
    }

    #[test]
    fn test_render_and_frame_events() {
        let fb = BasicFrameBuffer::new(Vec2i::new(4, 4), FrameBufferFormat::Rgba8, FrameBufferChannels::COLOR);
        let renderer = BasicRenderer::new("scivis");
        renderer.set_param("pixelSamples", ParamValue::Int(4).into());

        assert_eq!(renderer.render_frame(&fb, None, None), 0.25);
        assert_eq!(renderer.frames_rendered(), 1);

        fb.set_completed_event(FrameEvent::TaskFinished);
        assert_eq!(fb.completed_event(), FrameEvent::TaskFinished);
        fb.clear();
        assert_eq!(fb.clear_count(), 1);
    }

    #[test]
    fn test_pick_inside_bounds() {
        let fb = BasicFrameBuffer::new(Vec2i::new(4, 4), FrameBufferFormat::Rgba8, FrameBufferChannels::COLOR);
        let renderer = BasicRenderer::new("scivis");
        let world = BasicObject::new(ObjectKind::World, "");
        world.set_param(
            "bounds",
            ParamValue::Box3f(Box3f::new(Vec3f::ZERO, Vec3f::new(0.5, 0.5, 1.0))).into(),
        );

        let hit = renderer.pick(&fb, None, Some(&world), Vec2f::new(0.25, 0.25));
        assert!(hit.is_hit());
        assert_eq!(hit.world_position, Vec3f::new(0.25, 0.25, 0.0));

        assert!(!renderer.pick(&fb, None, Some(&world), Vec2f::new(0.75, 0.25)).is_hit());
        assert!(!renderer.pick(&fb, None, None, Vec2f::new(0.25, 0.25)).is_hit());
    }

    #[test]
    fn test_volume_regions() {
        let volume = BasicVolume::new("structured_regular");
        volume.set_param("dimensions", ParamValue::Vec3i(Vec3i::new(8, 8, 8)).into());

        assert!(volume.set_region(&[0; 8], Vec3i::new(0, 0, 0), Vec3i::new(2, 2, 2)));
        assert!(!volume.set_region(&[0; 8], Vec3i::new(7, 0, 0), Vec3i::new(2, 2, 2)));
        assert!(!volume.set_region(&[], Vec3i::new(0, 0, 0), Vec3i::new(0, 2, 2)));
        assert_eq!(volume.regions().len(), 1);
        assert_eq!(volume.bytes_received(), 8);
    }

    #[test]
    fn test_module_loader() {
        let loader = BasicModuleLoader::new(["denoiser"]);
        assert_eq!(loader.load_module("denoiser"), 0);
        assert_eq!(loader.load_module("denoiser"), 0);
        assert_eq!(loader.load_module("missing"), BasicModuleLoader::NOT_FOUND);
        assert_eq!(loader.loaded(), vec![String::from("denoiser")]);
    }
}
