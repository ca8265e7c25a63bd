//! Construction seams.
//!
//! Commands never build objects themselves. They ask the rank's factory, so
//! the object implementations stay outside the replication protocol.

use std::sync::Arc;

use meridian_shared::{FrameBufferChannels, FrameBufferFormat, Vec2i};

use crate::error::ObjectResult;
use crate::object::{ManagedObject, ObjectKind};

/// Builds the local instance for each creation command.
pub trait ObjectFactory: Send + Sync {
    /// Creates an object that is described by its kind and a type name.
    ///
    /// Covers renderers, worlds, geometries, cameras, volumes, transfer
    /// functions, pixel ops, lights and textures.
    ///
    /// # Errors
    ///
    /// `UnknownType` if the type name is not supported for that kind.
    fn create(&self, kind: ObjectKind, type_name: &str) -> ObjectResult<Arc<dyn ManagedObject>>;

    /// Creates a material for a given renderer type.
    ///
    /// # Errors
    ///
    /// `UnknownType` if the combination is not supported.
    fn create_material(&self, renderer_type: &str, material_type: &str) -> ObjectResult<Arc<dyn ManagedObject>>;

    /// Places a geometry or volume in the scene.
    ///
    /// `kind` is `GeometryInstance` or `VolumeInstance`.
    ///
    /// # Errors
    ///
    /// `UnknownType` if `kind` is not an instance kind.
    fn create_instance(&self, kind: ObjectKind, model: Arc<dyn ManagedObject>) -> ObjectResult<Arc<dyn ManagedObject>>;

    /// Creates a framebuffer.
    ///
    /// # Errors
    ///
    /// Implementation defined, e.g. for a zero-sized image.
    fn create_frame_buffer(
        &self,
        size: Vec2i,
        format: FrameBufferFormat,
        channels: FrameBufferChannels,
    ) -> ObjectResult<Arc<dyn ManagedObject>>;
}

/// Loads optional functionality by name.
pub trait ModuleLoader: Send + Sync {
    /// Loads a module, returning zero on success and an error code otherwise.
    fn load_module(&self, name: &str) -> i32;
}
