//! Object construction commands.

use meridian_core::{MasterOp, ObjectKind};
use meridian_shared::{CodecResult, Decode, Encode, Handle, ReadStream, WriteStream};

use super::{tags, Work, WorkItem, WorkTag};
use crate::context::ClusterContext;
use crate::error::ClusterResult;

/// Creates an object described by its kind and a type name.
///
/// One tag per kind; the kind itself is not on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewObject {
    kind: ObjectKind,
    tag: WorkTag,
    /// Implementation type, e.g. `"perspective"` for a camera.
    pub type_name: String,
    /// Handle the new object is bound to.
    pub handle: Handle,
}

impl NewObject {
    /// Returns `None` for kinds that have their own construction command.
    #[must_use]
    pub fn new(kind: ObjectKind, type_name: impl Into<String>, handle: Handle) -> Option<Self> {
        Some(Self {
            kind,
            tag: tags::new_object(kind)?,
            type_name: type_name.into(),
            handle,
        })
    }

    /// The kind being created.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub(super) fn decode_kind(kind: ObjectKind, stream: &mut ReadStream<'_>) -> ClusterResult<Work> {
        let type_name = stream.read_string()?;
        let handle = stream.get()?;
        Ok(Work::NewObject(Self {
            kind,
            tag: tags::new_object(kind).unwrap_or_default(),
            type_name,
            handle,
        }))
    }
}

impl Encode for NewObject {
    fn encode(&self, stream: &mut WriteStream) {
        stream.put(&self.type_name).put(&self.handle);
    }
}

impl WorkItem for NewObject {
    fn tag(&self) -> WorkTag {
        self.tag
    }

    fn name(&self) -> &'static str {
        "NewObject"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let object = ctx
            .factory()
            .create(self.kind, &self.type_name)
            .map_err(|e| ctx.object_error(e))?;
        ctx.assign(self.handle, object)
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if self.kind.mirrors_on_master(MasterOp::Create) {
            return self.run(ctx);
        }
        tracing::debug!(handle = %self.handle, kind = %self.kind, "not mirrored on master");
        Ok(())
    }
}

/// Creates a material for a renderer type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMaterial {
    /// Renderer type the material is meant for.
    pub renderer_type: String,
    /// Material type.
    pub material_type: String,
    /// Handle the material is bound to.
    pub handle: Handle,
}

impl NewMaterial {
    /// Creates the command.
    #[must_use]
    pub fn new(renderer_type: impl Into<String>, material_type: impl Into<String>, handle: Handle) -> Self {
        Self {
            renderer_type: renderer_type.into(),
            material_type: material_type.into(),
            handle,
        }
    }
}

impl Encode for NewMaterial {
    fn encode(&self, stream: &mut WriteStream) {
        stream
            .put(&self.renderer_type)
            .put(&self.material_type)
            .put(&self.handle);
    }
}

impl Decode for NewMaterial {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self {
            renderer_type: stream.read_string()?,
            material_type: stream.read_string()?,
            handle: stream.get()?,
        })
    }
}

impl WorkItem for NewMaterial {
    fn tag(&self) -> WorkTag {
        tags::NEW_MATERIAL
    }

    fn name(&self) -> &'static str {
        "NewMaterial"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let material = ctx
            .factory()
            .create_material(&self.renderer_type, &self.material_type)
            .map_err(|e| ctx.object_error(e))?;
        ctx.assign(self.handle, material)
    }
}

/// Places a geometry or volume into the scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewInstance {
    kind: ObjectKind,
    /// The geometry or volume being placed.
    pub model: Handle,
    /// Handle the instance is bound to.
    pub handle: Handle,
}

impl NewInstance {
    /// Returns `None` unless `kind` is `GeometryInstance` or `VolumeInstance`.
    #[must_use]
    pub fn new(kind: ObjectKind, model: Handle, handle: Handle) -> Option<Self> {
        tags::new_instance(kind)?;
        Some(Self { kind, model, handle })
    }

    /// The instance kind.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    const fn model_kind(&self) -> ObjectKind {
        match self.kind {
            ObjectKind::VolumeInstance => ObjectKind::Volume,
            _ => ObjectKind::Geometry,
        }
    }

    pub(super) fn decode_kind(kind: ObjectKind, stream: &mut ReadStream<'_>) -> ClusterResult<Work> {
        Ok(Work::NewInstance(Self {
            kind,
            model: stream.get()?,
            handle: stream.get()?,
        }))
    }
}

impl Encode for NewInstance {
    fn encode(&self, stream: &mut WriteStream) {
        stream.put(&self.model).put(&self.handle);
    }
}

impl WorkItem for NewInstance {
    fn tag(&self) -> WorkTag {
        tags::new_instance(self.kind).unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "NewInstance"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let model = ctx.lookup_kind(self.model, self.model_kind())?.clone();
        let instance = ctx
            .factory()
            .create_instance(self.kind, model)
            .map_err(|e| ctx.object_error(e))?;
        ctx.assign(self.handle, instance)
    }
}
