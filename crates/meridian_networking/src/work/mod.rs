//! # Work Items
//!
//! Every replicated state change is a work item: a command the master
//! encodes once and every rank executes locally.
//!
//! ## Wire Frame
//!
//! ```text
//! ┌──────────┬────────────────────────────┐
//! │ Tag (4)  │ Payload (variant specific) │
//! └──────────┴────────────────────────────┘
//! ```
//!
//! A command message holds one or more frames back to back. The tag alone
//! selects the decoder, so the [`WorkTypeRegistry`] must be built the same
//! way on every rank before any traffic flows.
//!
//! ## Two Execution Paths
//!
//! - [`WorkItem::run`]: the full-mirror path taken by workers
//! - [`WorkItem::run_on_master`]: the master's path, often a guarded subset
//!   because the master only mirrors some object kinds

mod data;
mod frame;
mod objects;
mod params;
mod system;

pub use data::{check_region_size, NewData, SetRegion};
pub use frame::{CreateFrameBuffer, Pick, RenderFrameAsync, ResetAccumulation};
pub use objects::{NewInstance, NewMaterial, NewObject};
pub use params::{CommandRelease, CommitObject, RemoveParam, SetParam};
pub use system::{CommandFinalize, LoadModule, SetLoadBalancer};

use std::collections::HashMap;
use std::fmt;

use meridian_core::ObjectKind;
use meridian_shared::{
    Affine3f, Box1f, Box2f, Box3f, Box4f, Decode, Encode, Linear3f, ObjectRef, ParamKind, ParamType, ReadStream,
    Vec2f, Vec2i, Vec3f, Vec3i, Vec4f, Vec4i, WriteStream,
};

use crate::context::ClusterContext;
use crate::error::{ClusterError, ClusterResult};

/// Wire discriminator of a work item.
pub type WorkTag = u32;

/// The tag space. Stable across ranks and releases.
pub mod tags {
    use meridian_core::ObjectKind;
    use meridian_shared::ParamKind;

    use super::WorkTag;

    /// `SetLoadBalancer`.
    pub const SET_LOAD_BALANCER: WorkTag = 0x01;

    /// `NewObject` for renderers.
    pub const NEW_RENDERER: WorkTag = 0x10;
    /// `NewObject` for worlds.
    pub const NEW_WORLD: WorkTag = 0x11;
    /// `NewObject` for geometries.
    pub const NEW_GEOMETRY: WorkTag = 0x12;
    /// `NewObject` for cameras.
    pub const NEW_CAMERA: WorkTag = 0x13;
    /// `NewObject` for volumes.
    pub const NEW_VOLUME: WorkTag = 0x14;
    /// `NewObject` for transfer functions.
    pub const NEW_TRANSFER_FUNCTION: WorkTag = 0x15;
    /// `NewObject` for pixel ops.
    pub const NEW_PIXEL_OP: WorkTag = 0x16;
    /// `NewObject` for lights.
    pub const NEW_LIGHT: WorkTag = 0x17;
    /// `NewObject` for textures.
    pub const NEW_TEXTURE: WorkTag = 0x18;

    /// `NewMaterial`.
    pub const NEW_MATERIAL: WorkTag = 0x20;
    /// `NewInstance` for geometries.
    pub const NEW_GEOMETRY_INSTANCE: WorkTag = 0x21;
    /// `NewInstance` for volumes.
    pub const NEW_VOLUME_INSTANCE: WorkTag = 0x22;
    /// `NewData`.
    pub const NEW_DATA: WorkTag = 0x23;

    /// `CommitObject`.
    pub const COMMIT_OBJECT: WorkTag = 0x30;
    /// `CommandRelease`.
    pub const COMMAND_RELEASE: WorkTag = 0x31;
    /// `RemoveParam`.
    pub const REMOVE_PARAM: WorkTag = 0x32;

    /// `LoadModule`.
    pub const LOAD_MODULE: WorkTag = 0x40;

    /// `CreateFrameBuffer`.
    pub const CREATE_FRAME_BUFFER: WorkTag = 0x50;
    /// `ResetAccumulation`.
    pub const RESET_ACCUMULATION: WorkTag = 0x51;
    /// `RenderFrameAsync`.
    pub const RENDER_FRAME_ASYNC: WorkTag = 0x52;
    /// `Pick`. Also the tag of the point-to-point pick reply.
    pub const PICK: WorkTag = 0x53;

    /// `SetRegion`.
    pub const SET_REGION: WorkTag = 0x60;

    /// `CommandFinalize`.
    pub const COMMAND_FINALIZE: WorkTag = 0x70;

    /// First `SetParam` tag; the parameter kind is added to it.
    pub const SET_PARAM_BASE: WorkTag = 0x100;

    /// `SetParam` tag for values of `kind`.
    #[must_use]
    pub const fn set_param(kind: ParamKind) -> WorkTag {
        SET_PARAM_BASE + kind as WorkTag
    }

    /// `NewObject` tag for `kind`, if `NewObject` can build that kind.
    #[must_use]
    pub const fn new_object(kind: ObjectKind) -> Option<WorkTag> {
        match kind {
            ObjectKind::Renderer => Some(NEW_RENDERER),
            ObjectKind::World => Some(NEW_WORLD),
            ObjectKind::Geometry => Some(NEW_GEOMETRY),
            ObjectKind::Camera => Some(NEW_CAMERA),
            ObjectKind::Volume => Some(NEW_VOLUME),
            ObjectKind::TransferFunction => Some(NEW_TRANSFER_FUNCTION),
            ObjectKind::PixelOp => Some(NEW_PIXEL_OP),
            ObjectKind::Light => Some(NEW_LIGHT),
            ObjectKind::Texture => Some(NEW_TEXTURE),
            _ => None,
        }
    }

    /// `NewInstance` tag for `kind`, if it is an instance kind.
    #[must_use]
    pub const fn new_instance(kind: ObjectKind) -> Option<WorkTag> {
        match kind {
            ObjectKind::GeometryInstance => Some(NEW_GEOMETRY_INSTANCE),
            ObjectKind::VolumeInstance => Some(NEW_VOLUME_INSTANCE),
            _ => None,
        }
    }
}

/// Behavior shared by every command variant.
pub trait WorkItem: Encode {
    /// Wire tag of this item.
    fn tag(&self) -> WorkTag;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Executes on a rank that keeps the full object mirror.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal for the rank.
    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()>;

    /// Executes on the master. Does nothing unless overridden.
    ///
    /// # Errors
    ///
    /// Master-side failures surface to the caller of the dispatcher.
    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Whether the master must send its batch before running this item
    /// locally. Items that rendezvous with the workers return true.
    fn flushes(&self) -> bool {
        false
    }
}

/// Declares the `Work` sum type over every item.
macro_rules! work_items {
    ($($(#[$meta:meta])* $variant:ident($ty:ty)),* $(,)?) => {
        /// Any command, as decoded from the wire.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Work {
            $(
                $(#[$meta])*
                $variant($ty),
            )*
        }

        $(
            impl From<$ty> for Work {
                fn from(item: $ty) -> Self {
                    Self::$variant(item)
                }
            }
        )*

        impl Work {
            /// The item as a trait object.
            #[must_use]
            pub fn as_item(&self) -> &dyn WorkItem {
                match self {
                    $(Self::$variant(item) => item,)*
                }
            }

            /// The item as a mutable trait object.
            pub fn as_item_mut(&mut self) -> &mut dyn WorkItem {
                match self {
                    $(Self::$variant(item) => item,)*
                }
            }
        }
    };
}

work_items! {
    /// Selects the tile load balancer.
    SetLoadBalancer(SetLoadBalancer),
    /// Creates a kind-and-type described object.
    NewObject(NewObject),
    /// Creates a material.
    NewMaterial(NewMaterial),
    /// Places a geometry or volume.
    NewInstance(NewInstance),
    /// Creates a data array.
    NewData(NewData),
    /// Commits an object.
    CommitObject(CommitObject),
    /// Sets a parameter.
    SetParam(SetParam),
    /// Removes a parameter.
    RemoveParam(RemoveParam),
    /// Releases a handle.
    CommandRelease(CommandRelease),
    /// Loads a module.
    LoadModule(LoadModule),
    /// Creates a framebuffer.
    CreateFrameBuffer(CreateFrameBuffer),
    /// Clears accumulated samples.
    ResetAccumulation(ResetAccumulation),
    /// Starts an asynchronous render.
    RenderFrameAsync(RenderFrameAsync),
    /// Screen-space point query.
    Pick(Pick),
    /// Updates a volume region.
    SetRegion(SetRegion),
    /// Shuts the rank down.
    CommandFinalize(CommandFinalize),
}

impl Work {
    /// Wire tag of the wrapped item.
    #[must_use]
    pub fn tag(&self) -> WorkTag {
        self.as_item().tag()
    }

    /// Log name of the wrapped item.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.as_item().name()
    }

    /// Appends `[tag][payload]`.
    pub fn encode_frame(&self, stream: &mut WriteStream) {
        let item = self.as_item();
        stream.write_u32(item.tag());
        item.encode(stream);
    }
}

/// Reads one payload of the variant registered under a tag.
pub type WorkDecoder = fn(&mut ReadStream<'_>) -> ClusterResult<Work>;

/// Maps tags to decoders.
#[derive(Default)]
pub struct WorkTypeRegistry {
    decoders: HashMap<WorkTag, (&'static str, WorkDecoder)>,
}

impl fmt::Debug for WorkTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkTypeRegistry")
            .field("registered", &self.decoders.len())
            .finish()
    }
}

impl WorkTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in work item.
    ///
    /// # Errors
    ///
    /// `DuplicateWorkTag` if two built-in items share a tag.
    pub fn with_defaults() -> ClusterResult<Self> {
        let mut registry = Self::new();
        register_work_items(&mut registry)?;
        Ok(registry)
    }

    /// Binds `decoder` to `tag`.
    ///
    /// # Errors
    ///
    /// `DuplicateWorkTag` if the tag is taken.
    pub fn register(&mut self, tag: WorkTag, name: &'static str, decoder: WorkDecoder) -> ClusterResult<()> {
        if self.decoders.contains_key(&tag) {
            return Err(ClusterError::DuplicateWorkTag(tag));
        }
        self.decoders.insert(tag, (name, decoder));
        Ok(())
    }

    /// Number of registered tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Name registered under `tag`.
    #[must_use]
    pub fn name(&self, tag: WorkTag) -> Option<&'static str> {
        self.decoders.get(&tag).map(|(name, _)| *name)
    }

    /// Reads the next `[tag][payload]` frame.
    ///
    /// # Errors
    ///
    /// `UnknownWorkTag` for an unregistered tag, `Codec` for a malformed
    /// payload.
    pub fn decode(&self, stream: &mut ReadStream<'_>) -> ClusterResult<Work> {
        let tag = stream.read_u32()?;
        let (_, decoder) = self.decoders.get(&tag).ok_or(ClusterError::UnknownWorkTag(tag))?;
        decoder(stream)
    }
}

fn decode_as<T: Decode + Into<Work>>(stream: &mut ReadStream<'_>) -> ClusterResult<Work> {
    Ok(T::decode(stream)?.into())
}

fn decode_set_param<T: ParamType>(stream: &mut ReadStream<'_>) -> ClusterResult<Work> {
    SetParam::decode_typed::<T>(stream).map(Work::from)
}

/// Registers every built-in work item.
///
/// # Errors
///
/// `DuplicateWorkTag` if any tag is already taken in `registry`.
pub fn register_work_items(registry: &mut WorkTypeRegistry) -> ClusterResult<()> {
    registry.register(tags::SET_LOAD_BALANCER, "SetLoadBalancer", decode_as::<SetLoadBalancer>)?;

    registry.register(tags::NEW_RENDERER, "NewRenderer", |s| {
        NewObject::decode_kind(ObjectKind::Renderer, s)
    })?;
    registry.register(tags::NEW_WORLD, "NewWorld", |s| NewObject::decode_kind(ObjectKind::World, s))?;
    registry.register(tags::NEW_GEOMETRY, "NewGeometry", |s| {
        NewObject::decode_kind(ObjectKind::Geometry, s)
    })?;
    registry.register(tags::NEW_CAMERA, "NewCamera", |s| NewObject::decode_kind(ObjectKind::Camera, s))?;
    registry.register(tags::NEW_VOLUME, "NewVolume", |s| NewObject::decode_kind(ObjectKind::Volume, s))?;
    registry.register(tags::NEW_TRANSFER_FUNCTION, "NewTransferFunction", |s| {
        NewObject::decode_kind(ObjectKind::TransferFunction, s)
    })?;
    registry.register(tags::NEW_PIXEL_OP, "NewPixelOp", |s| {
        NewObject::decode_kind(ObjectKind::PixelOp, s)
    })?;
    registry.register(tags::NEW_LIGHT, "NewLight", |s| NewObject::decode_kind(ObjectKind::Light, s))?;
    registry.register(tags::NEW_TEXTURE, "NewTexture", |s| {
        NewObject::decode_kind(ObjectKind::Texture, s)
    })?;

    registry.register(tags::NEW_MATERIAL, "NewMaterial", decode_as::<NewMaterial>)?;
    registry.register(tags::NEW_GEOMETRY_INSTANCE, "NewGeometryInstance", |s| {
        NewInstance::decode_kind(ObjectKind::GeometryInstance, s)
    })?;
    registry.register(tags::NEW_VOLUME_INSTANCE, "NewVolumeInstance", |s| {
        NewInstance::decode_kind(ObjectKind::VolumeInstance, s)
    })?;
    registry.register(tags::NEW_DATA, "NewData", decode_as::<NewData>)?;

    registry.register(tags::COMMIT_OBJECT, "CommitObject", decode_as::<CommitObject>)?;
    registry.register(tags::COMMAND_RELEASE, "CommandRelease", decode_as::<CommandRelease>)?;
    registry.register(tags::REMOVE_PARAM, "RemoveParam", decode_as::<RemoveParam>)?;

    registry.register(tags::set_param(ParamKind::Object), "SetParam", decode_set_param::<ObjectRef>)?;
    registry.register(tags::set_param(ParamKind::String), "SetParam", decode_set_param::<String>)?;
    registry.register(tags::set_param(ParamKind::Int), "SetParam", decode_set_param::<i32>)?;
    registry.register(tags::set_param(ParamKind::Bool), "SetParam", decode_set_param::<bool>)?;
    registry.register(tags::set_param(ParamKind::Float), "SetParam", decode_set_param::<f32>)?;
    registry.register(tags::set_param(ParamKind::Vec2f), "SetParam", decode_set_param::<Vec2f>)?;
    registry.register(tags::set_param(ParamKind::Vec2i), "SetParam", decode_set_param::<Vec2i>)?;
    registry.register(tags::set_param(ParamKind::Vec3f), "SetParam", decode_set_param::<Vec3f>)?;
    registry.register(tags::set_param(ParamKind::Vec3i), "SetParam", decode_set_param::<Vec3i>)?;
    registry.register(tags::set_param(ParamKind::Vec4f), "SetParam", decode_set_param::<Vec4f>)?;
    registry.register(tags::set_param(ParamKind::Vec4i), "SetParam", decode_set_param::<Vec4i>)?;
    registry.register(tags::set_param(ParamKind::Box1f), "SetParam", decode_set_param::<Box1f>)?;
    registry.register(tags::set_param(ParamKind::Box2f), "SetParam", decode_set_param::<Box2f>)?;
    registry.register(tags::set_param(ParamKind::Box3f), "SetParam", decode_set_param::<Box3f>)?;
    registry.register(tags::set_param(ParamKind::Box4f), "SetParam", decode_set_param::<Box4f>)?;
    registry.register(tags::set_param(ParamKind::Linear3f), "SetParam", decode_set_param::<Linear3f>)?;
    registry.register(tags::set_param(ParamKind::Affine3f), "SetParam", decode_set_param::<Affine3f>)?;

    registry.register(tags::LOAD_MODULE, "LoadModule", decode_as::<LoadModule>)?;

    registry.register(tags::CREATE_FRAME_BUFFER, "CreateFrameBuffer", decode_as::<CreateFrameBuffer>)?;
    registry.register(tags::RESET_ACCUMULATION, "ResetAccumulation", decode_as::<ResetAccumulation>)?;
    registry.register(tags::RENDER_FRAME_ASYNC, "RenderFrameAsync", decode_as::<RenderFrameAsync>)?;
    registry.register(tags::PICK, "Pick", decode_as::<Pick>)?;

    registry.register(tags::SET_REGION, "SetRegion", decode_as::<SetRegion>)?;

    registry.register(tags::COMMAND_FINALIZE, "CommandFinalize", decode_as::<CommandFinalize>)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_shared::{DataType, FrameBufferChannels, FrameBufferFormat, Handle, ParamValue};

    fn roundtrip(work: impl Into<Work>) {
        let registry = WorkTypeRegistry::with_defaults().unwrap();
        let work = work.into();

        let mut out = WriteStream::new();
        work.encode_frame(&mut out);
        let mut input = ReadStream::new(out.as_slice());
        let decoded = registry.decode(&mut input).unwrap();

        assert!(input.is_exhausted(), "{} left bytes behind", work.name());
        assert_eq!(decoded, work);
        assert_eq!(registry.name(work.tag()), Some(work.name()));
    }

    #[test]
    fn test_every_variant_roundtrips() {
        let h = Handle::new(7, 3);
        roundtrip(SetLoadBalancer::new(true, 8, h));
        roundtrip(SetLoadBalancer::new(false, 0, Handle::NULL));
        roundtrip(NewObject::new(ObjectKind::Camera, "perspective", h).unwrap());
        roundtrip(NewMaterial::new("scivis", "obj", h));
        roundtrip(NewInstance::new(ObjectKind::VolumeInstance, Handle::new(1, 1), h).unwrap());
        roundtrip(NewData::from_handles(h, DataType::Geometry, 0, &[Handle::new(2, 1), Handle::NULL]).unwrap());
        roundtrip(NewData::new(h, DataType::Float3, 2, 0, vec![0; 24]).unwrap());
        roundtrip(NewData::new(h, DataType::UChar, 0, 1, Vec::new()).unwrap());
        roundtrip(CommitObject::new(h));
        roundtrip(RemoveParam::new(h, "spp"));
        roundtrip(CommandRelease::new(Handle::NULL));
        roundtrip(LoadModule::new("denoiser"));
        roundtrip(CreateFrameBuffer::new(
            h,
            Vec2i::new(640, 480),
            FrameBufferFormat::Srgba,
            FrameBufferChannels::COLOR | FrameBufferChannels::ACCUM,
        ));
        roundtrip(ResetAccumulation::new(h));
        roundtrip(RenderFrameAsync::new(h, h, Handle::NULL, Handle::NULL, Handle::new(9, 1)));
        roundtrip(Pick::new(h, h, h, h, Vec2f::new(0.5, 0.25)));
        roundtrip(SetRegion::new(h, vec![1, 2, 3, 4], Vec3i::new(0, 0, 0), Vec3i::new(2, 2, 1), DataType::UChar).unwrap());
        roundtrip(CommandFinalize);
    }

    #[test]
    fn test_set_param_roundtrips_every_kind() {
        let h = Handle::new(4, 2);
        let values = [
            ParamValue::Object(Handle::new(5, 1)),
            ParamValue::Object(Handle::NULL),
            ParamValue::String("x".repeat(4096)),
            ParamValue::String(String::new()),
            ParamValue::Int(i32::MIN),
            ParamValue::Bool(true),
            ParamValue::Float(-0.0),
            ParamValue::Vec2f(Vec2f::new(1.0, 2.0)),
            ParamValue::Vec2i(Vec2i::new(-1, 2)),
            ParamValue::Vec3f(Vec3f::new(1.0, 2.0, 3.0)),
            ParamValue::Vec3i(Vec3i::new(1, 2, 3)),
            ParamValue::Vec4f(Vec4f::new(1.0, 2.0, 3.0, 4.0)),
            ParamValue::Vec4i(Vec4i::new(1, 2, 3, 4)),
            ParamValue::Box1f(Box1f::new(0.0, 1.0)),
            ParamValue::Box2f(Box2f::default()),
            ParamValue::Box3f(Box3f::default()),
            ParamValue::Box4f(Box4f::default()),
            ParamValue::Linear3f(Linear3f::default()),
            ParamValue::Affine3f(Affine3f::IDENTITY),
        ];
        for value in values {
            let expected_tag = tags::set_param(value.kind());
            let item = SetParam::new(h, "name", value);
            assert_eq!(item.tag(), expected_tag);
            roundtrip(item);
        }
    }

    #[test]
    fn test_registry_covers_every_param_kind() {
        let registry = WorkTypeRegistry::with_defaults().unwrap();
        for kind in ParamKind::ALL {
            assert_eq!(registry.name(tags::set_param(kind)), Some("SetParam"));
        }
    }

    #[test]
    fn test_batched_frames_decode_in_order() {
        let registry = WorkTypeRegistry::with_defaults().unwrap();
        let h = Handle::new(1, 1);
        let items: Vec<Work> = vec![
            NewObject::new(ObjectKind::World, "", h).unwrap().into(),
            SetParam::new(h, "spp", ParamValue::Int(4)).into(),
            CommitObject::new(h).into(),
            CommandRelease::new(h).into(),
        ];

        let mut out = WriteStream::new();
        for item in &items {
            item.encode_frame(&mut out);
        }

        let mut input = ReadStream::new(out.as_slice());
        let mut decoded = Vec::new();
        while !input.is_exhausted() {
            decoded.push(registry.decode(&mut input).unwrap());
        }
        assert_eq!(decoded, items);
    }

    #[test]
    fn test_unknown_and_duplicate_tags() {
        let mut registry = WorkTypeRegistry::with_defaults().unwrap();
        assert!(matches!(
            registry.register(tags::PICK, "Again", decode_as::<Pick>),
            Err(ClusterError::DuplicateWorkTag(tags::PICK))
        ));

        let mut out = WriteStream::new();
        out.write_u32(0xDEAD);
        let mut input = ReadStream::new(out.as_slice());
        assert!(matches!(
            registry.decode(&mut input),
            Err(ClusterError::UnknownWorkTag(0xDEAD))
        ));
    }

    #[test]
    fn test_truncated_frame() {
        let registry = WorkTypeRegistry::with_defaults().unwrap();
        let mut out = WriteStream::new();
        Work::from(CommitObject::new(Handle::new(3, 1))).encode_frame(&mut out);
        let bytes = &out.as_slice()[..out.len() - 2];

        let mut input = ReadStream::new(bytes);
        assert!(matches!(registry.decode(&mut input), Err(ClusterError::Codec(_))));
    }

    #[test]
    fn test_new_object_rejects_non_constructible_kinds() {
        assert!(NewObject::new(ObjectKind::FrameBuffer, "", Handle::new(1, 1)).is_none());
        assert!(NewObject::new(ObjectKind::Material, "obj", Handle::new(1, 1)).is_none());
        assert!(NewInstance::new(ObjectKind::Geometry, Handle::new(1, 1), Handle::new(2, 1)).is_none());
    }
}
