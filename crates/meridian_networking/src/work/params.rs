//! Object mutation and release commands.
//!
//! These carry the master's partial-mirror rules: on the master a target
//! that is absent, or of a kind the master does not mirror for the
//! operation, is skipped rather than reported.

use std::sync::Arc;

use meridian_core::{ManagedObject, MasterOp, Param};
use meridian_shared::{CodecResult, Decode, Encode, Handle, ParamType, ParamValue, ReadStream, WriteStream};

use super::{tags, WorkItem, WorkTag};
use crate::context::ClusterContext;
use crate::error::ClusterResult;

/// Resolves the master's target for `op`, or `None` when it does not apply.
fn master_target<'a>(ctx: &'a ClusterContext, handle: Handle, op: MasterOp) -> Option<&'a Arc<dyn ManagedObject>> {
    let target = ctx.objects.get(handle);
    let applies = target.is_some_and(|object| object.kind().mirrors_on_master(op));
    if !applies {
        tracing::debug!(%handle, ?op, kind = ?target.map(|object| object.kind()), "skipped on master");
        return None;
    }
    target
}

/// Commits pending changes on an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitObject {
    /// The object.
    pub handle: Handle,
}

impl CommitObject {
    /// Creates the command.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Encode for CommitObject {
    fn encode(&self, stream: &mut WriteStream) {
        self.handle.encode(stream);
    }
}

impl Decode for CommitObject {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.get().map(Self::new)
    }
}

impl WorkItem for CommitObject {
    fn tag(&self) -> WorkTag {
        tags::COMMIT_OBJECT
    }

    fn name(&self) -> &'static str {
        "CommitObject"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        ctx.lookup(self.handle)?.commit();
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if let Some(target) = master_target(ctx, self.handle, MasterOp::Commit) {
            target.commit();
        }
        Ok(())
    }
}

/// Sets one named parameter.
///
/// Each value kind travels under its own tag. Object references are
/// resolved to the receiving rank's instance before reaching the target.
#[derive(Clone, Debug, PartialEq)]
pub struct SetParam {
    /// Target object.
    pub handle: Handle,
    /// Parameter name.
    pub name: String,
    /// New value.
    pub value: ParamValue,
}

impl SetParam {
    /// Creates the command.
    #[must_use]
    pub fn new(handle: Handle, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            handle,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Decodes a payload whose value kind is `T`.
    ///
    /// # Errors
    ///
    /// `Codec` for a malformed payload.
    pub fn decode_typed<T: ParamType>(stream: &mut ReadStream<'_>) -> ClusterResult<Self> {
        let handle = stream.get()?;
        let name = stream.read_string()?;
        let value = T::decode(stream)?.into();
        Ok(Self { handle, name, value })
    }

    /// Converts the wire value into the stored form.
    ///
    /// Full mirrors must resolve every non-null reference; the master maps
    /// references it does not hold to `None`.
    fn resolve(&self, ctx: &ClusterContext, strict: bool) -> ClusterResult<Param> {
        Ok(match &self.value {
            ParamValue::Object(handle) if strict => Param::Object(ctx.lookup_optional(*handle)?.cloned()),
            ParamValue::Object(handle) => Param::Object(ctx.objects.get(*handle).cloned()),
            value => Param::Value(value.clone()),
        })
    }
}

impl Encode for SetParam {
    fn encode(&self, stream: &mut WriteStream) {
        stream.put(&self.handle).put(&self.name);
        self.value.encode_payload(stream);
    }
}

impl WorkItem for SetParam {
    fn tag(&self) -> WorkTag {
        tags::set_param(self.value.kind())
    }

    fn name(&self) -> &'static str {
        "SetParam"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        let param = self.resolve(ctx, true)?;
        ctx.lookup(self.handle)?.set_param(&self.name, param);
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if let Some(target) = master_target(ctx, self.handle, MasterOp::SetParam) {
            target.set_param(&self.name, self.resolve(ctx, false)?);
        }
        Ok(())
    }
}

/// Removes one named parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveParam {
    /// Target object.
    pub handle: Handle,
    /// Parameter name.
    pub name: String,
}

impl RemoveParam {
    /// Creates the command.
    #[must_use]
    pub fn new(handle: Handle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }
}

impl Encode for RemoveParam {
    fn encode(&self, stream: &mut WriteStream) {
        stream.put(&self.handle).put(&self.name);
    }
}

impl Decode for RemoveParam {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        Ok(Self {
            handle: stream.get()?,
            name: stream.read_string()?,
        })
    }
}

impl WorkItem for RemoveParam {
    fn tag(&self) -> WorkTag {
        tags::REMOVE_PARAM
    }

    fn name(&self) -> &'static str {
        "RemoveParam"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        ctx.lookup(self.handle)?.remove_param(&self.name);
        Ok(())
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if let Some(target) = master_target(ctx, self.handle, MasterOp::RemoveParam) {
            target.remove_param(&self.name);
        }
        Ok(())
    }
}

/// Releases a handle and this rank's reference to its object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandRelease {
    /// The handle to release.
    pub handle: Handle,
}

impl CommandRelease {
    /// Creates the command.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Encode for CommandRelease {
    fn encode(&self, stream: &mut WriteStream) {
        self.handle.encode(stream);
    }
}

impl Decode for CommandRelease {
    fn decode(stream: &mut ReadStream<'_>) -> CodecResult<Self> {
        stream.get().map(Self::new)
    }
}

impl WorkItem for CommandRelease {
    fn tag(&self) -> WorkTag {
        tags::COMMAND_RELEASE
    }

    fn name(&self) -> &'static str {
        "CommandRelease"
    }

    fn run(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        ctx.release(self.handle).map(drop)
    }

    fn run_on_master(&mut self, ctx: &mut ClusterContext) -> ClusterResult<()> {
        if ctx.objects.is_defined(self.handle) {
            return self.run(ctx);
        }
        tracing::debug!(handle = %self.handle, "release skipped on master: never assigned");
        Ok(())
    }
}
