//! System values: built-in per-invocation inputs, supplied by the execution
//! environment instead of being declared by the shader itself.
//!
//! There are two (overlapping) sets of them:
//! * [`SystemValue`]: locations a [`GlobalVar`](crate::GlobalVar) can be bound
//!   to (through [`AddrSpace::SystemValue`](crate::AddrSpace::SystemValue))
//! * [`Primitive`]: the ones a target supplies directly, which can be loaded
//!   with [`Intrinsic::LoadSysVal`](crate::Intrinsic::LoadSysVal) and need no
//!   further lowering (see [`passes::lower_sysvals`](crate::passes::lower_sysvals))

use crate::{Context, ScalarType, Type, TypeDef};

/// Location of a system value variable, with the discriminant being its raw
/// location code (as found in [`AddrSpace::SystemValue`](crate::AddrSpace::SystemValue)).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SystemValue {
    FrontFace = 0,
    VertexId = 1,
    VertexIdZeroBase = 2,
    BaseVertex = 3,
    InstanceId = 4,
    InstanceIndex = 5,
    BaseInstance = 6,
    DrawId = 7,
    InvocationId = 8,
    PrimitiveId = 9,
    SampleId = 10,
    SampleMaskIn = 11,
    HelperInvocation = 12,
    LocalInvocationId = 13,
    LocalInvocationIndex = 14,
    GlobalInvocationId = 15,
    WorkGroupId = 16,
    NumWorkGroups = 17,
}

impl SystemValue {
    pub const ALL: [Self; 18] = [
        Self::FrontFace,
        Self::VertexId,
        Self::VertexIdZeroBase,
        Self::BaseVertex,
        Self::InstanceId,
        Self::InstanceIndex,
        Self::BaseInstance,
        Self::DrawId,
        Self::InvocationId,
        Self::PrimitiveId,
        Self::SampleId,
        Self::SampleMaskIn,
        Self::HelperInvocation,
        Self::LocalInvocationId,
        Self::LocalInvocationIndex,
        Self::GlobalInvocationId,
        Self::WorkGroupId,
        Self::NumWorkGroups,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FrontFace => "front_face",
            Self::VertexId => "vertex_id",
            Self::VertexIdZeroBase => "vertex_id_zero_base",
            Self::BaseVertex => "base_vertex",
            Self::InstanceId => "instance_id",
            Self::InstanceIndex => "instance_index",
            Self::BaseInstance => "base_instance",
            Self::DrawId => "draw_id",
            Self::InvocationId => "invocation_id",
            Self::PrimitiveId => "primitive_id",
            Self::SampleId => "sample_id",
            Self::SampleMaskIn => "sample_mask_in",
            Self::HelperInvocation => "helper_invocation",
            Self::LocalInvocationId => "local_invocation_id",
            Self::LocalInvocationIndex => "local_invocation_index",
            Self::GlobalInvocationId => "global_invocation_id",
            Self::WorkGroupId => "work_group_id",
            Self::NumWorkGroups => "num_work_groups",
        }
    }
}

/// Error for raw location codes not corresponding to any [`SystemValue`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown system value location {0}")]
pub struct UnknownSystemValue(pub u32);

impl TryFrom<u32> for SystemValue {
    type Error = UnknownSystemValue;

    fn try_from(location: u32) -> Result<Self, Self::Error> {
        Self::ALL.get(location as usize).copied().ok_or(UnknownSystemValue(location))
    }
}

/// System value supplied directly by the target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    FrontFace,
    VertexId,
    VertexIdZeroBase,
    BaseVertex,
    InstanceId,
    BaseInstance,
    DrawId,
    InvocationId,
    PrimitiveId,
    SampleId,
    SampleMaskIn,
    HelperInvocation,
    LocalInvocationId,
    WorkGroupId,
    NumWorkGroups,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Self::FrontFace => "front_face",
            Self::VertexId => "vertex_id",
            Self::VertexIdZeroBase => "vertex_id_zero_base",
            Self::BaseVertex => "base_vertex",
            Self::InstanceId => "instance_id",
            Self::BaseInstance => "base_instance",
            Self::DrawId => "draw_id",
            Self::InvocationId => "invocation_id",
            Self::PrimitiveId => "primitive_id",
            Self::SampleId => "sample_id",
            Self::SampleMaskIn => "sample_mask_in",
            Self::HelperInvocation => "helper_invocation",
            Self::LocalInvocationId => "local_invocation_id",
            Self::WorkGroupId => "work_group_id",
            Self::NumWorkGroups => "num_work_groups",
        }
    }

    /// The type of the value produced by loading this system value.
    pub fn ty(self, cx: &Context) -> Type {
        match self {
            Self::LocalInvocationId | Self::WorkGroupId | Self::NumWorkGroups => {
                cx.intern(TypeDef::Vector { elem: ScalarType::U32, count: 3 })
            }
            Self::FrontFace | Self::HelperInvocation => cx.intern(ScalarType::Bool),
            Self::VertexId
            | Self::VertexIdZeroBase
            | Self::BaseVertex
            | Self::InstanceId
            | Self::BaseInstance
            | Self::DrawId
            | Self::InvocationId
            | Self::PrimitiveId
            | Self::SampleId
            | Self::SampleMaskIn => cx.intern(ScalarType::U32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_codes_round_trip() {
        for (code, sv) in SystemValue::ALL.into_iter().enumerate() {
            assert_eq!(sv as u32, code as u32);
            assert_eq!(SystemValue::try_from(code as u32), Ok(sv));
        }
        assert_eq!(SystemValue::try_from(18), Err(UnknownSystemValue(18)));
    }
}
