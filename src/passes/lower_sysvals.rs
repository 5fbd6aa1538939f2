//! System value lowering: every read of a [`GlobalVar`] in the
//! [`AddrSpace::SystemValue`] address space gets replaced by an expression
//! over the [`Primitive`] system values the target supplies directly.
//!
//! Only [`DataInst`]s are ever added or removed, so the CFG (and therefore
//! block numbering and dominance metadata) is left intact.

use crate::builder::{Builder, Cursor};
use crate::metadata::Metadata;
use crate::sysval::{Primitive, SystemValue};
use crate::transform::{InnerInPlaceTransform, ReplaceValueWith};
use crate::{
    AddrSpace, Context, DataInst, DataInstKind, DeclDef, EntityDefs, EntityOrientedDenseMap,
    FuncConfig, FuncDecl, FuncDefBody, GlobalVar, Intrinsic, Module, Region, Value,
};
use log::{debug, trace};
use rustc_hash::FxHashMap;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("system value {var:?} has unknown location {location}")]
    UnknownLocation { var: GlobalVar, location: u32 },

    #[error("system value {var:?} is written to, but system values are read-only")]
    StoreToSystemValue { var: GlobalVar },

    #[error("read of system value {var:?} has no result")]
    MissingResult { var: GlobalVar },
}

/// Lower all system value reads, in all the function definitions in `module`,
/// and empty `module.system_values` (as the registered [`GlobalVar`]s cannot
/// be used anymore, their declarations are also removed).
///
/// Returns `Ok(true)` if any read was found (and lowered), and on error,
/// leaves `module` untouched (as every function is checked before any changes).
pub fn lower_system_values(module: &mut Module) -> Result<bool, LowerError> {
    let cx = module.cx();

    let mut planned_reads = EntityOrientedDenseMap::new();
    for (func, func_decl) in module.funcs.iter() {
        if let DeclDef::Present(func_def_body) = &func_decl.def {
            planned_reads.insert(func, find_sysval_reads(&module.global_vars, func_def_body)?);
        }
    }

    let mut progress = false;
    for (func, func_decl) in module.funcs.iter_mut() {
        let FuncDecl { config, def, .. } = func_decl;
        if let (DeclDef::Present(func_def_body), Some(reads)) = (def, planned_reads.remove(func)) {
            debug!("lowering {} system value read(s) in {func:?}", reads.len());
            progress = lower_sysval_reads(&cx, config, func_def_body, reads) || progress;
        }
    }

    for gv in module.system_values.drain(..) {
        module.global_vars.remove(gv);
    }

    Ok(progress)
}

/// Lower all system value reads in one function (with its configuration
/// taken from `func_decl.config`), without touching any module-wide state.
///
/// Imported functions are skipped (returning `Ok(false)`).
pub fn lower_system_values_in_func(
    cx: &Context,
    global_vars: &EntityDefs<GlobalVar>,
    func_decl: &mut FuncDecl,
) -> Result<bool, LowerError> {
    let FuncDecl { config, def, .. } = func_decl;
    match def {
        DeclDef::Imported(_) => Ok(false),
        DeclDef::Present(func_def_body) => {
            let reads = find_sysval_reads(global_vars, func_def_body)?;
            Ok(lower_sysval_reads(cx, config, func_def_body, reads))
        }
    }
}

#[derive(Copy, Clone)]
struct SysValRead {
    region: Region,
    inst: DataInst,
    var: GlobalVar,
    location: SystemValue,
}

/// Collect (and validate) every system value access in `func_def_body`,
/// in block (definition) order, and instruction order within each block.
fn find_sysval_reads(
    global_vars: &EntityDefs<GlobalVar>,
    func_def_body: &FuncDefBody,
) -> Result<Vec<SysValRead>, LowerError> {
    let mut reads = vec![];
    for region in func_def_body.regions.keys() {
        for func_at_inst in func_def_body.at(region).at_insts() {
            let data_inst_def = func_at_inst.def();
            let (var, is_load) = match data_inst_def.kind {
                DataInstKind::Intrinsic(Intrinsic::LoadVar(gv)) => (gv, true),
                DataInstKind::Intrinsic(Intrinsic::StoreVar(gv)) => (gv, false),
                _ => continue,
            };
            let AddrSpace::SystemValue(location) = global_vars[var].addr_space else {
                continue;
            };

            if !is_load {
                return Err(LowerError::StoreToSystemValue { var });
            }
            if data_inst_def.output_type.is_none() {
                return Err(LowerError::MissingResult { var });
            }
            let location = SystemValue::try_from(location)
                .map_err(|unknown| LowerError::UnknownLocation { var, location: unknown.0 })?;

            reads.push(SysValRead { region, inst: func_at_inst.position, var, location });
        }
    }
    Ok(reads)
}

fn lower_sysval_reads(
    cx: &Context,
    config: &FuncConfig,
    func_def_body: &mut FuncDefBody,
    reads: Vec<SysValRead>,
) -> bool {
    let progress = !reads.is_empty();

    let mut replacements = FxHashMap::default();
    for SysValRead { region, inst, var, location } in reads {
        let expected_ty = func_def_body.at(inst).def().output_type;
        let mut builder = Builder::new(
            cx,
            func_def_body.at_mut(()),
            Cursor::After { region, inst },
        );
        let replacement = expand_sysval(&mut builder, config, location);
        debug_assert_eq!(
            Some(builder.type_of(replacement)),
            expected_ty,
            "{} expanded to a value of the wrong type",
            location.name()
        );
        trace!("{var:?} ({}): {inst:?} replaced with {replacement:?}", location.name());

        replacements.insert(inst, replacement);
        func_def_body.regions[region].insts.remove(inst, &mut func_def_body.data_insts);
        func_def_body.data_insts.swap_remove(inst);
    }

    if !replacements.is_empty() {
        func_def_body.inner_in_place_transform_with(&mut ReplaceValueWith(|v: Value| match v {
            Value::DataInstOutput(inst) => replacements.get(&inst).copied(),
            Value::Const(_) | Value::RegionInput { .. } => None,
        }));
    }

    func_def_body.preserve_metadata(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);

    progress
}

/// Build the value of the system value `location`, at the cursor of `b`.
pub fn expand_sysval(b: &mut Builder<'_>, config: &FuncConfig, location: SystemValue) -> Value {
    let primitive = match location {
        // gl_WorkGroupID * gl_WorkGroupSize + gl_LocalInvocationID
        SystemValue::GlobalInvocationId => {
            let group_id = b.load_sysval(Primitive::WorkGroupId);
            let local_id = b.load_sysval(Primitive::LocalInvocationId);
            let local_size = b.imm(&config.shader.local_size);
            let scaled_group_id = b.imul(group_id, local_size);
            return b.iadd(scaled_group_id, local_id);
        }

        // gl_LocalInvocationID.z * gl_WorkGroupSize.x * gl_WorkGroupSize.y
        //     + gl_LocalInvocationID.y * gl_WorkGroupSize.x
        //     + gl_LocalInvocationID.x
        SystemValue::LocalInvocationIndex => {
            let local_id = b.load_sysval(Primitive::LocalInvocationId);
            let [size_x, size_y, _] = config.shader.local_size;
            let size_x = b.imm_u32(size_x);
            let size_y = b.imm_u32(size_y);

            let z = b.extract(local_id, 2);
            let size_xy = b.imul(size_x, size_y);
            let index = b.imul(z, size_xy);

            let y = b.extract(local_id, 1);
            let y_offset = b.imul(y, size_x);
            let index = b.iadd(index, y_offset);

            let x = b.extract(local_id, 0);
            return b.iadd(index, x);
        }

        SystemValue::VertexId if config.target.vertex_id_zero_based => {
            let vertex_id = b.load_sysval(Primitive::VertexIdZeroBase);
            let base_vertex = b.load_sysval(Primitive::BaseVertex);
            return b.iadd(vertex_id, base_vertex);
        }

        SystemValue::InstanceIndex => {
            let instance_id = b.load_sysval(Primitive::InstanceId);
            let base_instance = b.load_sysval(Primitive::BaseInstance);
            return b.iadd(instance_id, base_instance);
        }

        // Everything else is loaded as-is.
        SystemValue::VertexId => Primitive::VertexId,
        SystemValue::FrontFace => Primitive::FrontFace,
        SystemValue::VertexIdZeroBase => Primitive::VertexIdZeroBase,
        SystemValue::BaseVertex => Primitive::BaseVertex,
        SystemValue::InstanceId => Primitive::InstanceId,
        SystemValue::BaseInstance => Primitive::BaseInstance,
        SystemValue::DrawId => Primitive::DrawId,
        SystemValue::InvocationId => Primitive::InvocationId,
        SystemValue::PrimitiveId => Primitive::PrimitiveId,
        SystemValue::SampleId => Primitive::SampleId,
        SystemValue::SampleMaskIn => Primitive::SampleMaskIn,
        SystemValue::HelperInvocation => Primitive::HelperInvocation,
        SystemValue::LocalInvocationId => Primitive::LocalInvocationId,
        SystemValue::WorkGroupId => Primitive::WorkGroupId,
        SystemValue::NumWorkGroups => Primitive::NumWorkGroups,
    };
    b.load_sysval(primitive)
}
