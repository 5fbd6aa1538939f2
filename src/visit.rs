//! Immutable IR traversal.

use crate::cf::SelectionKind;
use crate::cf::unstructured::{ControlInst, ControlInstKind};
use crate::func_at::FuncAt;
use crate::{
    AddrSpace, Const, DataInstDef, DataInstKind, DeclDef, EntityListIter,
    Func, FuncDecl, FuncDefBody, FuncParam, GlobalVar, GlobalVarDecl, Import, Intrinsic, Module,
    Region, RegionDef, RegionInputDecl, Type, Value,
};

// FIXME(eddyb) `Sized` bound shouldn't be needed but removing it requires
// writing `impl Visitor<'a> + ?Sized` in `fn inner_visit_with` signatures.
pub trait Visitor<'a>: Sized {
    // Context-interned leaves (no default provided).
    // FIXME(eddyb) treat these separately somehow and allow e.g. automatic deep
    // visiting (with a set to avoid repeat visits) if a `Rc<Context>` is provided.
    fn visit_type_use(&mut self, ty: Type);
    fn visit_const_use(&mut self, ct: Const);

    // Module-stored entity leaves (no default provided).
    fn visit_global_var_use(&mut self, gv: GlobalVar);
    fn visit_func_use(&mut self, func: Func);

    // Leaves (noop default behavior).
    fn visit_import(&mut self, _import: &Import) {}

    // Non-leaves (defaulting to calling `.inner_visit_with(self)`).
    fn visit_module(&mut self, module: &'a Module) {
        module.inner_visit_with(self);
    }
    fn visit_global_var_decl(&mut self, gv_decl: &'a GlobalVarDecl) {
        gv_decl.inner_visit_with(self);
    }
    fn visit_func_decl(&mut self, func_decl: &'a FuncDecl) {
        func_decl.inner_visit_with(self);
    }
    fn visit_region_def(&mut self, func_at_region: FuncAt<'a, Region>) {
        func_at_region.inner_visit_with(self);
    }
    fn visit_data_inst_def(&mut self, data_inst_def: &'a DataInstDef) {
        data_inst_def.inner_visit_with(self);
    }
    fn visit_control_inst(&mut self, control_inst: &'a ControlInst) {
        control_inst.inner_visit_with(self);
    }
    fn visit_value_use(&mut self, v: &'a Value) {
        v.inner_visit_with(self);
    }
}

/// Trait implemented on "deeply visitable" types, to further "explore" a type
/// by visiting its "interior" (i.e. variants and/or fields).
///
/// That is, an `impl InnerVisit for X` will call the relevant [`Visitor`] method
/// for each `X` field, effectively performing a single level of a deep visit.
/// Also, if `Visitor::visit_X` exists for a given `X`, its default should be to
/// call `X::inner_visit_with` (i.e. so that visiting is mostly-deep by default).
pub trait InnerVisit {
    // FIXME(eddyb) the naming here isn't great, can it be improved?
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>);
}

impl InnerVisit for Module {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        // FIXME(eddyb) this can't be exhaustive because of the private `cx` field.
        let Self { global_vars, funcs, system_values, .. } = self;

        for (_, gv_decl) in global_vars.iter() {
            visitor.visit_global_var_decl(gv_decl);
        }
        for (_, func_decl) in funcs.iter() {
            visitor.visit_func_decl(func_decl);
        }
        for &gv in system_values {
            visitor.visit_global_var_use(gv);
        }
    }
}

impl<D: InnerVisit> InnerVisit for DeclDef<D> {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        match self {
            Self::Imported(import) => visitor.visit_import(import),
            Self::Present(def) => def.inner_visit_with(visitor),
        }
    }
}

impl InnerVisit for GlobalVarDecl {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { name: _, ty, addr_space } = self;

        visitor.visit_type_use(*ty);
        match addr_space {
            AddrSpace::Private
            | AddrSpace::Input
            | AddrSpace::Output
            | AddrSpace::SystemValue(_) => {}
        }
    }
}

impl InnerVisit for FuncDecl {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { name: _, ret_types, params, config: _, def } = self;

        for &ty in ret_types {
            visitor.visit_type_use(ty);
        }
        for param in params {
            param.inner_visit_with(visitor);
        }
        def.inner_visit_with(visitor);
    }
}

impl InnerVisit for FuncParam {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { ty } = *self;

        visitor.visit_type_use(ty);
    }
}

impl InnerVisit for FuncDefBody {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        // NOTE(eddyb) unlike `rev_post_order`, this also reaches unreachable
        // regions (in the order they were defined).
        for region in self.regions.keys() {
            visitor.visit_region_def(self.at(region));

            if let Some(control_inst) = self.cfg.control_inst_on_exit_from.get(region) {
                visitor.visit_control_inst(control_inst);
            }
        }
    }
}

// FIXME(eddyb) this can't implement `InnerVisit` because of the `&'a self`
// requirement, whereas this has `'a` in `self: FuncAt<'a, Region>`.
impl<'a> FuncAt<'a, Region> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        let RegionDef { inputs, insts } = self.def();

        for input in inputs {
            input.inner_visit_with(visitor);
        }
        self.at(insts.iter()).inner_visit_with(visitor);
    }
}

impl InnerVisit for RegionInputDecl {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { ty } = *self;

        visitor.visit_type_use(ty);
    }
}

// FIXME(eddyb) this can't implement `InnerVisit` because of the `&'a self`
// requirement, whereas this has `'a` in `self: FuncAt<'a, ...>`.
impl<'a> FuncAt<'a, EntityListIter<crate::DataInst>> {
    pub fn inner_visit_with(self, visitor: &mut impl Visitor<'a>) {
        for func_at_inst in self {
            visitor.visit_data_inst_def(func_at_inst.def());
        }
    }
}

impl InnerVisit for DataInstDef {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { kind, inputs, output_type } = self;

        kind.inner_visit_with(visitor);
        for v in inputs {
            visitor.visit_value_use(v);
        }
        if let Some(ty) = *output_type {
            visitor.visit_type_use(ty);
        }
    }
}

impl InnerVisit for DataInstKind {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        match self {
            &DataInstKind::FuncCall(func) => visitor.visit_func_use(func),
            DataInstKind::Intrinsic(intrinsic) => match *intrinsic {
                Intrinsic::LoadVar(gv) | Intrinsic::StoreVar(gv) => {
                    visitor.visit_global_var_use(gv);
                }
                Intrinsic::LoadSysVal(_) => {}
            },
            DataInstKind::IntBinOp(_) | DataInstKind::VectorExtract(_) => {}
        }
    }
}

impl InnerVisit for ControlInst {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        let Self { kind, inputs, targets: _, target_inputs } = self;

        match kind {
            ControlInstKind::Unreachable
            | ControlInstKind::Return
            | ControlInstKind::Branch
            | ControlInstKind::SelectBranch(
                SelectionKind::BoolCond | SelectionKind::SwitchU32 { case_consts: _ },
            ) => {}
        }
        for v in inputs {
            visitor.visit_value_use(v);
        }
        for inputs in target_inputs.values() {
            for v in inputs {
                visitor.visit_value_use(v);
            }
        }
    }
}

impl InnerVisit for Value {
    fn inner_visit_with<'a>(&'a self, visitor: &mut impl Visitor<'a>) {
        match *self {
            Self::Const(ct) => visitor.visit_const_use(ct),
            Self::RegionInput { region: _, input_idx: _ } | Self::DataInstOutput(_) => {}
        }
    }
}
