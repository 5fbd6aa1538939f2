//! Mutable IR traversal.

use crate::cf::SelectionKind;
use crate::cf::unstructured::{ControlInst, ControlInstKind};
use crate::func_at::FuncAtMut;
use crate::{
    Const, DataInst, DataInstDef, DataInstKind, EntityListIter, Func, FuncDefBody, GlobalVar,
    Intrinsic, Region, RegionDef, RegionInputDecl, Type, Value,
};
use smallvec::SmallVec;

/// The result of a transformation (which is not in-place).
#[must_use]
#[derive(Copy, Clone)]
pub enum Transformed<T> {
    /// The original `T` value remains as it was, at no cost.
    Unchanged,

    /// Some part of the original `T` value was transformed, and a new `T` value
    /// had to be constructed. This change will propagate in any "outer" value.
    Changed(T),
}

impl<T> Transformed<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        match self {
            Transformed::Unchanged => Transformed::Unchanged,
            Transformed::Changed(new) => Transformed::Changed(f(new)),
        }
    }

    pub fn apply_to(self, dest: &mut T) {
        match self {
            Transformed::Unchanged => {}
            Transformed::Changed(new) => *dest = new,
        }
    }
}

/// Helper type for [`transform!`] - not public as it's easy to misuse.
enum TransformedWithOriginal<'a, T> {
    Original(&'a T),
    Changed(T),
}

impl<T> Transformed<T> {
    fn with_original(self, original: &T) -> TransformedWithOriginal<'_, T> {
        match self {
            Transformed::Unchanged => TransformedWithOriginal::Original(original),
            Transformed::Changed(new) => TransformedWithOriginal::Changed(new),
        }
    }
}

impl<T: Clone> TransformedWithOriginal<'_, T> {
    fn is_changed(&self) -> bool {
        matches!(self, TransformedWithOriginal::Changed(_))
    }
    fn changed_or_original_cloned(self) -> T {
        match self {
            TransformedWithOriginal::Original(original) => original.clone(),
            TransformedWithOriginal::Changed(new) => new,
        }
    }
}

// HACK(eddyb) `transform!` needs auto-ref-like behavior for inputs.
trait AutoRef {
    fn auto_ref(&self) -> &Self {
        self
    }
}

impl<T> AutoRef for T {}

/// Helper macro to create a combined [`Transformed`] out of several variables,
/// each with their own transformation, where any [`Transformed::Changed`] input
/// will result in a [`Transformed::Changed`] output, using a combination of the
/// changed inputs, and clones of the unchanged inputs.
macro_rules! transform {
    ({ $($input:ident -> $input_transformed:expr),+ $(,)? } => $output:expr) => {{
        let ($($input,)+) = ($($input_transformed.with_original($input.auto_ref()),)+);
        if $($input.is_changed())||+ {
            let ($($input,)*) = ($($input.changed_or_original_cloned(),)+);
            Transformed::Changed($output)
        } else {
            Transformed::Unchanged
        }
    }};
}

// FIXME(eddyb) `Sized` bound shouldn't be needed but removing it requires
// writing `impl Transformer + ?Sized` in `fn inner_transform_with` signatures.
pub trait Transformer: Sized {
    // Context-interned leaves (noop default behavior).
    fn transform_type_use(&mut self, _ty: Type) -> Transformed<Type> {
        Transformed::Unchanged
    }
    fn transform_const_use(&mut self, _ct: Const) -> Transformed<Const> {
        Transformed::Unchanged
    }

    // Module-stored entity leaves (noop default behavior).
    fn transform_global_var_use(&mut self, _gv: GlobalVar) -> Transformed<GlobalVar> {
        Transformed::Unchanged
    }
    fn transform_func_use(&mut self, _func: Func) -> Transformed<Func> {
        Transformed::Unchanged
    }

    // Non-leaves (defaulting to calling `.inner_transform_with(self)`).
    fn transform_value_use(&mut self, v: &Value) -> Transformed<Value> {
        v.inner_transform_with(self)
    }

    // Non-leaves transformed in-place (defaulting to calling
    // `.inner_in_place_transform_with(self)`).
    fn in_place_transform_func_def_body(&mut self, func_def_body: &mut FuncDefBody) {
        func_def_body.inner_in_place_transform_with(self);
    }
    fn in_place_transform_data_inst_def(&mut self, mut func_at_data_inst: FuncAtMut<'_, DataInst>) {
        func_at_data_inst.inner_in_place_transform_with(self);
    }
    fn in_place_transform_control_inst(&mut self, control_inst: &mut ControlInst) {
        control_inst.inner_in_place_transform_with(self);
    }
}

/// Trait implemented on "transformable" types, to further "elaborate" a type by
/// transforming its "interior" (i.e. variants and/or fields).
///
/// That is, an `impl InnerTransform for X` will call the relevant [`Transformer`]
/// method for each `X` field, effectively performing a single level of a deep
/// transform.
/// Also, if `Transformer::transform_X` exists for a given `X`, its default should
/// be to call `X::inner_transform_with` (i.e. so that transforming is mostly-deep
/// by default).
pub trait InnerTransform: Sized {
    // FIXME(eddyb) the naming here isn't great, can it be improved?
    fn inner_transform_with(&self, transformer: &mut impl Transformer) -> Transformed<Self>;
}

/// Like [`InnerTransform`], but only for the `in_place_transform_X` cases.
pub trait InnerInPlaceTransform {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer);
}

impl InnerInPlaceTransform for FuncDefBody {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        // NOTE(eddyb) this goes through all regions in definition order, not
        // just the ones reachable in the CFG, so that no use is left behind.
        // HACK(eddyb) have to collect these before borrowing any `self` fields.
        let regions: SmallVec<[Region; 8]> = self.regions.keys().collect();

        for region in regions {
            self.at_mut(region).inner_in_place_transform_with(transformer);

            if let Some(control_inst) = self.cfg.control_inst_on_exit_from.get_mut(region) {
                transformer.in_place_transform_control_inst(control_inst);
            }
        }
    }
}

impl InnerInPlaceTransform for FuncAtMut<'_, Region> {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        // HACK(eddyb) handle the fields of `Region` separately, to
        // allow reborrowing `FuncAtMut` (for recursing into `DataInst`s).
        let RegionDef { inputs, insts: _ } = self.reborrow().def();
        for input in inputs {
            input.inner_transform_with(transformer).apply_to(input);
        }

        self.reborrow().at_insts().into_iter().inner_in_place_transform_with(transformer);
    }
}

impl InnerTransform for RegionInputDecl {
    fn inner_transform_with(&self, transformer: &mut impl Transformer) -> Transformed<Self> {
        let Self { ty } = self;

        transform!({
            ty -> transformer.transform_type_use(*ty),
        } => Self {
            ty,
        })
    }
}

impl InnerInPlaceTransform for FuncAtMut<'_, EntityListIter<DataInst>> {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        let mut iter = self.reborrow();
        while let Some(func_at_inst) = iter.next() {
            transformer.in_place_transform_data_inst_def(func_at_inst);
        }
    }
}

impl InnerInPlaceTransform for FuncAtMut<'_, DataInst> {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        let DataInstDef { kind, inputs, output_type } = self.reborrow().def();

        kind.inner_in_place_transform_with(transformer);
        for v in inputs {
            transformer.transform_value_use(v).apply_to(v);
        }
        if let Some(output_type) = output_type {
            transformer.transform_type_use(*output_type).apply_to(output_type);
        }
    }
}

impl InnerInPlaceTransform for DataInstKind {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
        match self {
            DataInstKind::FuncCall(func) => transformer.transform_func_use(*func).apply_to(func),
            DataInstKind::Intrinsic(intrinsic) => match intrinsic {
                Intrinsic::LoadVar(gv) | Intrinsic::StoreVar(gv) => {
                    transformer.transform_global_var_use(*gv).apply_to(gv);
                }
                Intrinsic::LoadSysVal(_) => {}
            },
            DataInstKind::IntBinOp(_) | DataInstKind::VectorExtract(_) => {}
        }
    }
}

impl InnerInPlaceTransform for ControlInst {
    fn inner_in_place_transform_with(&mut self, transformer: &mut impl Transformer) {
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
            transformer.transform_value_use(v).apply_to(v);
        }
        for inputs in target_inputs.values_mut() {
            for v in inputs {
                transformer.transform_value_use(v).apply_to(v);
            }
        }
    }
}

impl InnerTransform for Value {
    fn inner_transform_with(&self, transformer: &mut impl Transformer) -> Transformed<Self> {
        match self {
            Self::Const(ct) => transform!({
                ct -> transformer.transform_const_use(*ct),
            } => Self::Const(ct)),

            Self::RegionInput { region: _, input_idx: _ } | Self::DataInstOutput(_) => {
                Transformed::Unchanged
            }
        }
    }
}

/// [`Transformer`] replacing every [`Value`] use for which the closure
/// returns `Some(new_value)` (leaving all other uses unchanged).
pub struct ReplaceValueWith<F>(pub F);

impl<F: FnMut(Value) -> Option<Value>> Transformer for ReplaceValueWith<F> {
    fn transform_value_use(&mut self, v: &Value) -> Transformed<Value> {
        (self.0)(*v).map_or(Transformed::Unchanged, Transformed::Changed)
    }
}
