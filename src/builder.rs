//! Cursor-based construction of [`DataInst`]s.

use crate::func_at::FuncAtMut;
use crate::{
    ConstDef, ConstKind, Context, DataInst, DataInstDef, DataInstKind, GlobalVar, IntBinOp,
    Intrinsic, Region, ScalarType, Type, TypeDef, Value, sysval,
};
use arrayvec::ArrayVec;
use smallvec::SmallVec;

/// Insertion point for a [`Builder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Before all the existing [`DataInst`]s of a [`Region`].
    StartOf(Region),

    /// After all the existing [`DataInst`]s of a [`Region`].
    EndOf(Region),

    /// Immediately after `inst`, which must be in `region`'s list.
    After { region: Region, inst: DataInst },
}

/// Helper for inserting new [`DataInst`]s at a [`Cursor`], which always gets
/// moved past each newly inserted [`DataInst`] (so that consecutive insertions
/// end up in the same order they were made in).
///
/// Only the [`EntityDefs`](crate::EntityDefs) of a function are borrowed (via
/// [`FuncAtMut`]), leaving e.g. its CFG free to be accessed separately.
pub struct Builder<'a> {
    cx: &'a Context,
    func: FuncAtMut<'a, ()>,
    cursor: Cursor,
}

impl<'a> Builder<'a> {
    pub fn new(cx: &'a Context, func: FuncAtMut<'a, ()>, cursor: Cursor) -> Self {
        Self { cx, func, cursor }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    /// Shorthand for `set_cursor(Cursor::After { region, inst })`.
    pub fn set_cursor_after(&mut self, region: Region, inst: DataInst) {
        self.set_cursor(Cursor::After { region, inst });
    }

    pub fn type_of(&mut self, v: Value) -> Type {
        self.func.reborrow().freeze().at(v).type_of(self.cx)
    }

    /// Define a new [`DataInst`] and link it in at the cursor.
    pub fn inst(&mut self, data_inst_def: DataInstDef) -> DataInst {
        let inst = self.func.data_insts.define(self.cx, data_inst_def.into());

        let data_insts = &mut *self.func.data_insts;
        self.cursor = match self.cursor {
            Cursor::StartOf(region) => {
                self.func.regions[region].insts.insert_first(inst, data_insts);
                Cursor::After { region, inst }
            }
            Cursor::EndOf(region) => {
                self.func.regions[region].insts.insert_last(inst, data_insts);
                Cursor::EndOf(region)
            }
            Cursor::After { region, inst: prev } => {
                self.func.regions[region].insts.insert_after(inst, prev, data_insts);
                Cursor::After { region, inst }
            }
        };
        inst
    }

    /// Like [`Builder::inst`], but for [`DataInst`]s with an output, which is
    /// returned as a [`Value`].
    pub fn emit(
        &mut self,
        kind: impl Into<DataInstKind>,
        inputs: impl IntoIterator<Item = Value>,
        output_type: Type,
    ) -> Value {
        Value::DataInstOutput(self.inst(DataInstDef {
            kind: kind.into(),
            inputs: inputs.into_iter().collect(),
            output_type: Some(output_type),
        }))
    }

    /// Integer arithmetic, with the output having the type of `lhs`.
    pub fn binary(&mut self, op: IntBinOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.type_of(lhs);
        self.emit(op, [lhs, rhs], ty)
    }

    pub fn iadd(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(IntBinOp::Add, lhs, rhs)
    }

    pub fn imul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(IntBinOp::Mul, lhs, rhs)
    }

    /// Constant `u32` scalar (for one component) or vector (for more).
    ///
    /// No [`DataInst`] is needed for constants, so the cursor isn't moved.
    pub fn imm(&mut self, components: &[u32]) -> Value {
        let cx = self.cx;
        assert!(
            (1..=4).contains(&components.len()),
            "imm: {} components, expected 1 to 4",
            components.len()
        );
        let ct = match *components {
            [x] => ConstDef { ty: cx.intern(ScalarType::U32), kind: ConstKind::Scalar(x) },
            _ => {
                let components: ArrayVec<u32, 4> = components.iter().copied().collect();
                ConstDef {
                    ty: cx.intern(TypeDef::Vector {
                        elem: ScalarType::U32,
                        count: components.len() as u8,
                    }),
                    kind: ConstKind::Vector(components),
                }
            }
        };
        Value::Const(cx.intern(ct))
    }

    pub fn imm_u32(&mut self, x: u32) -> Value {
        self.imm(&[x])
    }

    /// Extract the scalar at `component` out of the vector `v`.
    pub fn extract(&mut self, v: Value, component: u8) -> Value {
        let cx = self.cx;
        let (elem, count) = cx[self.type_of(v)].elem_and_count();
        assert!(component < count, "extract: component {component} out of bounds ({count})");
        let ty = cx.intern(elem);
        self.emit(DataInstKind::VectorExtract(component), [v], ty)
    }

    pub fn load_sysval(&mut self, primitive: sysval::Primitive) -> Value {
        let ty = primitive.ty(self.cx);
        self.emit(Intrinsic::LoadSysVal(primitive), [], ty)
    }

    pub fn load_var(&mut self, gv: GlobalVar, ty: Type) -> Value {
        self.emit(Intrinsic::LoadVar(gv), [], ty)
    }

    pub fn store_var(&mut self, gv: GlobalVar, v: Value) -> DataInst {
        self.inst(DataInstDef {
            kind: Intrinsic::StoreVar(gv).into(),
            inputs: SmallVec::from_slice(&[v]),
            output_type: None,
        })
    }
}
