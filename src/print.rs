//! Plain-text printing of [`Module`]s and their functions.
//!
//! Entity handles are never printed directly: [`GlobalVar`]s, [`Func`]s,
//! [`Region`]s and [`Value`]s all get renumbered locally (in definition order),
//! so structurally identical IR always prints identically, regardless of
//! how many other entities were allocated in the same [`Context`].

// FIXME(eddyb) stop using `itertools` for methods like `intersperse` when they
// get stabilized on `Iterator` instead.
#![allow(unstable_name_collisions)]
use itertools::Itertools as _;

use crate::cf::SelectionKind;
use crate::cf::unstructured::{ControlInst, ControlInstKind};
use crate::{
    AddrSpace, ConstKind, Context, DataInstDef, DataInstKind, DeclDef, Func, FuncDecl,
    FuncDefBody, GlobalVar, Import, IntBinOp, Intrinsic, Module, ScalarType, Type, TypeDef, Value,
    sysval,
};
use rustc_hash::FxHashMap;
use std::fmt;

/// [`fmt::Display`] for a whole [`Module`] (see [`Module::print`]).
pub struct ModulePrinter<'a> {
    module: &'a Module,
    names: ModuleNames,
}

/// [`fmt::Display`] for a single [`Func`] (see [`Module::print_func`]).
pub struct FuncPrinter<'a> {
    module: &'a Module,
    names: ModuleNames,
    func: Func,
}

/// Local numbering of all the module-level entities.
struct ModuleNames {
    global_vars: FxHashMap<GlobalVar, usize>,
    funcs: FxHashMap<Func, usize>,
}

impl ModuleNames {
    fn new(module: &Module) -> Self {
        Self {
            global_vars: module.global_vars.keys().enumerate().map(|(i, gv)| (gv, i)).collect(),
            funcs: module.funcs.keys().enumerate().map(|(i, func)| (func, i)).collect(),
        }
    }

    fn global_var(&self, gv: GlobalVar) -> String {
        match self.global_vars.get(&gv) {
            Some(i) => format!("gv{i}"),
            None => "<undefined global_var>".into(),
        }
    }

    fn func(&self, func: Func) -> String {
        match self.funcs.get(&func) {
            Some(i) => format!("func{i}"),
            None => "<undefined func>".into(),
        }
    }
}

impl Module {
    pub fn print(&self) -> ModulePrinter<'_> {
        ModulePrinter { module: self, names: ModuleNames::new(self) }
    }

    pub fn print_func(&self, func: Func) -> FuncPrinter<'_> {
        FuncPrinter { module: self, names: ModuleNames::new(self), func }
    }
}

impl fmt::Display for ModulePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { module, names } = self;
        let cx = module.cx_ref();

        for (gv, gv_decl) in module.global_vars.iter() {
            write!(f, "{} = global_var", names.global_var(gv))?;
            if let Some(name) = gv_decl.name {
                write!(f, " {:?}", &cx[name])?;
            }
            let addr_space: String = match gv_decl.addr_space {
                AddrSpace::Private => "private".into(),
                AddrSpace::Input => "input".into(),
                AddrSpace::Output => "output".into(),
                AddrSpace::SystemValue(location) => {
                    match sysval::SystemValue::try_from(location) {
                        Ok(sv) => format!("system_value({})", sv.name()),
                        Err(_) => format!("system_value({location})"),
                    }
                }
            };
            writeln!(f, " in {addr_space}: {}", TypePrinter(cx, gv_decl.ty))?;
        }
        if !module.system_values.is_empty() {
            writeln!(
                f,
                "system_values = [{}]",
                module.system_values.iter().map(|&gv| names.global_var(gv)).join(", ")
            )?;
        }

        for func in module.funcs.keys() {
            writeln!(f)?;
            print_func_decl(f, module, names, func)?;
        }
        Ok(())
    }
}

impl fmt::Display for FuncPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_func_decl(f, self.module, &self.names, self.func)
    }
}

struct TypePrinter<'a>(&'a Context, Type);

impl fmt::Display for TypePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scalar_name = |scalar: ScalarType| match scalar {
            ScalarType::Bool => "bool",
            ScalarType::U32 => "u32",
        };
        match self.0[self.1] {
            TypeDef::Scalar(scalar) => f.write_str(scalar_name(scalar)),
            TypeDef::Vector { elem, count } => write!(f, "{}x{count}", scalar_name(elem)),
        }
    }
}

fn print_func_decl(
    f: &mut fmt::Formatter<'_>,
    module: &Module,
    names: &ModuleNames,
    func: Func,
) -> fmt::Result {
    let cx = module.cx_ref();
    let FuncDecl { name, ret_types, params, config, def } = &module.funcs[func];

    write!(f, "{}", names.func(func))?;
    if let Some(name) = *name {
        write!(f, " {:?}", &cx[name])?;
    }
    write!(
        f,
        "({}) -> ({})",
        params.iter().map(|param| TypePrinter(cx, param.ty)).join(", "),
        ret_types.iter().map(|&ty| TypePrinter(cx, ty)).join(", ")
    )?;
    let [x, y, z] = config.shader.local_size;
    write!(f, " [local_size = ({x}, {y}, {z})")?;
    if config.target.vertex_id_zero_based {
        write!(f, ", vertex_id_zero_based")?;
    }
    write!(f, "]")?;

    match def {
        DeclDef::Imported(Import::LinkName(link_name)) => {
            writeln!(f, " = import {:?}", &cx[*link_name])
        }
        DeclDef::Present(func_def_body) => {
            writeln!(f, " {{")?;
            BodyPrinter::new(cx, names, func_def_body).print(f)?;
            writeln!(f, "}}")
        }
    }
}

struct BodyPrinter<'a> {
    cx: &'a Context,
    names: &'a ModuleNames,
    func_def_body: &'a FuncDefBody,

    blocks: FxHashMap<crate::Region, usize>,
    values: FxHashMap<Value, usize>,
}

impl<'a> BodyPrinter<'a> {
    fn new(cx: &'a Context, names: &'a ModuleNames, func_def_body: &'a FuncDefBody) -> Self {
        let mut blocks = FxHashMap::default();
        let mut values = FxHashMap::default();
        for region in func_def_body.regions.keys() {
            blocks.insert(region, blocks.len());

            let func_at_region = func_def_body.at(region);
            for input_idx in 0..func_at_region.def().inputs.len() {
                let input_idx = input_idx as u32;
                values.insert(Value::RegionInput { region, input_idx }, values.len());
            }
            for func_at_inst in func_at_region.at_insts() {
                if func_at_inst.def().output_type.is_some() {
                    values.insert(Value::DataInstOutput(func_at_inst.position), values.len());
                }
            }
        }
        Self { cx, names, func_def_body, blocks, values }
    }

    fn block(&self, region: crate::Region) -> String {
        match self.blocks.get(&region) {
            Some(i) => format!("block{i}"),
            None => "<undefined block>".into(),
        }
    }

    fn value(&self, v: Value) -> String {
        let ct = match v {
            Value::Const(ct) => ct,
            Value::RegionInput { .. } | Value::DataInstOutput(_) => {
                return match self.values.get(&v) {
                    Some(i) => format!("v{i}"),
                    None => "<undefined value>".into(),
                };
            }
        };
        let ct_def = &self.cx[ct];
        let ty = TypePrinter(self.cx, ct_def.ty);
        match &ct_def.kind {
            ConstKind::Undef => format!("undef: {ty}"),
            &ConstKind::Scalar(x) => match self.cx[ct_def.ty] {
                TypeDef::Scalar(ScalarType::Bool) => (x != 0).to_string(),
                _ => format!("{x}: {ty}"),
            },
            ConstKind::Vector(xs) => format!("({}): {ty}", xs.iter().join(", ")),
        }
    }

    fn values(&self, vs: &[Value]) -> String {
        vs.iter().map(|&v| self.value(v)).join(", ")
    }

    fn print(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cx = self.cx;
        for region in self.func_def_body.regions.keys() {
            let func_at_region = self.func_def_body.at(region);

            write!(f, "  {}", self.block(region))?;
            let inputs = &func_at_region.def().inputs;
            if !inputs.is_empty() {
                let inputs = inputs.iter().enumerate().map(|(input_idx, input)| {
                    let v = Value::RegionInput { region, input_idx: input_idx as u32 };
                    format!("{}: {}", self.value(v), TypePrinter(cx, input.ty))
                });
                write!(f, "({})", inputs.format(", "))?;
            }
            writeln!(f, ":")?;

            for func_at_inst in func_at_region.at_insts() {
                let DataInstDef { kind, inputs, output_type } = func_at_inst.def();
                write!(f, "    ")?;
                if let Some(ty) = *output_type {
                    let output = self.value(Value::DataInstOutput(func_at_inst.position));
                    write!(f, "{output}: {} = ", TypePrinter(cx, ty))?;
                }
                match kind {
                    &DataInstKind::FuncCall(callee) => {
                        write!(f, "call {}", self.names.func(callee))
                    }
                    &DataInstKind::Intrinsic(Intrinsic::LoadVar(gv)) => {
                        write!(f, "load_var {}", self.names.global_var(gv))
                    }
                    &DataInstKind::Intrinsic(Intrinsic::StoreVar(gv)) => {
                        write!(f, "store_var {}", self.names.global_var(gv))
                    }
                    DataInstKind::Intrinsic(Intrinsic::LoadSysVal(primitive)) => {
                        write!(f, "load_sysval {}", primitive.name())
                    }
                    DataInstKind::IntBinOp(IntBinOp::Add) => write!(f, "iadd"),
                    DataInstKind::IntBinOp(IntBinOp::Mul) => write!(f, "imul"),
                    DataInstKind::VectorExtract(component) => write!(f, "extract.{component}"),
                }?;
                if !inputs.is_empty() {
                    write!(f, " {}", self.values(inputs))?;
                }
                writeln!(f)?;
            }

            match self.func_def_body.cfg.control_inst_on_exit_from.get(region) {
                Some(control_inst) => self.print_control_inst(f, control_inst)?,
                None => writeln!(f, "    <missing terminator>")?,
            }
        }
        Ok(())
    }

    fn print_control_inst(
        &self,
        f: &mut fmt::Formatter<'_>,
        control_inst: &ControlInst,
    ) -> fmt::Result {
        let ControlInst { kind, inputs, targets, target_inputs } = control_inst;

        write!(f, "    ")?;
        match kind {
            ControlInstKind::Unreachable => write!(f, "unreachable")?,
            ControlInstKind::Return => write!(f, "return")?,
            ControlInstKind::Branch => write!(f, "branch")?,
            ControlInstKind::SelectBranch(SelectionKind::BoolCond) => write!(f, "if")?,
            ControlInstKind::SelectBranch(SelectionKind::SwitchU32 { case_consts }) => {
                write!(f, "switch[{}]", case_consts.iter().join(", "))?;
            }
        }
        if !inputs.is_empty() {
            write!(f, " {}", self.values(inputs))?;
        }
        if !targets.is_empty() {
            let targets = targets.iter().map(|&target| match target_inputs.get(&target) {
                Some(args) if !args.is_empty() => {
                    format!("{}({})", self.block(target), self.values(args))
                }
                _ => self.block(target),
            });
            write!(f, " -> {}", targets.format(", "))?;
        }
        writeln!(f)
    }
}
