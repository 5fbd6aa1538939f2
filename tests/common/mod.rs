// NOTE(eddyb) not every test file uses every helper.
#![allow(dead_code)]

use smallvec::SmallVec;
use std::collections::HashMap;
use std::rc::Rc;
use sysval_lower::builder::{Builder, Cursor};
use sysval_lower::cf::SelectionKind;
use sysval_lower::cf::unstructured::{ControlInst, ControlInstKind};
use sysval_lower::sysval::{Primitive, SystemValue};
use sysval_lower::{
    ConstKind, Context, DataInstKind, DeclDef, EntityList, Func, FuncConfig, FuncDecl,
    FuncDefBody, GlobalVar, IntBinOp, Intrinsic, Module, Region, RegionDef, RegionInputDecl,
    ScalarType, Type, TypeDef, Value,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn new_module() -> Module {
    init_logging();
    Module::new(Rc::new(Context::new()))
}

pub fn u32_type(cx: &Context) -> Type {
    cx.intern(ScalarType::U32)
}

pub fn u32x3_type(cx: &Context) -> Type {
    cx.intern(TypeDef::Vector { elem: ScalarType::U32, count: 3 })
}

pub fn config(local_size: [u32; 3], vertex_id_zero_based: bool) -> FuncConfig {
    let mut config = FuncConfig::default();
    config.shader.local_size = local_size;
    config.target.vertex_id_zero_based = vertex_id_zero_based;
    config
}

/// The type a variable bound to `location` is declared with.
pub fn sysval_type(cx: &Context, location: SystemValue) -> Type {
    match location {
        SystemValue::LocalInvocationId
        | SystemValue::GlobalInvocationId
        | SystemValue::WorkGroupId
        | SystemValue::NumWorkGroups => u32x3_type(cx),
        SystemValue::FrontFace | SystemValue::HelperInvocation => cx.intern(ScalarType::Bool),
        _ => u32_type(cx),
    }
}

pub fn declare_sysval(module: &mut Module, location: SystemValue) -> GlobalVar {
    let cx = module.cx();
    let name = cx.intern(location.name());
    module.declare_system_value(Some(name), sysval_type(&cx, location), location)
}

/// Add a new (empty, and without a terminator) block to `func_def_body`.
pub fn add_block(cx: &Context, func_def_body: &mut FuncDefBody, input_types: &[Type]) -> Region {
    func_def_body.regions.define(
        cx,
        RegionDef {
            inputs: input_types.iter().map(|&ty| RegionInputDecl { ty }).collect(),
            insts: EntityList::empty(),
        },
    )
}

pub fn terminate(
    func_def_body: &mut FuncDefBody,
    region: Region,
    kind: ControlInstKind,
    inputs: &[Value],
    targets: &[(Region, Vec<Value>)],
) {
    let control_inst = ControlInst {
        kind,
        inputs: inputs.iter().copied().collect(),
        targets: targets.iter().map(|(target, _)| *target).collect(),
        target_inputs: targets
            .iter()
            .filter(|(_, args)| !args.is_empty())
            .map(|(target, args)| (*target, args.iter().copied().collect()))
            .collect(),
    };
    func_def_body.cfg.control_inst_on_exit_from.insert(region, control_inst);
}

/// Define a single-block function, with its body built by `build` (which
/// returns the values to return from the function).
pub fn define_simple_func(
    module: &mut Module,
    config: FuncConfig,
    build: impl FnOnce(&mut Builder<'_>) -> Vec<Value>,
) -> Func {
    let cx = module.cx();
    let mut func_def_body = FuncDefBody::new(&cx, []);
    let entry = func_def_body.body;

    let ret_values = build(&mut Builder::new(&cx, func_def_body.at_mut(()), Cursor::EndOf(entry)));
    terminate(&mut func_def_body, entry, ControlInstKind::Return, &ret_values, &[]);

    let ret_types = ret_values.iter().map(|&v| func_def_body.at(v).type_of(&cx)).collect();
    module.funcs.define(
        &cx,
        FuncDecl {
            name: Some(cx.intern("main")),
            ret_types,
            params: SmallVec::new(),
            config,
            def: DeclDef::Present(func_def_body),
        },
    )
}

/// Define a function reading the system value `location` once and returning it.
pub fn define_read_and_return(
    module: &mut Module,
    location: SystemValue,
    config: FuncConfig,
) -> (GlobalVar, Func) {
    let gv = declare_sysval(module, location);
    let ty = module.global_vars[gv].ty;
    let func = define_simple_func(module, config, |b| vec![b.load_var(gv, ty)]);
    (gv, func)
}

pub fn func_def_body(module: &Module, func: Func) -> &FuncDefBody {
    match &module.funcs[func].def {
        DeclDef::Present(func_def_body) => func_def_body,
        DeclDef::Imported(_) => panic!("{func:?} is imported"),
    }
}

pub fn func_def_body_mut(module: &mut Module, func: Func) -> &mut FuncDefBody {
    match &mut module.funcs[func].def {
        DeclDef::Present(func_def_body) => func_def_body,
        DeclDef::Imported(_) => panic!("{func:?} is imported"),
    }
}

/// Count the instructions (across the whole function) for which `predicate`
/// returns `true`.
pub fn count_insts(
    module: &Module,
    func: Func,
    mut predicate: impl FnMut(&DataInstKind) -> bool,
) -> usize {
    let func_def_body = func_def_body(module, func);
    func_def_body
        .regions
        .keys()
        .map(|region| {
            func_def_body
                .at(region)
                .at_insts()
                .into_iter()
                .filter(|func_at_inst| predicate(&func_at_inst.def().kind))
                .count()
        })
        .sum()
}

/// Inputs for [`eval_func`]: values of primitive system values, and of any
/// global variables which may be read.
#[derive(Default)]
pub struct Env {
    pub primitives: HashMap<Primitive, Vec<u32>>,
    pub global_vars: HashMap<GlobalVar, Vec<u32>>,
}

impl Env {
    pub fn with_primitive(mut self, primitive: Primitive, components: &[u32]) -> Self {
        self.primitives.insert(primitive, components.to_vec());
        self
    }
}

/// Reference interpreter, returning the values returned by `func` (with
/// every value represented by its components, and `bool`s as `0`/`1`).
pub fn eval_func(module: &Module, func: Func, args: &[Vec<u32>], env: &Env) -> Vec<Vec<u32>> {
    let cx = module.cx_ref();
    let func_def_body = func_def_body(module, func);

    let mut values: HashMap<Value, Vec<u32>> = HashMap::new();
    let eval = |values: &HashMap<Value, Vec<u32>>, v: Value| -> Vec<u32> {
        match v {
            Value::Const(ct) => match &cx[ct].kind {
                ConstKind::Undef => vec![0; cx[cx[ct].ty].elem_and_count().1 as usize],
                &ConstKind::Scalar(x) => vec![x],
                ConstKind::Vector(xs) => xs.to_vec(),
            },
            _ => values.get(&v).unwrap_or_else(|| panic!("{v:?} used before being set")).clone(),
        }
    };

    let mut region = func_def_body.body;
    for (input_idx, arg) in args.iter().enumerate() {
        values.insert(Value::RegionInput { region, input_idx: input_idx as u32 }, arg.clone());
    }

    for _ in 0..10_000 {
        for func_at_inst in func_def_body.at(region).at_insts() {
            let def = func_at_inst.def();
            let inputs: Vec<_> = def.inputs.iter().map(|&v| eval(&values, v)).collect();
            let output = match &def.kind {
                &DataInstKind::FuncCall(callee) => {
                    let mut rets = eval_func(module, callee, &inputs, env);
                    if rets.is_empty() { None } else { Some(rets.remove(0)) }
                }
                DataInstKind::Intrinsic(Intrinsic::LoadVar(gv)) => Some(
                    env.global_vars
                        .get(gv)
                        .unwrap_or_else(|| panic!("no value for {gv:?}"))
                        .clone(),
                ),
                DataInstKind::Intrinsic(Intrinsic::StoreVar(_)) => None,
                DataInstKind::Intrinsic(Intrinsic::LoadSysVal(primitive)) => Some(
                    env.primitives
                        .get(primitive)
                        .unwrap_or_else(|| panic!("no value for {primitive:?}"))
                        .clone(),
                ),
                DataInstKind::IntBinOp(op) => {
                    let (a, b) = (&inputs[0], &inputs[1]);
                    assert_eq!(a.len(), b.len());
                    Some(
                        a.iter()
                            .zip(b)
                            .map(|(&a, &b)| match op {
                                IntBinOp::Add => a.wrapping_add(b),
                                IntBinOp::Mul => a.wrapping_mul(b),
                            })
                            .collect(),
                    )
                }
                &DataInstKind::VectorExtract(component) => {
                    Some(vec![inputs[0][component as usize]])
                }
            };
            if let Some(output) = output {
                values.insert(Value::DataInstOutput(func_at_inst.position), output);
            }
        }

        let control_inst = &func_def_body.cfg.control_inst_on_exit_from[region];
        let target = match &control_inst.kind {
            ControlInstKind::Return => {
                return control_inst.inputs.iter().map(|&v| eval(&values, v)).collect();
            }
            ControlInstKind::Unreachable => panic!("reached `unreachable`"),
            ControlInstKind::Branch => control_inst.targets[0],
            ControlInstKind::SelectBranch(SelectionKind::BoolCond) => {
                let cond = eval(&values, control_inst.inputs[0])[0];
                control_inst.targets[if cond != 0 { 0 } else { 1 }]
            }
            ControlInstKind::SelectBranch(SelectionKind::SwitchU32 { case_consts }) => {
                let scrutinee = eval(&values, control_inst.inputs[0])[0];
                let case_idx = case_consts
                    .iter()
                    .position(|&case| case == scrutinee)
                    .unwrap_or(case_consts.len());
                control_inst.targets[case_idx]
            }
        };

        let args: Vec<_> = control_inst
            .target_inputs
            .get(&target)
            .into_iter()
            .flatten()
            .map(|&v| eval(&values, v))
            .collect();
        for (input_idx, arg) in args.into_iter().enumerate() {
            values.insert(Value::RegionInput { region: target, input_idx: input_idx as u32 }, arg);
        }
        region = target;
    }
    panic!("eval_func: step limit exceeded");
}
