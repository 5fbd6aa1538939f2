//! **`sysval-lower`** is a small shader IR (in the style of SPIR-T), together with
//! a lowering pass rewriting reads of "system values" (built-in per-invocation
//! inputs like `gl_GlobalInvocationID` or `gl_VertexID`) into arithmetic over
//! the handful of primitive system values a target exposes directly.
//!
//! #### Notable types/modules
//!
//! ##### IR data types
//! * [`Context`]: handles interning ([`Type`]s, [`Const`]s, etc.) and allocating entity handles
//! * [`Module`]: owns [`Func`]s and [`GlobalVar`]s (rooted by the [`Module`]'s registry
//!   of declared system values, `system_values`)
//! * [`FuncDefBody`]: owns [`Region`]s (basic blocks) and [`DataInst`]s (instructions),
//!   with [`cf::unstructured::ControlFlowGraph`] connecting the [`Region`]s
//!
//! ##### Utilities and passes
//! * [`builder::Builder`]: cursor-based instruction insertion
//! * [`transform`]/[`visit`]: mutable/immutable IR traversal
//! * [`metadata`]: lazily computed (and explicitly preserved) per-function facts
//! * [`passes::lower_sysvals`]: the system value lowering pass
//! * [`passes::verify`]: SSA (def-dominates-use) verification
//! * [`print`]: deterministic textual output

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::implicit_clone,
    clippy::inefficient_to_string,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mut_mut,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::semicolon_if_nothing_returned,
    clippy::todo,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE(eddyb) ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,
)]
#![forbid(unsafe_code)]

// NOTE(eddyb) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod builder;
pub mod cf;
mod context;
pub mod func_at;
pub mod metadata;
pub mod print;
pub mod sysval;
pub mod transform;
pub mod visit;
pub mod passes {
    //! IR transformations and checks (typically whole-[`Module`](crate::Module)).
    //
    // NOTE(eddyb) inline `mod` to avoid adding APIs here, it's just namespacing.

    pub mod lower_sysvals;
    pub mod verify;
}

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// HACK(eddyb) work around the lack of `FxIndex{Map,Set}` type aliases elsewhere.
#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

// NOTE(eddyb) these reexports are all documented inside `context`.
pub use context::{
    Context, Entity, EntityDefs, EntityList, EntityListIter, EntityListNode,
    EntityOrientedDenseMap, InternInCx,
};

/// Interned handle for a [`str`].
pub use context::InternedStr;

// HACK(eddyb) this only serves to disallow modifying the `cx` field of `Module`.
#[doc(hidden)]
mod sealed {
    use super::*;
    use std::rc::Rc;

    #[derive(Clone)]
    pub struct Module {
        /// Context used for everything interned, in this module.
        ///
        /// Notable choices made for this field:
        /// * private to disallow switching the context of a module
        /// * [`Rc`] sharing to allow multiple modules to use the same context
        ///   (`Context: !Sync` because of the interners so it can't be `Arc`)
        cx: Rc<Context>,

        pub global_vars: EntityDefs<GlobalVar>,
        pub funcs: EntityDefs<Func>,

        /// Registry of the declared system values (all with an
        /// [`AddrSpace::SystemValue`] address space), emptied by
        /// [`passes::lower_sysvals`](crate::passes::lower_sysvals).
        pub system_values: Vec<GlobalVar>,
    }

    impl Module {
        pub fn new(cx: Rc<Context>) -> Self {
            Self {
                cx,

                global_vars: Default::default(),
                funcs: Default::default(),

                system_values: vec![],
            }
        }

        // FIXME(eddyb) `cx_ref` might be the better default in situations where
        // the module doesn't need to be modified, figure out if that's common.
        pub fn cx(&self) -> Rc<Context> {
            self.cx.clone()
        }

        pub fn cx_ref(&self) -> &Rc<Context> {
            &self.cx
        }
    }
}
pub use sealed::Module;

impl Module {
    /// Declare a new [`GlobalVar`] of type `ty`, reading system value `location`,
    /// and record it in the `system_values` registry.
    pub fn declare_system_value(
        &mut self,
        name: Option<InternedStr>,
        ty: Type,
        location: sysval::SystemValue,
    ) -> GlobalVar {
        let cx = self.cx();
        let gv = self.global_vars.define(
            &cx,
            GlobalVarDecl { name, ty, addr_space: AddrSpace::SystemValue(location as u32) },
        );
        self.system_values.push(gv);
        gv
    }
}

/// Interned handle for a [`TypeDef`](crate::TypeDef).
pub use context::Type;

/// Definition for a [`Type`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDef {
    Scalar(ScalarType),

    /// Fixed-size vector of `count` scalars (all operations on vectors are
    /// component-wise, unless noted otherwise).
    Vector { elem: ScalarType, count: u8 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,

    /// 32-bit unsigned integer, all arithmetic on it wraps around on overflow.
    U32,
}

impl TypeDef {
    /// Element type and component count, with scalars being treated as
    /// single-component vectors.
    pub fn elem_and_count(&self) -> (ScalarType, u8) {
        match *self {
            TypeDef::Scalar(scalar) => (scalar, 1),
            TypeDef::Vector { elem, count } => (elem, count),
        }
    }
}

/// Interned handle for a [`ConstDef`](crate::ConstDef) (a constant value).
pub use context::Const;

/// Definition for a [`Const`]: a constant value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstDef {
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstKind {
    Undef,

    /// Scalar bit-pattern (`0`/`1` for `bool`s).
    Scalar(u32),

    Vector(ArrayVec<u32, 4>),
}

/// Declarations ([`FuncDecl`]) can contain a full definition,
/// or only be an import of a definition (e.g. from another module).
#[derive(Clone)]
pub enum DeclDef<D> {
    Imported(Import),
    Present(D),
}

/// An identifier (e.g. a link name, or "symbol") for an import declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Import {
    LinkName(InternedStr),
}

/// Entity handle for a [`GlobalVarDecl`](crate::GlobalVarDecl) (a global variable).
pub use context::GlobalVar;

/// Declaration for a [`GlobalVar`]: a global variable.
#[derive(Clone, Debug)]
pub struct GlobalVarDecl {
    pub name: Option<InternedStr>,

    /// The type of the value held by the variable.
    pub ty: Type,

    /// The "storage mode" of the global variable.
    pub addr_space: AddrSpace,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AddrSpace {
    Private,
    Input,
    Output,

    /// Read-only built-in input, supplied by the execution environment,
    /// with the raw location code identifying which one it is (see
    /// [`sysval::SystemValue`] for the known ones).
    SystemValue(u32),
}

/// Entity handle for a [`FuncDecl`](crate::FuncDecl) (a function).
pub use context::Func;

/// Declaration/definition for a [`Func`]: a function.
#[derive(Clone)]
pub struct FuncDecl {
    pub name: Option<InternedStr>,

    pub ret_types: SmallVec<[Type; 2]>,

    pub params: SmallVec<[FuncParam; 2]>,

    /// Shader-wide and target-specific settings, relevant to e.g. lowering.
    pub config: FuncConfig,

    pub def: DeclDef<FuncDefBody>,
}

#[derive(Copy, Clone, Debug)]
pub struct FuncParam {
    pub ty: Type,
}

/// Configuration attached to a [`FuncDecl`], deserializable from e.g. JSON.
///
/// Missing fields default to zero/`false`, which is used as-is (i.e. it's up
/// to whoever builds the IR to provide meaningful values).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuncConfig {
    pub shader: ShaderInfo,
    pub target: TargetOptions,
}

impl FuncConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderInfo {
    /// Fixed (per-dimension) invocation count of a compute work group.
    pub local_size: [u32; 3],
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
    /// Whether the target's primitive vertex index starts at `0` for every
    /// draw (requiring the base vertex to be added back in).
    pub vertex_id_zero_based: bool,
}

/// The body of a [`Func`] definition.
//
// FIXME(eddyb) `FuncDefBody`/`func_def_body` are too long, find shorter names.
#[derive(Clone)]
pub struct FuncDefBody {
    pub regions: EntityDefs<Region>,
    pub data_insts: EntityDefs<DataInst>,

    /// The entry [`Region`] of the function.
    ///
    /// Function parameters are provided via `body.inputs`, i.e. they can be
    /// only accessed with `Value::RegionInput { region: body, idx }`.
    pub body: Region,

    /// Control-flow graph connecting all of the [`Region`]s in `regions`.
    pub cfg: cf::unstructured::ControlFlowGraph,

    /// Cached analyses (see [`metadata`]).
    pub metadata: metadata::MetadataCache,
}

impl FuncDefBody {
    /// Create a body with only an (empty) entry [`Region`], taking `param_types`
    /// as its inputs (the terminator is left for the caller to set up).
    pub fn new(cx: &Context, param_types: impl IntoIterator<Item = Type>) -> Self {
        let mut regions = EntityDefs::new();
        let body = regions.define(
            cx,
            RegionDef {
                inputs: param_types.into_iter().map(|ty| RegionInputDecl { ty }).collect(),
                insts: EntityList::empty(),
            },
        );
        Self {
            regions,
            data_insts: EntityDefs::new(),
            body,
            cfg: Default::default(),
            metadata: Default::default(),
        }
    }
}

/// Entity handle for a [`RegionDef`](crate::RegionDef) (a basic block).
///
/// A [`Region`] is a linear chain of [`DataInst`]s, exited through the
/// [`cf::unstructured::ControlInst`] attached to it in the function's CFG.
///
/// # Data-flow interactions
///
/// [`Value`]s follow "single static assignment" (SSA):
/// * any new value is produced (or "defined") as an output of a [`DataInst`],
///   and "uses" of that value are [`Value`] variants which refer to the defining
///   [`DataInst`] directly (guaranteeing the "single" and "static" of "SSA")
/// * the definition of a value must "dominate" all of its uses
///   (i.e. in all possible execution paths, the definition precedes all uses)
/// * instead of φ ("phi") nodes, [`Region`] `inputs` are used, with values being
///   passed into them by the [`cf::unstructured::ControlInst`]s targeting them
pub use context::Region;

/// Definition for a [`Region`]: a basic block.
#[derive(Clone, Debug, Default)]
pub struct RegionDef {
    /// Inputs to this [`Region`]:
    /// * accessed using [`Value::RegionInput`]
    /// * values provided by:
    ///   * when this is the function body: the function's parameters
    ///   * otherwise: the `target_inputs` of every `ControlInst` targeting it
    pub inputs: SmallVec<[RegionInputDecl; 2]>,

    pub insts: EntityList<DataInst>,
}

#[derive(Copy, Clone, Debug)]
pub struct RegionInputDecl {
    pub ty: Type,
}

/// Entity handle for a [`DataInstDef`](crate::DataInstDef) (a leaf instruction).
pub use context::DataInst;

/// Definition for a [`DataInst`]: a leaf (non-control-flow) instruction.
#[derive(Clone, Debug)]
pub struct DataInstDef {
    pub kind: DataInstKind,

    pub inputs: SmallVec<[Value; 2]>,

    pub output_type: Option<Type>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::From)]
pub enum DataInstKind {
    FuncCall(Func),

    #[from]
    Intrinsic(Intrinsic),

    /// Integer arithmetic on two inputs of the same type (scalar or vector).
    #[from]
    IntBinOp(IntBinOp),

    /// Extract one component out of the vector in `inputs[0]`.
    VectorExtract(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// Read the current value of a [`GlobalVar`] (no inputs, one output).
    LoadVar(GlobalVar),

    /// Write `inputs[0]` to a [`GlobalVar`] (no output).
    StoreVar(GlobalVar),

    /// Request a primitive system value from the execution environment,
    /// i.e. one that doesn't need any further lowering.
    LoadSysVal(sysval::Primitive),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntBinOp {
    Add,
    Mul,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Const(Const),

    /// One of the inputs to a [`Region`]:
    /// * declared by `region.inputs[input_idx]`
    /// * value provided by the predecessor (or caller, for the function body)
    RegionInput { region: Region, input_idx: u32 },

    /// The output value of a [`DataInst`].
    DataInstOutput(DataInst),
}
