//! Control-flow abstractions and analyses.

use smallvec::SmallVec;

// NOTE(eddyb) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod dominance;
pub mod unstructured;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    /// Two-case selection based on boolean condition, i.e. `if`-`else`, with
    /// the two cases being "then" and "else" (in that order).
    BoolCond,

    /// `N+1`-case selection based on an `u32` scrutinee, with the first `N`
    /// cases corresponding to `case_consts`, and the last case being "default".
    SwitchU32 { case_consts: SmallVec<[u32; 4]> },
}
