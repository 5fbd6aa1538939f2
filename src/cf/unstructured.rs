//! Unstructured control-flow graph (CFG) abstractions and utilities.

use crate::{EntityOrientedDenseMap, FuncDefBody, FxIndexMap, Region, Value, cf};
use itertools::Either;
use smallvec::SmallVec;

/// The control-flow graph (CFG) of a function, as control-flow instructions
/// ([`ControlInst`]s) attached to [`Region`]s, as an "action on exit", i.e.
/// "terminator" (while every [`Region`] is itself a straight-line block).
#[derive(Clone, Default)]
pub struct ControlFlowGraph {
    pub control_inst_on_exit_from: EntityOrientedDenseMap<Region, ControlInst>,
}

#[derive(Clone, Debug)]
pub struct ControlInst {
    pub kind: ControlInstKind,

    pub inputs: SmallVec<[Value; 2]>,

    // FIXME(eddyb) change the inline size of this to fit most instructions.
    pub targets: SmallVec<[Region; 4]>,

    /// `target_inputs[region][input_idx]` is the [`Value`] that
    /// `Value::RegionInput { region, input_idx }` will get on entry,
    /// where `region` must be appear at least once in `targets` - this is a
    /// separate map instead of being part of `targets` because it reflects the
    /// limitations of φ ("phi") nodes, which (unlike "basic block arguments")
    /// cannot tell apart multiple edges with the same source and destination.
    pub target_inputs: FxIndexMap<Region, SmallVec<[Value; 2]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlInstKind {
    /// Reaching this point in the control-flow is undefined behavior, e.g.:
    /// * a `SelectBranch` case that's known to be impossible
    /// * after a function call, where the function never returns
    Unreachable,

    /// Leave the current function, returning the values in `inputs`.
    Return,

    /// Unconditional branch to a single target.
    Branch,

    /// Branch to one of several targets, chosen by a single value input.
    SelectBranch(cf::SelectionKind),
}

impl ControlFlowGraph {
    /// Iterate over all [`Region`]s making up `func_def_body`'s CFG, in
    /// reverse post-order (RPO).
    ///
    /// RPO iteration over a CFG provides certain guarantees, most importantly
    /// that dominators are visited before the entire subgraph they dominate.
    pub fn rev_post_order(
        &self,
        func_def_body: &FuncDefBody,
    ) -> impl DoubleEndedIterator<Item = Region> + use<> {
        let mut post_order = SmallVec::<[_; 8]>::new();
        self.traverse_whole_func(
            func_def_body,
            &mut TraversalState {
                incoming_edge_counts: EntityOrientedDenseMap::new(),

                pre_order_visit: |_| {},
                post_order_visit: |region| post_order.push(region),

                // NOTE(eddyb) this doesn't impact semantics, but combined with
                // the final reversal, it should keep targets in the original
                // order in the cases when they didn't get deduplicated.
                reverse_targets: true,
            },
        );
        post_order.into_iter().rev()
    }

    /// Iterate over the (possibly repeating) successors of `region`.
    pub fn successors(&self, region: Region) -> impl Iterator<Item = Region> + '_ {
        self.control_inst_on_exit_from
            .get(region)
            .into_iter()
            .flat_map(|control_inst| control_inst.targets.iter().copied())
    }
}

// HACK(eddyb) this only serves to disallow accessing `IncomingEdgeCount`'s private field.
mod sealed {
    /// Opaque newtype for the count of incoming edges (into a [`Region`](crate::Region)).
    ///
    /// The private field prevents direct mutation or construction, forcing the
    /// use of [`IncomingEdgeCount::ONE`] and addition operations to produce some
    /// specific count (which would require explicit workarounds for misuse).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct IncomingEdgeCount(usize);

    impl IncomingEdgeCount {
        pub const ONE: Self = Self(1);
    }

    impl std::ops::Add for IncomingEdgeCount {
        type Output = Self;
        fn add(self, other: Self) -> Self {
            Self(self.0 + other.0)
        }
    }

    impl std::ops::AddAssign for IncomingEdgeCount {
        fn add_assign(&mut self, other: Self) {
            *self = *self + other;
        }
    }
}
pub use sealed::IncomingEdgeCount;

pub struct TraversalState<PreVisit: FnMut(Region), PostVisit: FnMut(Region)> {
    pub incoming_edge_counts: EntityOrientedDenseMap<Region, IncomingEdgeCount>,
    pub pre_order_visit: PreVisit,
    pub post_order_visit: PostVisit,

    // FIXME(eddyb) should this be a generic parameter for "targets iterator"?
    pub reverse_targets: bool,
}

impl ControlFlowGraph {
    pub fn traverse_whole_func(
        &self,
        func_def_body: &FuncDefBody,
        state: &mut TraversalState<impl FnMut(Region), impl FnMut(Region)>,
    ) {
        // Quick sanity check that this is the right CFG for `func_def_body`.
        assert!(std::ptr::eq(&func_def_body.cfg, self));

        self.traverse(func_def_body.body, state);
    }

    fn traverse(
        &self,
        region: Region,
        state: &mut TraversalState<impl FnMut(Region), impl FnMut(Region)>,
    ) {
        // FIXME(eddyb) `EntityOrientedDenseMap` should have an `entry` API.
        if let Some(existing_count) = state.incoming_edge_counts.get_mut(region) {
            *existing_count += IncomingEdgeCount::ONE;
            return;
        }
        state.incoming_edge_counts.insert(region, IncomingEdgeCount::ONE);

        (state.pre_order_visit)(region);

        let control_inst = self
            .control_inst_on_exit_from
            .get(region)
            .expect("cfg: missing `ControlInst` on exit from a reachable block");

        let targets = control_inst.targets.iter().copied();
        let targets = if state.reverse_targets {
            Either::Left(targets.rev())
        } else {
            Either::Right(targets)
        };
        for target in targets {
            self.traverse(target, state);
        }

        (state.post_order_visit)(region);
    }
}
