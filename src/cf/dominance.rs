//! Dominance analysis, over the unstructured CFG of a function.
//!
//! Uses the iterative algorithm from "A Simple, Fast Dominance Algorithm"
//! (Cooper, Harvey and Kennedy), driven by reverse post-order (RPO) indices.

use crate::{EntityOrientedDenseMap, FuncDefBody, Region};
use smallvec::SmallVec;

/// Immediate dominators for all the [`Region`]s reachable from a function's
/// entry (unreachable [`Region`]s are absent, and dominate nothing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomTree {
    entry: Region,

    /// Immediate dominator of every reachable [`Region`] (the entry maps to itself).
    idom: EntityOrientedDenseMap<Region, Region>,

    /// Position of every reachable [`Region`] in reverse post-order.
    rpo_idx: EntityOrientedDenseMap<Region, u32>,
}

impl DomTree {
    pub fn compute(func_def_body: &FuncDefBody) -> Self {
        let cfg = &func_def_body.cfg;
        let entry = func_def_body.body;

        let rpo: SmallVec<[Region; 8]> = cfg.rev_post_order(func_def_body).collect();
        let mut rpo_idx = EntityOrientedDenseMap::new();
        for (idx, &region) in rpo.iter().enumerate() {
            rpo_idx.insert(region, idx as u32);
        }

        let mut preds = EntityOrientedDenseMap::<Region, SmallVec<[Region; 4]>>::new();
        for &region in &rpo {
            for target in cfg.successors(region) {
                // FIXME(eddyb) `EntityOrientedDenseMap` should have an `entry` API.
                if !preds.contains_key(target) {
                    preds.insert(target, SmallVec::new());
                }
                let target_preds = &mut preds[target];
                if !target_preds.contains(&region) {
                    target_preds.push(region);
                }
            }
        }

        let mut idom = EntityOrientedDenseMap::new();
        idom.insert(entry, entry);

        let intersect = |idom: &EntityOrientedDenseMap<Region, Region>,
                         mut a: Region,
                         mut b: Region| {
            while a != b {
                while rpo_idx[a] > rpo_idx[b] {
                    a = idom[a];
                }
                while rpo_idx[b] > rpo_idx[a] {
                    b = idom[b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &region in &rpo[1..] {
                let mut new_idom = None;
                for &pred in preds.get(region).into_iter().flatten() {
                    if !idom.contains_key(pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(other) => intersect(&idom, pred, other),
                    });
                }
                // NOTE(eddyb) in RPO, at least one predecessor was already seen.
                let new_idom = new_idom.expect("dominance: reachable block without predecessors");
                if idom.get(region) != Some(&new_idom) {
                    idom.insert(region, new_idom);
                    changed = true;
                }
            }
        }

        Self { entry, idom, rpo_idx }
    }

    pub fn is_reachable(&self, region: Region) -> bool {
        self.rpo_idx.contains_key(region)
    }

    /// The closest strict dominator of `region` (`None` for the entry, or any
    /// unreachable [`Region`]).
    pub fn immediate_dominator(&self, region: Region) -> Option<Region> {
        if region == self.entry {
            return None;
        }
        self.idom.get(region).copied()
    }

    /// Whether every path from the entry to `b` passes through `a`
    /// (trivially true for `a == b`, and never true for unreachable blocks).
    pub fn dominates(&self, a: Region, b: Region) -> bool {
        if a == b {
            return true;
        }
        let (Some(&a_idx), true) = (self.rpo_idx.get(a), self.is_reachable(b)) else {
            return false;
        };

        let mut current = b;
        // NOTE(eddyb) dominators always come earlier in RPO, so the walk up
        // the tree can stop as soon as it gets past `a`.
        while self.rpo_idx[current] > a_idx {
            current = self.idom[current];
        }
        current == a
    }
}
