//! SSA verification: checking that every use of a [`Value`] is dominated by
//! the definition of that [`Value`].

use crate::cf::dominance::DomTree;
use crate::visit::{InnerVisit, Visitor};
use crate::{Const, DataInst, Func, FuncDefBody, GlobalVar, Region, Type, Value};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::borrow::Cow;

/// The location of a [`Value`] use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UseSite {
    DataInst(DataInst),

    /// The [`ControlInst`](crate::cf::unstructured::ControlInst) on exit from a [`Region`].
    ControlInst { exiting: Region },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("{user:?} uses {def:?}, which is not linked into any block")]
    UndefinedInst { user: UseSite, def: DataInst },

    #[error("{user:?} uses the output of {def:?}, which has none")]
    MissingOutput { user: UseSite, def: DataInst },

    #[error("{user:?} uses {def:?}, which does not dominate it")]
    InstNotDominating { user: UseSite, def: DataInst },

    #[error("{user:?} uses input #{input_idx} of {region:?}, which does not exist")]
    UndefinedRegionInput { user: UseSite, region: Region, input_idx: u32 },

    #[error("{user:?} uses input #{input_idx} of {region:?}, which does not dominate it")]
    RegionInputNotDominating { user: UseSite, region: Region, input_idx: u32 },
}

/// Check all [`Value`] uses in `func_def_body`, returning all the errors found.
///
/// Uses in unreachable [`Region`]s only need to refer to existing definitions
/// (as dominance is meaningless without a path from the function entry).
pub fn verify_func(func_def_body: &FuncDefBody) -> Result<(), Vec<VerifyError>> {
    let dom_tree = match func_def_body.metadata.dom_tree() {
        Some(dom_tree) => Cow::Borrowed(dom_tree),
        None => Cow::Owned(DomTree::compute(func_def_body)),
    };

    // Position of every (linked) instruction, as `(region, index_in_region)`.
    let mut inst_positions = FxHashMap::default();
    for region in func_def_body.regions.keys() {
        for (idx, func_at_inst) in func_def_body.at(region).at_insts().into_iter().enumerate() {
            inst_positions.insert(func_at_inst.position, (region, idx));
        }
    }

    let mut verifier = Verifier {
        func_def_body,
        dom_tree: &dom_tree,
        inst_positions: &inst_positions,
        errors: vec![],
    };
    for region in func_def_body.regions.keys() {
        for (idx, func_at_inst) in func_def_body.at(region).at_insts().into_iter().enumerate() {
            let mut uses = CollectValueUses::default();
            func_at_inst.def().inner_visit_with(&mut uses);
            for v in uses.0 {
                verifier.check_use(UseSite::DataInst(func_at_inst.position), region, Some(idx), v);
            }
        }

        if let Some(control_inst) = func_def_body.cfg.control_inst_on_exit_from.get(region) {
            let mut uses = CollectValueUses::default();
            uses.visit_control_inst(control_inst);
            for v in uses.0 {
                verifier.check_use(UseSite::ControlInst { exiting: region }, region, None, v);
            }
        }
    }

    if verifier.errors.is_empty() { Ok(()) } else { Err(verifier.errors) }
}

struct Verifier<'a> {
    func_def_body: &'a FuncDefBody,
    dom_tree: &'a DomTree,
    inst_positions: &'a FxHashMap<DataInst, (Region, usize)>,
    errors: Vec<VerifyError>,
}

impl Verifier<'_> {
    /// Check a use of `v` in `region`, either by its `idx`-th instruction, or
    /// (for `idx = None`) by its terminator.
    fn check_use(&mut self, user: UseSite, region: Region, idx: Option<usize>, v: Value) {
        let reachable = self.dom_tree.is_reachable(region);
        match v {
            Value::Const(_) => {}

            Value::RegionInput { region: def_region, input_idx } => {
                let input_exists = self
                    .func_def_body
                    .regions
                    .get(def_region)
                    .is_some_and(|def| (input_idx as usize) < def.inputs.len());
                if !input_exists {
                    self.errors.push(VerifyError::UndefinedRegionInput {
                        user,
                        region: def_region,
                        input_idx,
                    });
                } else if reachable && !self.dom_tree.dominates(def_region, region) {
                    self.errors.push(VerifyError::RegionInputNotDominating {
                        user,
                        region: def_region,
                        input_idx,
                    });
                }
            }

            Value::DataInstOutput(def) => {
                let Some(&(def_region, def_idx)) = self.inst_positions.get(&def) else {
                    self.errors.push(VerifyError::UndefinedInst { user, def });
                    return;
                };
                if self.func_def_body.at(def).def().output_type.is_none() {
                    self.errors.push(VerifyError::MissingOutput { user, def });
                }

                let dominates = if def_region == region {
                    idx.is_none_or(|idx| def_idx < idx)
                } else {
                    !reachable || self.dom_tree.dominates(def_region, region)
                };
                if !dominates {
                    self.errors.push(VerifyError::InstNotDominating { user, def });
                }
            }
        }
    }
}

/// [`Visitor`] collecting all the [`Value`]s used by one instruction.
#[derive(Default)]
struct CollectValueUses(SmallVec<[Value; 4]>);

impl<'a> Visitor<'a> for CollectValueUses {
    fn visit_type_use(&mut self, _ty: Type) {}
    fn visit_const_use(&mut self, _ct: Const) {}
    fn visit_global_var_use(&mut self, _gv: GlobalVar) {}
    fn visit_func_use(&mut self, _func: Func) {}

    fn visit_value_use(&mut self, v: &'a Value) {
        self.0.push(*v);
    }
}
