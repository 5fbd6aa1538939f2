mod common;

use common::*;
use sysval_lower::builder::{Builder, Cursor};
use sysval_lower::cf::SelectionKind;
use sysval_lower::cf::dominance::DomTree;
use sysval_lower::cf::unstructured::ControlInstKind;
use sysval_lower::metadata::{BlockIndices, Metadata};
use sysval_lower::passes::verify::{UseSite, VerifyError, verify_func};
use sysval_lower::sysval::SystemValue;
use sysval_lower::transform::{InnerInPlaceTransform, ReplaceValueWith};
use sysval_lower::{Context, DataInst, FuncDefBody, Region, ScalarType, Type, Value};

fn inst_of(v: Value) -> DataInst {
    match v {
        Value::DataInstOutput(inst) => inst,
        _ => panic!("expected an instruction output, found {v:?}"),
    }
}

fn insts_in(func_def_body: &FuncDefBody, region: Region) -> Vec<DataInst> {
    func_def_body
        .at(region)
        .at_insts()
        .into_iter()
        .map(|func_at_inst| func_at_inst.position)
        .collect()
}

/// `entry` (with one `u32` parameter) branching on a `bool` parameter to
/// `left`/`right`, both of which branch to `merge` (taking one `u32`), plus an
/// unreachable `dead` block.
struct Diamond {
    func_def_body: FuncDefBody,
    entry: Region,
    left: Region,
    right: Region,
    merge: Region,
    dead: Region,
}

impl Diamond {
    fn new(cx: &Context) -> Self {
        let u32_ty = u32_type(cx);
        let bool_ty: Type = cx.intern(ScalarType::Bool);

        let mut func_def_body = FuncDefBody::new(cx, [u32_ty, bool_ty]);
        let entry = func_def_body.body;
        let left = add_block(cx, &mut func_def_body, &[]);
        let right = add_block(cx, &mut func_def_body, &[]);
        let merge = add_block(cx, &mut func_def_body, &[u32_ty]);
        let dead = add_block(cx, &mut func_def_body, &[]);

        let param = Value::RegionInput { region: entry, input_idx: 0 };
        let cond = Value::RegionInput { region: entry, input_idx: 1 };
        terminate(
            &mut func_def_body,
            entry,
            ControlInstKind::SelectBranch(SelectionKind::BoolCond),
            &[cond],
            &[(left, vec![]), (right, vec![])],
        );
        terminate(&mut func_def_body, left, ControlInstKind::Branch, &[], &[(merge, vec![param])]);
        terminate(&mut func_def_body, right, ControlInstKind::Branch, &[], &[(merge, vec![param])]);
        terminate(&mut func_def_body, merge, ControlInstKind::Return, &[], &[]);
        terminate(&mut func_def_body, dead, ControlInstKind::Unreachable, &[], &[]);

        Self { func_def_body, entry, left, right, merge, dead }
    }

    fn param(&self) -> Value {
        Value::RegionInput { region: self.entry, input_idx: 0 }
    }
}

#[test]
fn builder_cursor_moves_past_insertions() {
    init_logging();
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let (entry, param) = (diamond.entry, diamond.param());

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    let last = b.iadd(param, param);
    assert_eq!(b.cursor(), Cursor::EndOf(entry));

    b.set_cursor(Cursor::StartOf(entry));
    let first = b.imul(param, param);
    assert_eq!(b.cursor(), Cursor::After { region: entry, inst: inst_of(first) });

    // Constants don't need any instructions.
    let three = b.imm_u32(3);
    assert_eq!(b.cursor(), Cursor::After { region: entry, inst: inst_of(first) });
    let second = b.iadd(first, three);

    b.set_cursor_after(entry, inst_of(first));
    let between = b.imul(first, first);

    assert_eq!(
        insts_in(&diamond.func_def_body, entry),
        [first, between, second, last].map(inst_of)
    );
}

#[test]
fn builder_types() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let merge = diamond.merge;

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(merge));
    let vector = b.imm(&[1, 2, 3]);
    assert_eq!(b.type_of(vector), u32x3_type(&cx));

    let y = b.extract(vector, 1);
    assert_eq!(b.type_of(y), u32_type(&cx));

    let doubled = b.iadd(vector, vector);
    assert_eq!(b.type_of(doubled), u32x3_type(&cx));

    let input = Value::RegionInput { region: merge, input_idx: 0 };
    assert_eq!(b.type_of(input), u32_type(&cx));
}

#[test]
#[should_panic(expected = "out of bounds")]
fn builder_extract_out_of_bounds() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let entry = diamond.entry;

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    let vector = b.imm(&[1, 2, 3]);
    b.extract(vector, 3);
}

#[test]
#[should_panic(expected = "expected 1 to 4")]
fn builder_imm_empty() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let entry = diamond.entry;

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    b.imm(&[]);
}

#[test]
#[should_panic(expected = "expected 1 to 4")]
fn builder_imm_too_wide() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let entry = diamond.entry;

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    b.imm(&[1, 2, 3, 4, 5]);
}

#[test]
fn dominance_diamond() {
    let cx = Context::new();
    let Diamond { func_def_body, entry, left, right, merge, dead } = Diamond::new(&cx);
    let dom_tree = DomTree::compute(&func_def_body);

    assert_eq!(dom_tree.immediate_dominator(entry), None);
    for region in [left, right, merge] {
        assert_eq!(dom_tree.immediate_dominator(region), Some(entry));
        assert!(dom_tree.dominates(entry, region));
    }
    assert!(!dom_tree.dominates(left, merge));
    assert!(!dom_tree.dominates(merge, left));
    assert!(dom_tree.dominates(merge, merge));

    assert!(!dom_tree.is_reachable(dead));
    assert_eq!(dom_tree.immediate_dominator(dead), None);
    assert!(!dom_tree.dominates(entry, dead));
}

#[test]
fn dominance_loop() {
    let cx = Context::new();
    let u32_ty = u32_type(&cx);

    // entry -> header <-> latch, header -> exit
    let mut func_def_body = FuncDefBody::new(&cx, [u32_ty]);
    let entry = func_def_body.body;
    let exit = add_block(&cx, &mut func_def_body, &[]);
    let latch = add_block(&cx, &mut func_def_body, &[]);
    let header = add_block(&cx, &mut func_def_body, &[]);

    let param = Value::RegionInput { region: entry, input_idx: 0 };
    terminate(&mut func_def_body, entry, ControlInstKind::Branch, &[], &[(header, vec![])]);
    terminate(
        &mut func_def_body,
        header,
        ControlInstKind::SelectBranch(SelectionKind::SwitchU32 {
            case_consts: [0].into_iter().collect(),
        }),
        &[param],
        &[(exit, vec![]), (latch, vec![])],
    );
    terminate(&mut func_def_body, latch, ControlInstKind::Branch, &[], &[(header, vec![])]);
    terminate(&mut func_def_body, exit, ControlInstKind::Return, &[], &[]);

    let dom_tree = DomTree::compute(&func_def_body);
    assert_eq!(dom_tree.immediate_dominator(header), Some(entry));
    assert_eq!(dom_tree.immediate_dominator(latch), Some(header));
    assert_eq!(dom_tree.immediate_dominator(exit), Some(header));
    assert!(dom_tree.dominates(header, latch));
    assert!(!dom_tree.dominates(latch, header));
}

#[test]
fn block_indices_follow_definition_order() {
    let cx = Context::new();
    let Diamond { func_def_body, entry, left, right, merge, dead } = Diamond::new(&cx);
    let block_indices = BlockIndices::compute(&func_def_body);

    assert_eq!(block_indices.block_count(), 5);
    for (i, region) in [entry, left, right, merge, dead].into_iter().enumerate() {
        assert_eq!(block_indices.index_of(region), Some(i as u32));
    }
}

#[test]
fn metadata_require_and_preserve() {
    let cx = Context::new();
    let mut func_def_body = Diamond::new(&cx).func_def_body;
    assert_eq!(func_def_body.metadata.valid(), Metadata::empty());

    func_def_body.require_metadata(Metadata::DOMINANCE);
    assert_eq!(func_def_body.metadata.valid(), Metadata::DOMINANCE);
    assert!(func_def_body.metadata.block_indices().is_none());
    assert_eq!(func_def_body.metadata.dom_tree(), Some(&DomTree::compute(&func_def_body)));

    func_def_body.require_metadata(Metadata::all());
    assert_eq!(func_def_body.metadata.valid(), Metadata::all());

    func_def_body.preserve_metadata(Metadata::BLOCK_INDEX);
    assert_eq!(func_def_body.metadata.valid(), Metadata::BLOCK_INDEX);

    func_def_body.preserve_metadata(Metadata::empty());
    assert_eq!(func_def_body.metadata.valid(), Metadata::empty());
}

#[test]
fn verify_accepts_well_formed() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let (entry, left, merge, param) = (diamond.entry, diamond.left, diamond.merge, diamond.param());

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    let x = b.iadd(param, param);
    b.set_cursor(Cursor::EndOf(left));
    b.imul(x, param);
    b.set_cursor(Cursor::EndOf(merge));
    let merge_input = Value::RegionInput { region: merge, input_idx: 0 };
    b.iadd(merge_input, x);

    assert_eq!(verify_func(&diamond.func_def_body), Ok(()));
}

#[test]
fn verify_rejects_use_before_def() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let (entry, param) = (diamond.entry, diamond.param());

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    let late = b.iadd(param, param);
    b.set_cursor(Cursor::StartOf(entry));
    let early = b.imul(late, param);

    assert_eq!(
        verify_func(&diamond.func_def_body),
        Err(vec![VerifyError::InstNotDominating {
            user: UseSite::DataInst(inst_of(early)),
            def: inst_of(late),
        }])
    );
}

#[test]
fn verify_rejects_non_dominating_blocks() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let (left, right, merge) = (diamond.left, diamond.right, diamond.merge);

    let merge_input = Value::RegionInput { region: merge, input_idx: 0 };
    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(left));
    let from_left = b.imm_u32(1);
    let from_left = b.iadd(from_left, from_left);
    b.set_cursor(Cursor::EndOf(right));
    let from_right = b.imul(from_left, merge_input);

    assert_eq!(
        verify_func(&diamond.func_def_body),
        Err(vec![
            VerifyError::InstNotDominating {
                user: UseSite::DataInst(inst_of(from_right)),
                def: inst_of(from_left),
            },
            VerifyError::RegionInputNotDominating {
                user: UseSite::DataInst(inst_of(from_right)),
                region: merge,
                input_idx: 0,
            },
        ])
    );
}

#[test]
fn verify_rejects_dangling_uses() {
    let mut module = new_module();
    let draw_id_var = declare_sysval(&mut module, SystemValue::DrawId);
    let cx = module.cx();
    let mut diamond = Diamond::new(&cx);
    let (entry, merge, param) = (diamond.entry, diamond.merge, diamond.param());

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    let removed = b.iadd(param, param);
    let store = b.store_var(draw_id_var, param);
    let user = b.iadd(removed, Value::DataInstOutput(store));
    let missing_input = Value::RegionInput { region: merge, input_idx: 5 };
    let other_user = b.iadd(param, missing_input);

    let func_def_body = &mut diamond.func_def_body;
    func_def_body.regions[entry].insts.remove(inst_of(removed), &mut func_def_body.data_insts);
    func_def_body.data_insts.remove(inst_of(removed));

    assert_eq!(
        verify_func(func_def_body),
        Err(vec![
            VerifyError::UndefinedInst {
                user: UseSite::DataInst(inst_of(user)),
                def: inst_of(removed),
            },
            VerifyError::MissingOutput { user: UseSite::DataInst(inst_of(user)), def: store },
            VerifyError::UndefinedRegionInput {
                user: UseSite::DataInst(inst_of(other_user)),
                region: merge,
                input_idx: 5,
            },
        ])
    );
}

#[test]
fn replace_value_reaches_terminators() {
    let cx = Context::new();
    let mut diamond = Diamond::new(&cx);
    let (entry, left, right, merge, param) =
        (diamond.entry, diamond.left, diamond.right, diamond.merge, diamond.param());

    let mut b = Builder::new(&cx, diamond.func_def_body.at_mut(()), Cursor::EndOf(entry));
    let seven = b.imm_u32(7);
    let doubled = b.iadd(param, param);
    b.set_cursor(Cursor::EndOf(merge));
    let merge_input = Value::RegionInput { region: merge, input_idx: 0 };
    let user = b.imul(param, merge_input);

    let func_def_body = &mut diamond.func_def_body;
    func_def_body.inner_in_place_transform_with(&mut ReplaceValueWith(|v: Value| {
        (v == param).then_some(seven)
    }));

    assert_eq!(func_def_body.at(inst_of(doubled)).def().inputs[..], [seven, seven]);
    assert_eq!(func_def_body.at(inst_of(user)).def().inputs[..], [seven, merge_input]);
    for region in [left, right] {
        let control_inst = &func_def_body.cfg.control_inst_on_exit_from[region];
        assert_eq!(control_inst.target_inputs[&merge][..], [seven]);
    }

    // The function parameter itself stays declared.
    assert_eq!(func_def_body.at(entry).def().inputs.len(), 2);
}
