use ccrs::ir::data_flow::data_flow;
use ccrs::ir::optimizer::propagation;
use ccrs::ir::reorder::reorder_blocks;
use ccrs::ir::{Function, InstKind, Ir, RegKind};
use ccrs::ops::{ArithOp, CompareOp};
use ccrs::types::DataSize;

fn analyze(ir: &mut Ir) {
    reorder_blocks(ir);
    data_flow(ir);
}

#[test]
fn binaries_with_known_operands_fold() {
    let mut ir = Ir::new();
    let mut f = Function::new("fold".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = entry;

    let a = f.new_reg(DataSize::Dword);
    let b = f.new_reg(DataSize::Dword);
    let c = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: a.clone(), imm: 2 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: b.clone(), imm: 3 });
    f.emit(entry, &mut ir.inst_count, InstKind::Bin { op: ArithOp::Mul, rd: c.clone(), lhs: a, rhs: b });
    f.emit(entry, &mut ir.inst_count, InstKind::Ret { value: Some(c.clone()) });
    ir.add_function(f);

    analyze(&mut ir);
    assert!(propagation(&mut ir));

    let f = &ir.functions[0];
    let folded = f
        .sorted_inst_ids()
        .into_iter()
        .find_map(|id| match &f.inst(id).unwrap().kind {
            InstKind::Imm { rd, imm } if rd.virt == c.virt => Some(*imm),
            _ => None,
        });
    assert_eq!(folded, Some(6));
}

#[test]
fn partially_known_binaries_take_immediate_form() {
    let mut ir = Ir::new();
    let mut f = Function::new("bin_imm".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = entry;

    // x has two definitions, so it never folds.
    let x = f.new_reg(DataSize::Dword);
    let k = f.new_reg(DataSize::Dword);
    let r = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: x.clone(), imm: 1 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: x.clone(), imm: 2 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: k.clone(), imm: 40 });
    f.emit(entry, &mut ir.inst_count, InstKind::Bin { op: ArithOp::Add, rd: r.clone(), lhs: x, rhs: k });
    f.emit(entry, &mut ir.inst_count, InstKind::Ret { value: Some(r) });
    ir.add_function(f);

    analyze(&mut ir);
    assert!(propagation(&mut ir));

    let f = &ir.functions[0];
    let kinds: Vec<_> = f.sorted_inst_ids().into_iter().map(|id| f.inst(id).unwrap().kind.clone()).collect();
    assert!(kinds.iter().any(|kind| matches!(
        kind,
        InstKind::BinImm { op: ArithOp::Add, imm: 40, .. }
    )));
}

#[test]
fn moves_of_constants_become_immediates() {
    let mut ir = Ir::new();
    let mut f = Function::new("mov_imm".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = entry;

    let a = f.new_reg(DataSize::Dword);
    let b = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: a.clone(), imm: 7 });
    f.emit(entry, &mut ir.inst_count, InstKind::Mov { rd: b.clone(), ra: a.clone() });
    f.emit(entry, &mut ir.inst_count, InstKind::Ret { value: Some(b.clone()) });
    ir.add_function(f);

    analyze(&mut ir);
    assert!(propagation(&mut ir));

    let f = &ir.functions[0];
    let kinds: Vec<_> = f.sorted_inst_ids().into_iter().map(|id| f.inst(id).unwrap().kind.clone()).collect();
    // The move folded to an immediate, and the return operand was
    // copy-propagated to the move source.
    assert!(kinds.iter().any(|kind| matches!(kind, InstKind::Imm { rd, imm: 7 } if rd.virt == b.virt)));
    assert!(kinds.iter().any(|kind| matches!(kind, InstKind::Ret { value: Some(v) } if v.virt == a.virt)));
}

#[test]
fn branch_on_known_compare_folds_and_rewrites_the_cfg() {
    let mut ir = Ir::new();
    let mut f = Function::new("br_fold".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let then_b = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let else_b = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let exit = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = exit;

    let c = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: c.clone(), imm: 5 });
    f.emit(
        entry,
        &mut ir.inst_count,
        InstKind::BrCmpImm { pred: CompareOp::Gt, lhs: c, imm: 3, then_: then_b, else_: else_b },
    );
    f.connect(entry, then_b);
    f.connect(entry, else_b);
    f.emit(then_b, &mut ir.inst_count, InstKind::Jump { target: exit });
    f.connect(then_b, exit);
    f.emit(else_b, &mut ir.inst_count, InstKind::Jump { target: exit });
    f.connect(else_b, exit);
    f.emit(exit, &mut ir.inst_count, InstKind::Ret { value: None });
    ir.add_function(f);

    analyze(&mut ir);
    assert!(propagation(&mut ir));

    let f = &ir.functions[0];
    // 5 > 3: the then edge is taken, the else edge is gone.
    let term = f.inst(*f.graph[f.entry].insts.last().unwrap()).unwrap();
    assert!(matches!(term.kind, InstKind::Jump { target } if target == then_b));
    assert_eq!(f.succs(f.entry), vec![then_b]);
}

#[test]
fn branch_fuses_with_its_compare_chain() {
    let mut ir = Ir::new();
    let mut f = Function::new("br_fuse".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let then_b = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let else_b = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let exit = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = exit;

    // x and y each have two definitions so neither folds to a constant.
    let x = f.new_reg(DataSize::Dword);
    let y = f.new_reg(DataSize::Dword);
    let t = f.new_reg(DataSize::Byte);
    let w = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: x.clone(), imm: 1 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: x.clone(), imm: 2 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: y.clone(), imm: 3 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: y.clone(), imm: 4 });
    f.emit(entry, &mut ir.inst_count, InstKind::Cmp { pred: CompareOp::Lt, rd: t.clone(), lhs: x.clone(), rhs: y.clone() });
    f.emit(entry, &mut ir.inst_count, InstKind::Zext { rd: w.clone(), opr: t });
    f.emit(entry, &mut ir.inst_count, InstKind::Br { cond: w, then_: then_b, else_: else_b });
    f.connect(entry, then_b);
    f.connect(entry, else_b);
    f.emit(then_b, &mut ir.inst_count, InstKind::Jump { target: exit });
    f.connect(then_b, exit);
    f.emit(else_b, &mut ir.inst_count, InstKind::Jump { target: exit });
    f.connect(else_b, exit);
    f.emit(exit, &mut ir.inst_count, InstKind::Ret { value: None });
    ir.add_function(f);

    // Two rounds: the branch absorbs the zext first, the compare second.
    analyze(&mut ir);
    propagation(&mut ir);
    analyze(&mut ir);
    propagation(&mut ir);

    let f = &ir.functions[0];
    let term = f.inst(*f.graph[f.entry].insts.last().unwrap()).unwrap();
    match &term.kind {
        InstKind::BrCmp { pred, lhs, rhs, then_, else_ } => {
            assert_eq!(*pred, CompareOp::Lt);
            assert_eq!(lhs.virt, x.virt);
            assert_eq!(rhs.virt, y.virt);
            assert_eq!(*then_, then_b);
            assert_eq!(*else_, else_b);
        }
        other => panic!("expected a fused BR_CMP, found {other:?}"),
    }
}

#[test]
fn unavailable_copy_sources_get_an_escape_register() {
    let mut ir = Ir::new();
    let mut f = Function::new("escape".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = entry;

    // s has no definition at all, so no definition of it reaches the use.
    let s = f.new_reg(DataSize::Dword);
    let m = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Mov { rd: m.clone(), ra: s });
    f.emit(entry, &mut ir.inst_count, InstKind::Ret { value: Some(m.clone()) });
    ir.add_function(f);

    let reg_count_before = ir.functions[0].reg_count;
    analyze(&mut ir);
    assert!(propagation(&mut ir));

    let f = &ir.functions[0];
    assert!(f.reg_count > reg_count_before);
    let ret = f.inst(*f.graph[f.entry].insts.last().unwrap()).unwrap();
    let InstKind::Ret { value: Some(v) } = &ret.kind else { panic!("expected RET with operand") };
    // The substituted register is the fresh sticky escape register, defined
    // by a move placed before the original definition.
    assert!(v.virt >= reg_count_before);
    assert!(v.sticky);
    assert_eq!(v.kind, RegKind::Virtual);
    let escape_def = f.inst(f.graph[f.entry].insts[1]).unwrap();
    assert!(matches!(&escape_def.kind, InstKind::Mov { rd, .. } if rd.virt == v.virt));
}
