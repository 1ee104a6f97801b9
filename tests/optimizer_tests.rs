use ccrs::ir::data_flow::data_flow;
use ccrs::ir::optimizer::{dead_code_elim, merge_blocks, peephole};
use ccrs::ir::reorder::reorder_blocks;
use ccrs::ir::{Function, InstKind, Ir};
use ccrs::ops::ArithOp;
use ccrs::types::DataSize;

#[test]
fn peephole_turns_identities_into_moves() {
    let mut ir = Ir::new();
    let mut f = Function::new("identities".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = entry;

    let x = f.new_reg(DataSize::Dword);
    let a = f.new_reg(DataSize::Dword);
    let b = f.new_reg(DataSize::Dword);
    let c = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: x.clone(), imm: 11 });
    f.emit(entry, &mut ir.inst_count, InstKind::BinImm { op: ArithOp::Add, rd: a.clone(), lhs: x.clone(), imm: 0 });
    f.emit(entry, &mut ir.inst_count, InstKind::BinImm { op: ArithOp::Mul, rd: b.clone(), lhs: x.clone(), imm: 1 });
    f.emit(entry, &mut ir.inst_count, InstKind::BinImm { op: ArithOp::Add, rd: c.clone(), lhs: x, imm: 2 });
    f.emit(entry, &mut ir.inst_count, InstKind::Ret { value: None });
    ir.add_function(f);

    assert!(peephole(&mut ir));

    let f = &ir.functions[0];
    let kinds: Vec<_> = f.graph[f.entry].insts.iter().map(|&id| f.inst(id).unwrap().kind.clone()).collect();
    assert!(matches!(&kinds[1], InstKind::Mov { rd, .. } if rd.virt == a.virt));
    assert!(matches!(&kinds[2], InstKind::Mov { rd, .. } if rd.virt == b.virt));
    // Add 2 is not an identity.
    assert!(matches!(&kinds[3], InstKind::BinImm { imm: 2, .. }));
    // A second run finds nothing left to rewrite.
    assert!(!peephole(&mut ir));
}

#[test]
fn dce_removes_dead_definitions_and_keeps_calls() {
    let mut ir = Ir::new();
    let mut f = Function::new("dce".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let exit = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = exit;

    let dead = f.new_reg(DataSize::Dword);
    let live = f.new_reg(DataSize::Dword);
    let call_dest = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: dead.clone(), imm: 1 });
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: live.clone(), imm: 2 });
    f.emit(entry, &mut ir.inst_count, InstKind::Call { rd: Some(call_dest), func: "effectful".into(), args: Vec::new() });
    f.emit(entry, &mut ir.inst_count, InstKind::Jump { target: exit });
    f.connect(entry, exit);
    f.emit(exit, &mut ir.inst_count, InstKind::Ret { value: Some(live.clone()) });
    ir.add_function(f);

    reorder_blocks(&mut ir);
    data_flow(&mut ir);
    assert!(dead_code_elim(&mut ir));

    let f = &ir.functions[0];
    let kinds: Vec<_> = f.sorted_inst_ids().into_iter().map(|id| f.inst(id).unwrap().kind.clone()).collect();
    // The dead immediate is gone, the live one stays.
    assert!(!kinds.iter().any(|k| matches!(k, InstKind::Imm { imm: 1, .. })));
    assert!(kinds.iter().any(|k| matches!(k, InstKind::Imm { imm: 2, .. })));
    // The call survives without its destination.
    assert!(kinds.iter().any(|k| matches!(k, InstKind::Call { rd: None, .. })));
    // After DCE every remaining non-call destination is live out.
    for id in f.sorted_inst_ids() {
        let inst = f.inst(id).unwrap();
        if let Some(rd) = inst.dest() {
            assert!(matches!(inst.kind, InstKind::Call { .. }) || inst.live_out.as_ref().unwrap().get(rd.virt as usize));
        }
    }
}

#[test]
fn merge_collapses_a_jump_chain() {
    let mut ir = Ir::new();
    let mut f = Function::new("chain".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let mid = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let exit = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = exit;

    let r = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: r.clone(), imm: 4 });
    f.emit(entry, &mut ir.inst_count, InstKind::Jump { target: mid });
    f.connect(entry, mid);
    f.emit(mid, &mut ir.inst_count, InstKind::Jump { target: exit });
    f.connect(mid, exit);
    f.emit(exit, &mut ir.inst_count, InstKind::Ret { value: Some(r) });
    ir.add_function(f);

    reorder_blocks(&mut ir);
    merge_blocks(&mut ir).unwrap();

    let f = &ir.functions[0];
    assert_eq!(f.graph.node_count(), 1);
    // The entry absorbed the chain and became the exit.
    assert_eq!(f.exit, f.entry);
    let kinds: Vec<_> = f.graph[f.entry].insts.iter().map(|&id| f.inst(id).unwrap().kind.clone()).collect();
    assert!(matches!(kinds.first(), Some(InstKind::Label { .. })));
    assert!(matches!(kinds.last(), Some(InstKind::Ret { .. })));
    // One label, one immediate, one return: the inner jumps and labels are gone.
    assert_eq!(kinds.len(), 3);
}

#[test]
fn merge_leaves_shared_targets_alone() {
    let mut ir = Ir::new();
    let mut f = Function::new("diamond".into());
    let entry = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let then_b = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let else_b = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    let join = f.add_block(&mut ir.block_count, &mut ir.inst_count);
    f.entry = entry;
    f.exit = join;

    let c = f.new_reg(DataSize::Dword);
    f.emit(entry, &mut ir.inst_count, InstKind::Imm { rd: c.clone(), imm: 0 });
    f.emit(entry, &mut ir.inst_count, InstKind::Br { cond: c, then_: then_b, else_: else_b });
    f.connect(entry, then_b);
    f.connect(entry, else_b);
    f.emit(then_b, &mut ir.inst_count, InstKind::Jump { target: join });
    f.connect(then_b, join);
    f.emit(else_b, &mut ir.inst_count, InstKind::Jump { target: join });
    f.connect(else_b, join);
    f.emit(join, &mut ir.inst_count, InstKind::Ret { value: None });
    ir.add_function(f);

    reorder_blocks(&mut ir);
    merge_blocks(&mut ir).unwrap();

    // The join has two predecessors and the branch two successors:
    // nothing merges.
    let f = &ir.functions[0];
    assert_eq!(f.graph.node_count(), 4);
}
