// src/ir/optimizer/mem2reg.rs
//! Stack-slot promotion.
//!
//! Classifies every virtual register into three sets:
//!
//! * `in_stack`: destination of a `STACK_ADDR` (it holds a slot address)
//! * `candidates`: used as the address operand of a `LOAD` or `STORE`
//! * `excluded`: used in any other role (the address escapes)
//!
//! A register is replaceable iff `(candidates \ excluded) & in_stack`.
//! Replaceable slots are rewritten to virtual-register moves: the
//! `STACK_ADDR` is deleted, loads become `MOV` from the slot's associated
//! register and stores become `MOV` into it. Only whole-slot accesses are
//! promoted; any address arithmetic marks the slot excluded and leaves it
//! alone.

use crate::ir::bit_set::BitSet;
use crate::ir::function::{Function, Ir};
use crate::ir::instruction::InstKind;
use crate::ir::reg::Reg;
use crate::types::DataSize;
use log::debug;

pub fn mem2reg(ir: &mut Ir) {
    let Ir { functions, inst_count, .. } = ir;
    for function in functions {
        let mut env = Env::new(function);
        env.collect_uses(function);
        let replaceable = env.compute_replaceable();
        apply_conversion(function, inst_count, &replaceable, &mut env.assoc_regs);
    }
}

struct Env {
    candidates: BitSet,
    excluded: BitSet,
    in_stack: BitSet,
    /// Memoized associated register index per promoted address register.
    assoc_regs: Vec<Option<u32>>,
}

impl Env {
    fn new(f: &Function) -> Self {
        let reg_count = f.reg_count as usize;
        Env {
            candidates: BitSet::zero(reg_count),
            excluded: BitSet::zero(reg_count),
            in_stack: BitSet::zero(reg_count),
            assoc_regs: vec![None; reg_count],
        }
    }

    fn set_reg(set: &mut BitSet, reg: &Reg) {
        if reg.is_virtual() {
            set.set(reg.virt as usize, true);
        }
    }

    fn collect_uses(&mut self, f: &Function) {
        for id in f.sorted_inst_ids() {
            let Some(inst) = f.inst(id) else { continue };
            match &inst.kind {
                InstKind::StackAddr { rd, .. } => Self::set_reg(&mut self.in_stack, rd),
                InstKind::Load { rd, addr, .. } => {
                    Self::set_reg(&mut self.candidates, addr);
                    Self::set_reg(&mut self.excluded, rd);
                }
                InstKind::Store { addr, value, .. } => {
                    Self::set_reg(&mut self.candidates, addr);
                    Self::set_reg(&mut self.excluded, value);
                }
                _ => {
                    for ra in inst.args() {
                        Self::set_reg(&mut self.excluded, ra);
                    }
                    if let Some(rd) = inst.dest() {
                        Self::set_reg(&mut self.excluded, rd);
                    }
                }
            }
        }
    }

    fn compute_replaceable(&self) -> BitSet {
        let mut replaceable = self.candidates.clone();
        replaceable.subtract(&self.excluded);
        replaceable.intersect_with(&self.in_stack);
        replaceable
    }
}

fn is_replaceable(replaceable: &BitSet, reg: &Reg) -> bool {
    reg.is_virtual() && replaceable.get(reg.virt as usize)
}

/// The register standing in for the promoted slot, memoized per address
/// register and created at the access width.
fn assoc_reg(f: &mut Function, assoc_regs: &mut [Option<u32>], addr: &Reg, size: DataSize) -> Reg {
    match assoc_regs[addr.virt as usize] {
        Some(virt) => Reg::new_virtual(size, virt),
        None => {
            let reg = f.new_reg(size);
            assoc_regs[addr.virt as usize] = Some(reg.virt);
            reg
        }
    }
}

fn apply_conversion(
    f: &mut Function,
    global_insts: &mut u32,
    replaceable: &BitSet,
    assoc_regs: &mut [Option<u32>],
) {
    let mut rewritten = 0usize;
    let nodes: Vec<_> = f.graph.node_indices().collect();
    for node in nodes {
        let mut pos = 0;
        while pos < f.graph[node].insts.len() {
            let id = f.graph[node].insts[pos];
            let Some(inst) = f.inst(id) else {
                pos += 1;
                continue;
            };
            match inst.kind.clone() {
                InstKind::StackAddr { rd, .. } if is_replaceable(replaceable, &rd) => {
                    f.remove_inst_at(node, pos);
                    rewritten += 1;
                    continue;
                }
                InstKind::Load { rd, addr, size } if is_replaceable(replaceable, &addr) => {
                    let ra = assoc_reg(f, assoc_regs, &addr, size);
                    let mov = f.new_inst(global_insts, InstKind::Mov { rd, ra });
                    f.remove_inst_at(node, pos);
                    f.insert_before(node, pos, mov);
                    rewritten += 1;
                }
                InstKind::Store { addr, value, size } if is_replaceable(replaceable, &addr) => {
                    let rd = assoc_reg(f, assoc_regs, &addr, size);
                    let mov = f.new_inst(global_insts, InstKind::Mov { rd, ra: value });
                    f.remove_inst_at(node, pos);
                    f.insert_before(node, pos, mov);
                    rewritten += 1;
                }
                _ => {}
            }
            pos += 1;
        }
    }
    if rewritten > 0 {
        debug!("mem2reg: rewrote {} slot accesses in {}", rewritten, f.name);
    }
}
