// src/ir/data_flow.rs
//! Liveness and reaching-definitions analyses.
//!
//! Both analyses run per function over the sorted block order the reorder
//! pass produced. Local `gen`/`kill` sets are computed in one pass per
//! block; the global sets are iterated to a fixed point, with the first two
//! iterations performed unconditionally. Convergence is guaranteed because
//! the lattice is finite and the transfer functions are monotone.
//!
//! Liveness (backward):
//!
//! ```text
//! live_out(B) = U live_in(S)  for S in succs(B)
//! live_in (B) = (live_out(B) \ live_kill(B)) U live_gen(B)
//! ```
//!
//! Reaching definitions (forward):
//!
//! ```text
//! reach_in (B) = U reach_out(P)  for P in preds(B)
//! reach_out(B) = (reach_in(B) \ reach_kill(B)) U reach_gen(B)
//! ```
//!
//! Afterwards per-instruction `live_in`/`live_out` and
//! `reach_in`/`reach_out` are derived by walking each block, and every
//! register occurrence receives its defining-instruction set.

use crate::ir::bit_set::BitSet;
use crate::ir::function::{Function, Ir};
use log::trace;

pub fn data_flow(ir: &mut Ir) {
    for function in &mut ir.functions {
        let defs = collect_defs(function);
        assign_definitions(function, &defs);
        compute_local_sets(function, &defs);
        compute_global_live_sets(function);
        compute_global_reach_sets(function);
        compute_inst_live_sets(function);
        compute_inst_reach_sets(function, &defs);
    }
}

/// One set of defining-instruction ids per virtual register index.
fn collect_defs(f: &Function) -> Vec<BitSet> {
    let mut defs = vec![BitSet::zero(f.inst_count as usize); f.reg_count as usize];
    for id in f.sorted_inst_ids() {
        if let Some(inst) = f.inst(id)
            && let Some(rd) = inst.dest()
        {
            defs[rd.virt as usize].set(id.index(), true);
        }
    }
    defs
}

/// Stores the definition set of each register on every copy embedded in the
/// instruction stream; propagation reads them from there.
fn assign_definitions(f: &mut Function, defs: &[BitSet]) {
    for id in f.sorted_inst_ids() {
        let Some(inst) = f.inst_mut(id) else { continue };
        if let Some(rd) = inst.dest_mut() {
            rd.definitions = Some(defs[rd.virt as usize].clone());
        }
        for ra in inst.args_mut() {
            ra.definitions = Some(defs[ra.virt as usize].clone());
        }
    }
}

fn compute_local_sets(f: &mut Function, defs: &[BitSet]) {
    let reg_count = f.reg_count as usize;
    let inst_count = f.inst_count as usize;
    for node in f.sorted_blocks.clone().into_iter().rev() {
        let mut live_gen = BitSet::zero(reg_count);
        let mut live_kill = BitSet::zero(reg_count);
        let mut reach_gen = BitSet::zero(inst_count);
        let mut reach_kill = BitSet::zero(inst_count);

        for &id in &f.graph[node].insts {
            let Some(inst) = f.inst(id) else { continue };
            for ra in inst.args() {
                let virt = ra.virt as usize;
                if !live_kill.get(virt) {
                    live_gen.set(virt, true);
                }
            }
            if let Some(rd) = inst.dest() {
                let virt = rd.virt as usize;
                live_kill.set(virt, true);

                let mut killed = defs[virt].clone();
                killed.set(id.index(), false);
                reach_kill.union_with(&killed);

                reach_gen.subtract(&defs[virt]);
                reach_gen.set(id.index(), true);
            }
        }

        let block = &mut f.graph[node];
        block.live_gen = Some(live_gen);
        block.live_kill = Some(live_kill);
        block.reach_gen = Some(reach_gen);
        block.reach_kill = Some(reach_kill);
    }
}

fn compute_global_live_sets(f: &mut Function) {
    let reg_count = f.reg_count as usize;
    let order = f.sorted_blocks.clone();

    // Temporary vector to detect changes in `live_in`.
    let mut lasts = vec![BitSet::zero(reg_count); order.len()];

    let mut iterations = 0u32;
    let mut changed;
    let mut is_first_loop = true;
    loop {
        // The first two loops are performed unconditionally.
        changed = is_first_loop;
        is_first_loop = false;
        iterations += 1;

        for (i, &node) in order.iter().enumerate() {
            let mut live_out = BitSet::zero(reg_count);
            for succ in f.succs(node) {
                if let Some(succ_in) = &f.graph[succ].live_in {
                    live_out.union_with(succ_in);
                }
            }

            let block = &f.graph[node];
            let mut live_in = live_out.clone();
            live_in.subtract(block.live_kill.as_ref().expect("local sets are computed"));
            live_in.union_with(block.live_gen.as_ref().expect("local sets are computed"));

            changed = changed || live_in != lasts[i];
            lasts[i].copy_from(&live_in);

            let block = &mut f.graph[node];
            block.live_out = Some(live_out);
            block.live_in = Some(live_in);
        }

        if !changed {
            break;
        }
    }
    trace!("data_flow: liveness of {} converged after {} iterations", f.name, iterations);
}

fn compute_global_reach_sets(f: &mut Function) {
    let inst_count = f.inst_count as usize;
    let order = f.sorted_blocks.clone();

    let mut lasts = vec![BitSet::zero(inst_count); order.len()];

    let mut iterations = 0u32;
    let mut changed;
    let mut is_first_loop = true;
    loop {
        changed = is_first_loop;
        is_first_loop = false;
        iterations += 1;

        for (i, &node) in order.iter().enumerate() {
            // The entry block keeps an empty `reach_in`: it has no
            // predecessors.
            let mut reach_in = BitSet::zero(inst_count);
            for pred in f.preds(node) {
                if let Some(pred_out) = &f.graph[pred].reach_out {
                    reach_in.union_with(pred_out);
                }
            }

            let block = &f.graph[node];
            let mut reach_out = reach_in.clone();
            reach_out.subtract(block.reach_kill.as_ref().expect("local sets are computed"));
            reach_out.union_with(block.reach_gen.as_ref().expect("local sets are computed"));

            changed = changed || reach_out != lasts[i];
            lasts[i].copy_from(&reach_out);

            let block = &mut f.graph[node];
            block.reach_in = Some(reach_in);
            block.reach_out = Some(reach_out);
        }

        if !changed {
            break;
        }
    }
    trace!("data_flow: reaching defs of {} converged after {} iterations", f.name, iterations);
}

/// Derives per-instruction liveness by walking each block backward from its
/// `live_out`, subtracting the destination and adding the source operands
/// before each instruction.
fn compute_inst_live_sets(f: &mut Function) {
    for node in f.sorted_blocks.clone() {
        let ids = f.graph[node].insts.clone();
        let mut live = f.graph[node].live_out.clone().expect("global sets are computed");
        for &id in ids.iter().rev() {
            let Some(inst) = f.inst_mut(id) else { continue };
            inst.live_out = Some(live.clone());
            if let Some(rd) = inst.dest() {
                let virt = rd.virt as usize;
                live.set(virt, false);
            }
            let arg_virts: Vec<usize> = inst.args().iter().map(|ra| ra.virt as usize).collect();
            for virt in arg_virts {
                live.set(virt, true);
            }
            let Some(inst) = f.inst_mut(id) else { continue };
            inst.live_in = Some(live.clone());
        }
    }
}

/// Derives per-instruction reaching sets by walking each block forward from
/// its `reach_in`.
fn compute_inst_reach_sets(f: &mut Function, defs: &[BitSet]) {
    for node in f.sorted_blocks.clone() {
        let ids = f.graph[node].insts.clone();
        let mut reach = f.graph[node].reach_in.clone().expect("global sets are computed");
        for &id in &ids {
            let dest_virt = f.inst(id).and_then(|inst| inst.dest()).map(|rd| rd.virt as usize);
            let Some(inst) = f.inst_mut(id) else { continue };
            inst.reach_in = Some(reach.clone());
            if let Some(virt) = dest_virt {
                reach.subtract(&defs[virt]);
                reach.set(id.index(), true);
            }
            inst.reach_out = Some(reach.clone());
        }
    }
}
