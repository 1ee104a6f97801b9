// src/ir/optimizer/dead_code_elimination.rs
//! Dead-code elimination.
//!
//! Any instruction whose destination register is not live out of it is
//! removed, except calls: a call keeps its side effects and only drops the
//! dead destination. Relies on up-to-date per-instruction liveness; the
//! driver recomputes the analyses and repeats until nothing is removed, so
//! chains of dead definitions disappear completely.

use crate::ir::function::Ir;
use crate::ir::instruction::InstKind;
use log::debug;

pub fn dead_code_elim(ir: &mut Ir) -> bool {
    let mut changed = false;
    for function in &mut ir.functions {
        let mut removed = 0usize;
        let mut dropped_dests = 0usize;
        for node in function.sorted_blocks.clone() {
            let mut pos = 0;
            while pos < function.graph[node].insts.len() {
                let id = function.graph[node].insts[pos];
                let Some(inst) = function.inst(id) else {
                    pos += 1;
                    continue;
                };
                let dead = match (inst.dest(), inst.live_out.as_ref()) {
                    (Some(rd), Some(live_out)) => !live_out.get(rd.virt as usize),
                    _ => false,
                };
                if !dead {
                    pos += 1;
                    continue;
                }
                if matches!(inst.kind, InstKind::Call { .. }) {
                    // Keep the call for its side effects.
                    if let Some(inst) = function.inst_mut(id)
                        && let InstKind::Call { rd, .. } = &mut inst.kind
                    {
                        *rd = None;
                        dropped_dests += 1;
                    }
                    pos += 1;
                } else {
                    function.remove_inst_at(node, pos);
                    removed += 1;
                }
            }
        }
        if removed > 0 || dropped_dests > 0 {
            debug!(
                "dead_code_elim: removed {} instructions, dropped {} call destinations in {}",
                removed, dropped_dests, function.name
            );
            changed = true;
        }
    }
    changed
}
