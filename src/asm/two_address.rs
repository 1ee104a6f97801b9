// src/asm/two_address.rs
//! Two-address shaping.
//!
//! The target encodes binaries and unaries with the destination doubling as
//! the first source. Every three-address `BIN rd <- lhs op rhs` becomes
//! `MOV rd <- lhs; BIN rd <- rd op rhs`, and `UNA rd <- opr` becomes
//! `MOV rd <- opr; UNA rd <- rd`; both replacement instructions receive
//! fresh local and global ids. After this pass no `BIN` or `UNA` has a
//! destination different from its first source.

use crate::ir::{Function, InstKind, Ir};
use log::debug;

pub fn two_address(ir: &mut Ir) {
    let Ir { functions, inst_count, .. } = ir;
    for function in functions {
        transform_function(function, inst_count);
    }
}

fn transform_function(f: &mut Function, global_insts: &mut u32) {
    let mut expanded = 0usize;
    let nodes: Vec<_> = f.graph.node_indices().collect();
    for node in nodes {
        let ids = f.graph[node].insts.clone();
        let mut rebuilt = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(inst) = f.inst(id) else { continue };
            match inst.kind.clone() {
                InstKind::Bin { op, rd, lhs, rhs } => {
                    f.insts[id.index()] = None;
                    let mov = f.new_inst(global_insts, InstKind::Mov { rd: rd.clone(), ra: lhs });
                    let bin =
                        f.new_inst(global_insts, InstKind::Bin { op, rd: rd.clone(), lhs: rd, rhs });
                    rebuilt.push(mov);
                    rebuilt.push(bin);
                    expanded += 1;
                }
                InstKind::Una { op, rd, opr } => {
                    f.insts[id.index()] = None;
                    let mov = f.new_inst(global_insts, InstKind::Mov { rd: rd.clone(), ra: opr });
                    let una = f.new_inst(global_insts, InstKind::Una { op, rd: rd.clone(), opr: rd });
                    rebuilt.push(mov);
                    rebuilt.push(una);
                    expanded += 1;
                }
                _ => rebuilt.push(id),
            }
        }
        f.graph[node].insts = rebuilt;
    }
    if expanded > 0 {
        debug!("two_address: expanded {} instructions in {}", expanded, f.name);
    }
}
