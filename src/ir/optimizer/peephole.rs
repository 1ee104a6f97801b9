// src/ir/optimizer/peephole.rs
//! Purely local rewrites on immediate-form binaries.
//!
//! Runs after propagation has exposed the immediate forms: adding zero and
//! multiplying by one are moves.

use crate::ir::function::Ir;
use crate::ir::instruction::InstKind;
use crate::ops::ArithOp;
use log::debug;

pub fn peephole(ir: &mut Ir) -> bool {
    let mut changed = false;
    for function in &mut ir.functions {
        let mut rewritten = 0usize;
        for slot in &mut function.insts {
            let Some(inst) = slot.as_mut() else { continue };
            let replacement = match &inst.kind {
                InstKind::BinImm { op: ArithOp::Add, rd, lhs, imm: 0 }
                | InstKind::BinImm { op: ArithOp::Mul, rd, lhs, imm: 1 } => {
                    Some(InstKind::Mov { rd: rd.clone(), ra: lhs.clone() })
                }
                _ => None,
            };
            if let Some(kind) = replacement {
                inst.kind = kind;
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            debug!("peephole: rewrote {} identities in {}", rewritten, function.name);
            changed = true;
        }
    }
    changed
}
