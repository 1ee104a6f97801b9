// src/ir/optimizer/mod.rs
//! Optimization pipeline.
//!
//! Pass ordering is the concurrency contract of the middle-end: each pass
//! observes the IR strictly after the previous one has returned, and every
//! CFG-mutating pass invalidates the analysis payloads, so the driver
//! recomputes block order and data flow before any pass that reads them.

mod dead_code_elimination;
mod mem2reg;
mod merge_blocks;
mod peephole;
mod propagation;

pub use dead_code_elimination::dead_code_elim;
pub use mem2reg::mem2reg;
pub use merge_blocks::merge_blocks;
pub use peephole::peephole;
pub use propagation::propagation;

use crate::error::compile_error::CompileError;
use crate::ir::data_flow::data_flow;
use crate::ir::function::Ir;
use crate::ir::reorder::reorder_blocks;
use log::debug;

/// Copy cycles carried around loops never settle; the rewrite rounds are
/// bounded instead of iterated blindly.
const MAX_PROPAGATION_ROUNDS: u32 = 16;

pub fn optimize(ir: &mut Ir) -> Result<(), CompileError> {
    debug!("optimizer: start");
    reorder_blocks(ir);
    data_flow(ir);
    mem2reg(ir);

    for round in 0..MAX_PROPAGATION_ROUNDS {
        reorder_blocks(ir);
        data_flow(ir);
        let mut changed = propagation(ir);
        changed |= peephole(ir);
        if !changed {
            debug!("optimizer: propagation stable after {} rounds", round);
            break;
        }
    }

    loop {
        reorder_blocks(ir);
        data_flow(ir);
        if !dead_code_elim(ir) {
            break;
        }
    }

    merge_blocks(ir)?;
    reorder_blocks(ir);
    data_flow(ir);
    debug!("optimizer: done");
    Ok(())
}
