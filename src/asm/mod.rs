// src/asm/mod.rs
//! Target shaping and register allocation.
//!
//! The passes that make the IR consumable by the external assembly emitter:
//! two-address shaping for the binary/unary encodings the target requires,
//! then linear-scan allocation onto the machine register pool described in
//! [`target`].
pub mod reg_alloc;
pub mod target;
pub mod two_address;

use crate::error::compile_error::CompileError;
use crate::ir::Ir;
use crate::ir::data_flow::data_flow;
use crate::ir::reorder::reorder_blocks;

/// Shapes the optimized IR for the target and allocates registers.
pub fn lower_to_machine(ir: &mut Ir) -> Result<(), CompileError> {
    two_address::two_address(ir);
    reorder_blocks(ir);
    data_flow(ir);
    reg_alloc::reg_alloc(target::NUM_REGS, ir)
}
