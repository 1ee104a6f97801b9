// src/asm/target.rs
//! The fixed integer-register machine the middle-end shapes code for.
//!
//! A single x86-64-flavoured target: a pool of general-purpose registers
//! identified by dense index, with the argument and return registers of the
//! calling convention listed as fixed.

use std::fmt;

/// General-purpose machine registers available for allocation.
///
/// RSP and RBP are excluded: they are reserved for the stack discipline the
/// external emitter maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineReg {
    Rax,
    Rdi,
    Rsi,
    Rdx,
    Rcx,
    R8,
    R9,
    R10,
    R11,
}

/// Number of allocatable machine registers.
pub const NUM_REGS: usize = 9;

/// Argument registers of the calling convention, in argument order.
pub const ARG_REGS: [MachineReg; 6] =
    [MachineReg::Rdi, MachineReg::Rsi, MachineReg::Rdx, MachineReg::Rcx, MachineReg::R8, MachineReg::R9];

/// Return-value register of the calling convention.
pub const RET_REG: MachineReg = MachineReg::Rax;

impl MachineReg {
    /// Dense index into the machine register pool.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            MachineReg::Rax => 0,
            MachineReg::Rdi => 1,
            MachineReg::Rsi => 2,
            MachineReg::Rdx => 3,
            MachineReg::Rcx => 4,
            MachineReg::R8 => 5,
            MachineReg::R9 => 6,
            MachineReg::R10 => 7,
            MachineReg::R11 => 8,
        }
    }

    pub fn from_index(index: usize) -> Option<MachineReg> {
        match index {
            0 => Some(MachineReg::Rax),
            1 => Some(MachineReg::Rdi),
            2 => Some(MachineReg::Rsi),
            3 => Some(MachineReg::Rdx),
            4 => Some(MachineReg::Rcx),
            5 => Some(MachineReg::R8),
            6 => Some(MachineReg::R9),
            7 => Some(MachineReg::R10),
            8 => Some(MachineReg::R11),
            _ => None,
        }
    }
}

impl fmt::Display for MachineReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineReg::Rax => f.write_str("rax"),
            MachineReg::Rdi => f.write_str("rdi"),
            MachineReg::Rsi => f.write_str("rsi"),
            MachineReg::Rdx => f.write_str("rdx"),
            MachineReg::Rcx => f.write_str("rcx"),
            MachineReg::R8 => f.write_str("r8"),
            MachineReg::R9 => f.write_str("r9"),
            MachineReg::R10 => f.write_str("r10"),
            MachineReg::R11 => f.write_str("r11"),
        }
    }
}
