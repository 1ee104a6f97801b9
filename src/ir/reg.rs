// src/ir/reg.rs
use crate::asm::target::MachineReg;
use crate::ir::bit_set::BitSet;
use crate::types::DataSize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegKind {
    /// Allocated by lowering and the passes; rewritten by the allocator.
    Virtual,
    /// Carries a machine register assigned by linear scan.
    Physical,
    /// Pinned to a machine register by the calling convention before
    /// allocation; the allocator reserves its machine register instead of
    /// assigning one.
    Fixed,
}

/// A virtual-or-physical operand.
///
/// Registers are value-like and freely copied; each copy embedded in an
/// instruction owns the defining-instruction set that reaching definitions
/// populates on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reg {
    pub kind: RegKind,
    /// Dense per-function virtual index; meaningful for every kind.
    pub virt: u32,
    /// Machine register, present once allocated or when the kind is fixed.
    pub real: Option<MachineReg>,
    pub size: DataSize,
    /// Forbids propagation across this register.
    pub sticky: bool,
    /// Stack slot assigned when the allocator spills this register.
    pub spill_slot: Option<u32>,
    /// Ids of the instructions defining this register, populated by
    /// reaching definitions.
    pub definitions: Option<BitSet>,
}

impl Reg {
    pub fn new_virtual(size: DataSize, virt: u32) -> Self {
        Reg { kind: RegKind::Virtual, virt, real: None, size, sticky: false, spill_slot: None, definitions: None }
    }

    /// A register pinned to `real` by the calling convention. Fixed
    /// registers are sticky: values never propagate across a convention
    /// boundary.
    pub fn new_fixed(size: DataSize, virt: u32, real: MachineReg) -> Self {
        Reg { kind: RegKind::Fixed, virt, real: Some(real), size, sticky: true, spill_slot: None, definitions: None }
    }

    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.kind == RegKind::Virtual
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.kind == RegKind::Fixed
    }

    #[inline]
    pub fn is_spilled(&self) -> bool {
        self.spill_slot.is_some()
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegKind::Virtual => {
                if let Some(slot) = self.spill_slot {
                    write!(f, "v{}[s{}]", self.virt, slot)
                } else {
                    write!(f, "v{}", self.virt)
                }
            }
            RegKind::Physical => match self.real {
                Some(real) => real.fmt(f),
                None => write!(f, "r?{}", self.virt),
            },
            RegKind::Fixed => match self.real {
                Some(real) => write!(f, "${real}"),
                None => write!(f, "$?{}", self.virt),
            },
        }
    }
}
