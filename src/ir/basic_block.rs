// src/ir/basic_block.rs
use crate::ir::bit_set::BitSet;
use crate::ir::instruction::InstId;
use std::fmt;

/// A straight-line code region with exactly one entry and one terminator.
///
/// The block owns the ordered list of its instruction ids; the instructions
/// themselves live in the owning function's arena. Predecessor and successor
/// edges live in the function's block graph.
///
/// Invariants: the first instruction is a `LABEL` whose id matches
/// `global_id`; the last instruction is the block's only terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Unique per IR, assigned at creation and never changed.
    pub global_id: u32,
    /// Dense per-function id, assigned by the reorder pass.
    pub local_id: u32,
    /// Position of this block in the function's sorted-blocks vector.
    pub sorted_index: usize,
    pub insts: Vec<InstId>,
    pub live_gen: Option<BitSet>,
    pub live_kill: Option<BitSet>,
    pub live_in: Option<BitSet>,
    pub live_out: Option<BitSet>,
    pub reach_gen: Option<BitSet>,
    pub reach_kill: Option<BitSet>,
    pub reach_in: Option<BitSet>,
    pub reach_out: Option<BitSet>,
}

impl BasicBlock {
    pub fn new(global_id: u32) -> Self {
        BasicBlock {
            global_id,
            local_id: 0,
            sorted_index: 0,
            insts: Vec::new(),
            live_gen: None,
            live_kill: None,
            live_in: None,
            live_out: None,
            reach_gen: None,
            reach_kill: None,
            reach_in: None,
            reach_out: None,
        }
    }

    #[inline]
    pub fn first_inst(&self) -> Option<InstId> {
        self.insts.first().copied()
    }

    #[inline]
    pub fn last_inst(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    /// Drops every analysis set on this block.
    pub fn release_analysis(&mut self) {
        self.live_gen = None;
        self.live_kill = None;
        self.live_in = None;
        self.live_out = None;
        self.reach_gen = None;
        self.reach_kill = None;
        self.reach_in = None;
        self.reach_out = None;
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.global_id)
    }
}
