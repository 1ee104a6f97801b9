// src/ir/instruction.rs
use crate::ir::bit_set::BitSet;
use crate::ir::reg::Reg;
use crate::ops::{ArithOp, CompareOp, UnaryOp};
use crate::types::DataSize;
use petgraph::stable_graph::NodeIndex;
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::sync::Arc;

/// Dense per-function instruction id; doubles as the index into the owning
/// function's instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl InstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One variant per opcode, carrying exactly its fields.
///
/// Jump targets (`then_`, `else_`, `target`) are non-owning references into
/// the owning function's block graph.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Mov { rd: Reg, ra: Reg },
    Imm { rd: Reg, imm: i64 },
    Bin { op: ArithOp, rd: Reg, lhs: Reg, rhs: Reg },
    BinImm { op: ArithOp, rd: Reg, lhs: Reg, imm: i64 },
    Una { op: UnaryOp, rd: Reg, opr: Reg },
    Cmp { pred: CompareOp, rd: Reg, lhs: Reg, rhs: Reg },
    CmpImm { pred: CompareOp, rd: Reg, lhs: Reg, imm: i64 },
    Br { cond: Reg, then_: NodeIndex, else_: NodeIndex },
    BrCmp { pred: CompareOp, lhs: Reg, rhs: Reg, then_: NodeIndex, else_: NodeIndex },
    BrCmpImm { pred: CompareOp, lhs: Reg, imm: i64, then_: NodeIndex, else_: NodeIndex },
    Jump { target: NodeIndex },
    /// Block entry marker; `id` matches the owning block's global id.
    Label { id: u32 },
    Ret { value: Option<Reg> },
    Call { rd: Option<Reg>, func: Arc<str>, args: Vec<Reg> },
    Load { rd: Reg, addr: Reg, size: DataSize },
    Store { addr: Reg, value: Reg, size: DataSize },
    /// Materializes the address of a function stack slot.
    StackAddr { rd: Reg, slot: u32 },
    Trunc { rd: Reg, opr: Reg },
    Zext { rd: Reg, opr: Reg },
}

/// An IR instruction: a local id unique and dense per function, a global id
/// unique per IR, the opcode with its fields, and the analysis payload the
/// data-flow passes populate.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub local_id: InstId,
    pub global_id: u32,
    pub kind: InstKind,
    pub live_in: Option<BitSet>,
    pub live_out: Option<BitSet>,
    pub reach_in: Option<BitSet>,
    pub reach_out: Option<BitSet>,
}

impl Inst {
    pub fn new(local_id: InstId, global_id: u32, kind: InstKind) -> Self {
        Inst { local_id, global_id, kind, live_in: None, live_out: None, reach_in: None, reach_out: None }
    }

    /// Terminators end a block: every block's last instruction is one of
    /// these and no other instruction is.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Jump { .. }
                | InstKind::Br { .. }
                | InstKind::BrCmp { .. }
                | InstKind::BrCmpImm { .. }
                | InstKind::Ret { .. }
        )
    }

    /// Destination register, if the opcode writes one.
    pub fn dest(&self) -> Option<&Reg> {
        match &self.kind {
            InstKind::Mov { rd, .. }
            | InstKind::Imm { rd, .. }
            | InstKind::Bin { rd, .. }
            | InstKind::BinImm { rd, .. }
            | InstKind::Una { rd, .. }
            | InstKind::Cmp { rd, .. }
            | InstKind::CmpImm { rd, .. }
            | InstKind::Load { rd, .. }
            | InstKind::StackAddr { rd, .. }
            | InstKind::Trunc { rd, .. }
            | InstKind::Zext { rd, .. } => Some(rd),
            InstKind::Call { rd, .. } => rd.as_ref(),
            _ => None,
        }
    }

    pub fn dest_mut(&mut self) -> Option<&mut Reg> {
        match &mut self.kind {
            InstKind::Mov { rd, .. }
            | InstKind::Imm { rd, .. }
            | InstKind::Bin { rd, .. }
            | InstKind::BinImm { rd, .. }
            | InstKind::Una { rd, .. }
            | InstKind::Cmp { rd, .. }
            | InstKind::CmpImm { rd, .. }
            | InstKind::Load { rd, .. }
            | InstKind::StackAddr { rd, .. }
            | InstKind::Trunc { rd, .. }
            | InstKind::Zext { rd, .. } => Some(rd),
            InstKind::Call { rd, .. } => rd.as_mut(),
            _ => None,
        }
    }

    /// Source-register operands in operand order.
    pub fn args(&self) -> SmallVec<[&Reg; 2]> {
        match &self.kind {
            InstKind::Mov { ra, .. } => smallvec![ra],
            InstKind::Bin { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => smallvec![lhs, rhs],
            InstKind::BinImm { lhs, .. } | InstKind::CmpImm { lhs, .. } => smallvec![lhs],
            InstKind::Una { opr, .. } | InstKind::Trunc { opr, .. } | InstKind::Zext { opr, .. } => {
                smallvec![opr]
            }
            InstKind::Br { cond, .. } => smallvec![cond],
            InstKind::BrCmp { lhs, rhs, .. } => smallvec![lhs, rhs],
            InstKind::BrCmpImm { lhs, .. } => smallvec![lhs],
            InstKind::Ret { value } => value.iter().collect(),
            InstKind::Call { args, .. } => args.iter().collect(),
            InstKind::Load { addr, .. } => smallvec![addr],
            InstKind::Store { addr, value, .. } => smallvec![addr, value],
            InstKind::Imm { .. } | InstKind::Jump { .. } | InstKind::Label { .. } | InstKind::StackAddr { .. } => {
                SmallVec::new()
            }
        }
    }

    pub fn args_mut(&mut self) -> SmallVec<[&mut Reg; 2]> {
        match &mut self.kind {
            InstKind::Mov { ra, .. } => smallvec![ra],
            InstKind::Bin { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => smallvec![lhs, rhs],
            InstKind::BinImm { lhs, .. } | InstKind::CmpImm { lhs, .. } => smallvec![lhs],
            InstKind::Una { opr, .. } | InstKind::Trunc { opr, .. } | InstKind::Zext { opr, .. } => {
                smallvec![opr]
            }
            InstKind::Br { cond, .. } => smallvec![cond],
            InstKind::BrCmp { lhs, rhs, .. } => smallvec![lhs, rhs],
            InstKind::BrCmpImm { lhs, .. } => smallvec![lhs],
            InstKind::Ret { value } => value.iter_mut().collect(),
            InstKind::Call { args, .. } => args.iter_mut().collect(),
            InstKind::Load { addr, .. } => smallvec![addr],
            InstKind::Store { addr, value, .. } => smallvec![addr, value],
            InstKind::Imm { .. } | InstKind::Jump { .. } | InstKind::Label { .. } | InstKind::StackAddr { .. } => {
                SmallVec::new()
            }
        }
    }

    /// Successor blocks this instruction transfers control to.
    pub fn branch_targets(&self) -> SmallVec<[NodeIndex; 2]> {
        match &self.kind {
            InstKind::Jump { target } => smallvec![*target],
            InstKind::Br { then_, else_, .. }
            | InstKind::BrCmp { then_, else_, .. }
            | InstKind::BrCmpImm { then_, else_, .. } => smallvec![*then_, *else_],
            _ => SmallVec::new(),
        }
    }

    /// Drops any analysis payload this instruction carries.
    pub fn release_analysis(&mut self) {
        self.live_in = None;
        self.live_out = None;
        self.reach_in = None;
        self.reach_out = None;
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstKind::Mov { rd, ra } => write!(f, "MOV {rd} <- {ra}"),
            InstKind::Imm { rd, imm } => write!(f, "IMM {rd} <- {imm}"),
            InstKind::Bin { op, rd, lhs, rhs } => write!(f, "BIN {rd} <- {lhs} {op} {rhs}"),
            InstKind::BinImm { op, rd, lhs, imm } => write!(f, "BIN_IMM {rd} <- {lhs} {op} {imm}"),
            InstKind::Una { op, rd, opr } => write!(f, "UNA {rd} <- {op}{opr}"),
            InstKind::Cmp { pred, rd, lhs, rhs } => write!(f, "CMP {rd} <- {lhs} {pred} {rhs}"),
            InstKind::CmpImm { pred, rd, lhs, imm } => write!(f, "CMP_IMM {rd} <- {lhs} {pred} {imm}"),
            InstKind::Br { cond, then_, else_ } => {
                write!(f, "BR {cond} then:{} else:{}", then_.index(), else_.index())
            }
            InstKind::BrCmp { pred, lhs, rhs, then_, else_ } => {
                write!(f, "BR_CMP {lhs} {pred} {rhs} then:{} else:{}", then_.index(), else_.index())
            }
            InstKind::BrCmpImm { pred, lhs, imm, then_, else_ } => {
                write!(f, "BR_CMP_IMM {lhs} {pred} {imm} then:{} else:{}", then_.index(), else_.index())
            }
            InstKind::Jump { target } => write!(f, "JUMP {}", target.index()),
            InstKind::Label { id } => write!(f, "LABEL b{id}"),
            InstKind::Ret { value: Some(value) } => write!(f, "RET {value}"),
            InstKind::Ret { value: None } => write!(f, "RET"),
            InstKind::Call { rd, func, args } => {
                let args_str = args.iter().map(Reg::to_string).collect::<Vec<_>>().join(", ");
                match rd {
                    Some(rd) => write!(f, "CALL {rd} <- {func}({args_str})"),
                    None => write!(f, "CALL {func}({args_str})"),
                }
            }
            InstKind::Load { rd, addr, size } => write!(f, "LOAD{size} {rd} <- *{addr}"),
            InstKind::Store { addr, value, size } => write!(f, "STORE{size} *{addr} <- {value}"),
            InstKind::StackAddr { rd, slot } => write!(f, "STACK_ADDR {rd} <- #{slot}"),
            InstKind::Trunc { rd, opr } => write!(f, "TRUNC {rd} <- {opr}"),
            InstKind::Zext { rd, opr } => write!(f, "ZEXT {rd} <- {opr}"),
        }
    }
}
