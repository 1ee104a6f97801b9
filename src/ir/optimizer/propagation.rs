// src/ir/optimizer/propagation.rs
//! Constant and copy propagation with branch folding.
//!
//! Runs instruction-by-instruction in reverse order so later uses observe
//! the unrewritten definitions first. A register has a known immediate when
//! it has exactly one reaching definition, is not sticky, and that
//! definition is an `IMM`; binaries and compares fold or collapse to their
//! immediate forms, branches on known conditions fold and rewrite the CFG,
//! and `BR` fuses with the `ZEXT`/`CMP`/`CMP_IMM` chain feeding it.
//!
//! Copy propagation substitutes a move's source at the use. When the
//! source's definitions do not reach the use, a fresh register is defined
//! by a move placed immediately before the original definition and
//! substituted instead; the fresh register is sticky so later rounds leave
//! it alone.

use crate::ir::function::{Function, Ir};
use crate::ir::instruction::{InstId, InstKind};
use crate::ir::reg::Reg;
use crate::ops::CompareOp;
use log::debug;
use petgraph::stable_graph::NodeIndex;

/// Returns true when any rewrite happened; the driver re-runs the analyses
/// and iterates until the IR is stable.
pub fn propagation(ir: &mut Ir) -> bool {
    let mut changed = false;
    let Ir { functions, inst_count, .. } = ir;
    for function in functions {
        changed |= propagation_function(function, inst_count);
    }
    changed
}

fn propagation_function(f: &mut Function, global_insts: &mut u32) -> bool {
    let mut env = Env { changed: false };
    for &node in f.sorted_blocks.clone().iter().rev() {
        for &id in f.graph[node].insts.clone().iter().rev() {
            if f.inst(id).is_none() {
                continue;
            }
            env.perform_propagation(f, global_insts, node, id);
        }
    }
    if env.changed {
        debug!("propagation: rewrote instructions in {}", f.name);
    }
    env.changed
}

struct Env {
    changed: bool,
}

impl Env {
    /// The single reaching definition of `r`, unless `r` is sticky.
    fn get_one_def(&self, f: &Function, r: &Reg) -> Option<InstId> {
        let definitions = r.definitions.as_ref()?;
        if definitions.count() != 1 || r.sticky {
            return None;
        }
        let id = InstId(definitions.first_set()? as u32);
        f.inst(id).map(|_| id)
    }

    fn get_imm(&self, f: &Function, r: &Reg) -> Option<i64> {
        let def = self.get_one_def(f, r)?;
        match f.inst(def)?.kind {
            InstKind::Imm { imm, .. } => Some(imm),
            _ => None,
        }
    }

    /// Folds a branch whose condition is known: the untaken edge is
    /// disconnected and the instruction becomes a `JUMP` to the taken
    /// successor.
    fn elim_branch(
        &mut self,
        f: &mut Function,
        block: NodeIndex,
        id: InstId,
        taken: bool,
        then_: NodeIndex,
        else_: NodeIndex,
    ) {
        let (selected, discarded) = if taken { (then_, else_) } else { (else_, then_) };
        if discarded != selected {
            f.disconnect(block, discarded);
        }
        if let Some(inst) = f.inst_mut(id) {
            inst.kind = InstKind::Jump { target: selected };
        }
        self.changed = true;
    }

    /// The register to substitute for `r` (the source of `def`) at `inst`.
    ///
    /// When no definition of `r` reaches `inst`, the substitution would read
    /// a different value: a fresh sticky register is defined by a `MOV`
    /// right before `def` and used instead.
    fn obtain_propagated_reg(
        &mut self,
        f: &mut Function,
        global_insts: &mut u32,
        inst: InstId,
        def: InstId,
        r: &Reg,
    ) -> Option<Reg> {
        let reach_in = f.inst(inst)?.reach_in.as_ref()?;
        let mut available = r.definitions.clone()?;
        available.intersect_with(reach_in);

        if available.count() == 0 {
            let mut escape_reg = f.new_reg(r.size);
            escape_reg.sticky = true;
            let mov = f.new_inst(global_insts, InstKind::Mov { rd: escape_reg.clone(), ra: r.clone() });
            let (def_block, def_pos) = f.find_inst(def)?;
            f.insert_before(def_block, def_pos, mov);
            Some(escape_reg)
        } else {
            Some(r.clone())
        }
    }

    /// Copy propagation of `def`'s single source operand into `inst`.
    /// Fixed sources never propagate.
    fn copy_propagation(
        &mut self,
        f: &mut Function,
        global_insts: &mut u32,
        inst: InstId,
        def: InstId,
    ) -> Option<Reg> {
        let r = f.inst(def)?.args().first().copied()?.clone();
        if r.is_fixed() {
            return None;
        }
        self.obtain_propagated_reg(f, global_insts, inst, def, &r)
    }

    fn copy_propagation2(
        &mut self,
        f: &mut Function,
        global_insts: &mut u32,
        inst: InstId,
        def: InstId,
    ) -> Option<(Reg, Reg)> {
        let (r0, r1) = {
            let args = f.inst(def)?.args();
            ((*args.first()?).clone(), (*args.get(1)?).clone())
        };
        if r0.is_fixed() || r1.is_fixed() {
            return None;
        }
        let out0 = self.obtain_propagated_reg(f, global_insts, inst, def, &r0)?;
        let out1 = self.obtain_propagated_reg(f, global_insts, inst, def, &r1)?;
        Some((out0, out1))
    }

    fn perform_propagation(&mut self, f: &mut Function, global_insts: &mut u32, block: NodeIndex, id: InstId) {
        let kind = match f.inst(id) {
            Some(inst) => inst.kind.clone(),
            None => return,
        };
        match kind {
            InstKind::Mov { rd, ra } => {
                if let Some(imm) = self.get_imm(f, &ra) {
                    self.rewrite(f, id, InstKind::Imm { rd, imm });
                }
            }
            InstKind::Bin { op, rd, lhs, rhs } => {
                if let Some(rhs_imm) = self.get_imm(f, &rhs) {
                    if let Some(lhs_imm) = self.get_imm(f, &lhs) {
                        // Foldable.
                        self.rewrite(f, id, InstKind::Imm { rd, imm: op.eval(lhs_imm, rhs_imm) });
                    } else {
                        // Not foldable, but able to propagate.
                        self.rewrite(f, id, InstKind::BinImm { op, rd, lhs, imm: rhs_imm });
                    }
                }
            }
            InstKind::BinImm { op, rd, lhs, imm } => {
                if let Some(lhs_imm) = self.get_imm(f, &lhs) {
                    self.rewrite(f, id, InstKind::Imm { rd, imm: op.eval(lhs_imm, imm) });
                }
            }
            InstKind::Cmp { pred, rd, lhs, rhs } => {
                if let Some(rhs_imm) = self.get_imm(f, &rhs) {
                    if let Some(lhs_imm) = self.get_imm(f, &lhs) {
                        self.rewrite(f, id, InstKind::Imm { rd, imm: pred.eval(lhs_imm, rhs_imm) as i64 });
                    } else {
                        self.rewrite(f, id, InstKind::CmpImm { pred, rd, lhs, imm: rhs_imm });
                    }
                }
            }
            InstKind::CmpImm { pred, rd, lhs, imm } => {
                if let Some(lhs_imm) = self.get_imm(f, &lhs) {
                    self.rewrite(f, id, InstKind::Imm { rd, imm: pred.eval(lhs_imm, imm) as i64 });
                }
            }
            InstKind::BrCmp { pred, lhs, rhs, then_, else_ } => {
                if let Some(rhs_imm) = self.get_imm(f, &rhs) {
                    if let Some(lhs_imm) = self.get_imm(f, &lhs) {
                        self.elim_branch(f, block, id, pred.eval(lhs_imm, rhs_imm), then_, else_);
                    } else {
                        self.rewrite(f, id, InstKind::BrCmpImm { pred, lhs, imm: rhs_imm, then_, else_ });
                    }
                }
            }
            InstKind::BrCmpImm { pred, lhs, imm, then_, else_ } => {
                if let Some(lhs_imm) = self.get_imm(f, &lhs) {
                    self.elim_branch(f, block, id, pred.eval(lhs_imm, imm), then_, else_);
                }
            }
            InstKind::Trunc { rd, opr } => {
                // A truncation of a zero-extension reads the original value.
                if let Some(def) = self.get_one_def(f, &opr)
                    && matches!(f.inst(def).map(|i| &i.kind), Some(InstKind::Zext { .. }))
                    && let Some(rr) = self.copy_propagation(f, global_insts, id, def)
                {
                    self.rewrite(f, id, InstKind::Mov { rd, ra: rr });
                }
            }
            InstKind::Br { cond, then_, else_ } => {
                self.propagate_branch(f, global_insts, block, id, &cond, then_, else_);
            }
            _ => {}
        }

        self.propagate_copies_into_operands(f, global_insts, id);
    }

    /// `BR` fusion: a branch fed by a single `ZEXT`, `CMP`, `CMP_IMM` or
    /// `IMM` absorbs it.
    fn propagate_branch(
        &mut self,
        f: &mut Function,
        global_insts: &mut u32,
        block: NodeIndex,
        id: InstId,
        cond: &Reg,
        then_: NodeIndex,
        else_: NodeIndex,
    ) {
        let Some(def) = self.get_one_def(f, cond) else { return };
        let def_kind = match f.inst(def) {
            Some(inst) => inst.kind.clone(),
            None => return,
        };
        match def_kind {
            InstKind::Imm { imm, .. } => {
                self.elim_branch(f, block, id, imm != 0, then_, else_);
            }
            InstKind::Zext { .. } => {
                if let Some(rr) = self.copy_propagation(f, global_insts, id, def) {
                    self.rewrite(f, id, InstKind::Br { cond: rr, then_, else_ });
                }
            }
            InstKind::Cmp { pred, .. } => {
                if let Some((r0, r1)) = self.copy_propagation2(f, global_insts, id, def) {
                    self.rewrite(f, id, InstKind::BrCmp { pred, lhs: r0, rhs: r1, then_, else_ });
                }
            }
            InstKind::CmpImm { pred, imm, .. } => {
                if let Some(rr) = self.copy_propagation(f, global_insts, id, def) {
                    if imm == 0 && pred == CompareOp::Eq {
                        // Branch on "is zero": swap the targets instead of
                        // keeping the compare.
                        self.rewrite(f, id, InstKind::Br { cond: rr, then_: else_, else_: then_ });
                    } else if imm == 0 && pred == CompareOp::Ne {
                        self.rewrite(f, id, InstKind::Br { cond: rr, then_, else_ });
                    } else {
                        self.rewrite(f, id, InstKind::BrCmpImm { pred, lhs: rr, imm, then_, else_ });
                    }
                }
            }
            _ => {}
        }
    }

    /// Generic copy propagation: any operand whose sole reaching definition
    /// is a `MOV` is replaced with the move's source.
    fn propagate_copies_into_operands(&mut self, f: &mut Function, global_insts: &mut u32, id: InstId) {
        let arg_count = match f.inst(id) {
            Some(inst) => inst.args().len(),
            None => return,
        };
        for i in 0..arg_count {
            let ra = match f.inst(id) {
                Some(inst) => match inst.args().get(i) {
                    Some(ra) => (*ra).clone(),
                    None => continue,
                },
                None => return,
            };
            let Some(def) = self.get_one_def(f, &ra) else { continue };
            if !matches!(f.inst(def).map(|inst| &inst.kind), Some(InstKind::Mov { .. })) {
                continue;
            }
            if let Some(rr) = self.copy_propagation(f, global_insts, id, def) {
                if let Some(inst) = f.inst_mut(id)
                    && let Some(slot) = inst.args_mut().into_iter().nth(i)
                {
                    *slot = rr;
                    self.changed = true;
                }
            }
        }
    }

    fn rewrite(&mut self, f: &mut Function, id: InstId, kind: InstKind) {
        if let Some(inst) = f.inst_mut(id) {
            inst.kind = kind;
            self.changed = true;
        }
    }
}
