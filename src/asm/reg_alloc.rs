// src/asm/reg_alloc.rs
//! Linear-scan register allocation.
//!
//! One pass over the live intervals sorted by start, with an active list
//! sorted by interval end. Expired intervals free their machine register;
//! when the machine set is exhausted the interval living furthest wins the
//! register and the other is spilled to a stack slot (Poletto-Sarkar).
//! Registers pinned by the calling convention are pre-reserved in the
//! machine set before scanning.
//!
//! After allocation every register occurrence in the IR is physical or
//! spilled with a stack slot, the shape the assembly emitter requires.

use crate::asm::target::MachineReg;
use crate::error::compile_error::CompileError;
use crate::ir::{Function, Ir, Reg, RegKind};
use crate::ir::interval::{Interval, build_intervals};
use log::debug;

pub fn reg_alloc(num_regs: usize, ir: &mut Ir) -> Result<(), CompileError> {
    for function in &mut ir.functions {
        let intervals = build_intervals(function);
        let assignment = allocate_function(num_regs, &intervals, function)?;
        apply_assignment(function, &assignment);
    }
    Ok(())
}

/// Allocation result per virtual register index.
pub struct Assignment {
    pub machine: Vec<Option<MachineReg>>,
    pub spill: Vec<Option<u32>>,
}

struct Env<'a> {
    intervals: &'a [Interval],
    /// Active virtual indices, kept sorted by interval end.
    active: Vec<u32>,
    used: Vec<bool>,
    machine: Vec<Option<usize>>,
    spill: Vec<Option<u32>>,
}

impl Env<'_> {
    fn expire_old_intervals(&mut self, start: u32) {
        while let Some(&virt) = self.active.first() {
            if self.intervals[virt as usize].end() >= start {
                break;
            }
            self.active.remove(0);
            if let Some(machine) = self.machine[virt as usize] {
                self.used[machine] = false;
            }
        }
    }

    fn add_to_active(&mut self, virt: u32) {
        let end = self.intervals[virt as usize].end();
        let pos = self
            .active
            .partition_point(|&other| self.intervals[other as usize].end() <= end);
        self.active.insert(pos, virt);
    }

    fn alloc_free_reg(&mut self, virt: u32) -> bool {
        match self.used.iter().position(|used| !used) {
            Some(machine) => {
                self.used[machine] = true;
                self.machine[virt as usize] = Some(machine);
                true
            }
            None => false,
        }
    }

    /// Furthest-end wins: when the active interval with the greatest end
    /// outlives the current one, its machine register moves to the current
    /// interval and it is spilled; otherwise the current interval is.
    fn spill_at_interval(&mut self, virt: u32, stack_count: &mut u32) {
        let current_end = self.intervals[virt as usize].end();
        let victim = self.active.last().copied();
        match victim {
            Some(victim) if self.intervals[victim as usize].end() > current_end => {
                self.machine[virt as usize] = self.machine[victim as usize];
                self.machine[victim as usize] = None;
                self.spill[victim as usize] = Some(*stack_count);
                *stack_count += 1;
                self.active.pop();
                self.add_to_active(virt);
            }
            _ => {
                self.spill[virt as usize] = Some(*stack_count);
                *stack_count += 1;
            }
        }
    }
}

/// One linear scan over `intervals` (indexed by virtual register) onto
/// `num_regs` machine registers. `pinned` lists the fixed registers; their
/// machine registers are reserved before scanning and they do not scan.
/// Spill slots are allocated from `stack_count`.
pub fn scan_intervals(
    num_regs: usize,
    intervals: &[Interval],
    pinned: &[Option<MachineReg>],
    stack_count: &mut u32,
) -> Result<Assignment, CompileError> {
    let reg_count = intervals.len();
    let mut env = Env {
        intervals,
        active: Vec::new(),
        used: vec![false; num_regs],
        machine: vec![None; reg_count],
        spill: vec![None; reg_count],
    };

    for real in pinned.iter().flatten() {
        if real.index() >= num_regs {
            return Err(CompileError::invariant(
                "reg_alloc",
                format!("fixed register {real} outside the machine set"),
            ));
        }
        env.used[real.index()] = true;
    }

    // Intervals sorted by start; fixed registers do not scan.
    let mut ordered: Vec<u32> = (0..reg_count as u32)
        .filter(|&virt| !intervals[virt as usize].is_empty() && pinned[virt as usize].is_none())
        .collect();
    ordered.sort_by_key(|&virt| intervals[virt as usize].start());

    for virt in ordered {
        env.expire_old_intervals(intervals[virt as usize].start());
        if env.alloc_free_reg(virt) {
            env.add_to_active(virt);
        } else {
            env.spill_at_interval(virt, stack_count);
        }
    }

    let mut machine = Vec::with_capacity(reg_count);
    for (virt, slot) in env.machine.iter().enumerate() {
        let real = match (slot, pinned[virt]) {
            (_, Some(real)) => Some(real),
            (Some(index), None) => Some(MachineReg::from_index(*index).ok_or_else(|| {
                CompileError::invariant("reg_alloc", format!("machine register index {index} out of range"))
            })?),
            (None, None) => None,
        };
        machine.push(real);
    }
    Ok(Assignment { machine, spill: env.spill })
}

fn allocate_function(
    num_regs: usize,
    intervals: &[Interval],
    f: &mut Function,
) -> Result<Assignment, CompileError> {
    // Fixed registers keep their pin for the whole function.
    let mut pinned: Vec<Option<MachineReg>> = vec![None; f.reg_count as usize];
    for id in f.sorted_inst_ids() {
        let Some(inst) = f.inst(id) else { continue };
        let mut note = |reg: &Reg| {
            if reg.kind == RegKind::Fixed
                && let Some(real) = reg.real
            {
                pinned[reg.virt as usize] = Some(real);
            }
        };
        if let Some(rd) = inst.dest() {
            note(rd);
        }
        for ra in inst.args() {
            note(ra);
        }
    }

    let mut stack_count = f.stack_count;
    let assignment = scan_intervals(num_regs, intervals, &pinned, &mut stack_count)?;
    f.stack_count = stack_count;

    let spilled = assignment.spill.iter().filter(|slot| slot.is_some()).count();
    debug!("reg_alloc: {}: {} spilled registers", f.name, spilled);
    Ok(assignment)
}

fn apply_assignment(f: &mut Function, assignment: &Assignment) {
    for slot in &mut f.insts {
        let Some(inst) = slot.as_mut() else { continue };
        let mut rewrite = |reg: &mut Reg| {
            if reg.kind != RegKind::Virtual {
                return;
            }
            if let Some(real) = assignment.machine[reg.virt as usize] {
                reg.kind = RegKind::Physical;
                reg.real = Some(real);
            } else if let Some(stack_slot) = assignment.spill[reg.virt as usize] {
                reg.spill_slot = Some(stack_slot);
            }
        };
        if let Some(rd) = inst.dest_mut() {
            rewrite(rd);
        }
        for ra in inst.args_mut() {
            rewrite(ra);
        }
    }
}
