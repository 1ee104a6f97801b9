// src/ir/optimizer/merge_blocks.rs
//! Block merging.
//!
//! Walks the CFG bottom-up from the function exit. A pair `A -> B` merges
//! when the edge is the only one on both sides: `A` has a single successor,
//! `B` a single predecessor, and they agree. `A` must end in a `JUMP`; when
//! it ends in a `RET` instead, `B`'s terminator must be a `RET` with no
//! operand, `A`'s `RET` is dropped and `B`'s remains. The merge drops `A`'s
//! terminator and `B`'s label, concatenates the instruction lists, transfers
//! `B`'s successors to `A` and frees `B`. If `B` was the function exit, `A`
//! becomes the new exit.

use crate::error::compile_error::CompileError;
use crate::ir::function::{Function, Ir};
use crate::ir::instruction::InstKind;
use log::debug;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashSet;

pub fn merge_blocks(ir: &mut Ir) -> Result<(), CompileError> {
    for function in &mut ir.functions {
        merge_function(function)?;
    }
    Ok(())
}

fn merge_function(f: &mut Function) -> Result<(), CompileError> {
    // Post-order over reversed edges from the exit: predecessors are
    // processed before the blocks they feed, so chains collapse fully.
    let order = reverse_post_order_from_exit(f);

    let mut merged = 0usize;
    for node in order {
        if !f.graph.contains_node(node) {
            continue;
        }
        let preds = f.preds(node);
        if preds.len() != 1 {
            continue;
        }
        let pred = preds[0];
        if pred == node {
            continue;
        }
        let pred_succs = f.succs(pred);
        if pred_succs.len() != 1 {
            continue;
        }
        if pred_succs[0] != node {
            return Err(CompileError::invariant_at_block(
                "merge_blocks",
                "predecessor/successor edges disagree",
                f.graph[node].global_id,
            ));
        }
        if f.exit == node {
            f.exit = pred;
        }
        merge_two(f, pred, node)?;
        merged += 1;
    }
    if merged > 0 {
        debug!("merge_blocks: merged {} block pairs in {}", merged, f.name);
    }
    Ok(())
}

fn reverse_post_order_from_exit(f: &Function) -> Vec<NodeIndex> {
    let mut order = Vec::with_capacity(f.graph.node_count());
    let mut visited: HashSet<NodeIndex> = HashSet::with_capacity(f.graph.node_count());
    // Iterative post-order: (node, child cursor) pairs.
    let mut stack = vec![(f.exit, 0usize)];
    visited.insert(f.exit);
    while let Some((node, cursor)) = stack.pop() {
        let preds = f.preds(node);
        if cursor < preds.len() {
            stack.push((node, cursor + 1));
            let pred = preds[cursor];
            if visited.insert(pred) {
                stack.push((pred, 0));
            }
        } else {
            order.push(node);
        }
    }
    order
}

fn merge_two(f: &mut Function, from: NodeIndex, to: NodeIndex) -> Result<(), CompileError> {
    let from_last = f.graph[from]
        .insts
        .last()
        .copied()
        .ok_or_else(|| CompileError::invariant_at_block("merge_blocks", "empty block", f.graph[from].global_id))?;
    let to_first = f.graph[to]
        .insts
        .first()
        .copied()
        .ok_or_else(|| CompileError::invariant_at_block("merge_blocks", "empty block", f.graph[to].global_id))?;
    let to_last = f.graph[to].insts.last().copied().expect("nonempty, checked above");

    if !matches!(f.inst(to_first).map(|inst| &inst.kind), Some(InstKind::Label { .. })) {
        return Err(CompileError::invariant_at_block(
            "merge_blocks",
            "merged block does not begin with a label",
            f.graph[to].global_id,
        ));
    }

    match f.inst(from_last).map(|inst| &inst.kind) {
        Some(InstKind::Ret { value }) => {
            if value.is_some() {
                return Err(CompileError::invariant_at_block(
                    "merge_blocks",
                    "merge across a value-carrying RET",
                    f.graph[from].global_id,
                ));
            }
            match f.inst(to_last).map(|inst| &inst.kind) {
                Some(InstKind::Ret { value }) if value.is_none() => {}
                _ => {
                    return Err(CompileError::invariant_at_block(
                        "merge_blocks",
                        "RET predecessor merged into a block not ending in an empty RET",
                        f.graph[to].global_id,
                    ));
                }
            }
        }
        Some(InstKind::Jump { .. }) => {}
        _ => {
            return Err(CompileError::invariant_at_block(
                "merge_blocks",
                "merge across a conditional terminator",
                f.graph[from].global_id,
            ));
        }
    }

    // Drop A's terminator and B's label, concatenate, transfer successors.
    let from_term_pos = f.graph[from].insts.len() - 1;
    f.remove_inst_at(from, from_term_pos);
    f.remove_inst_at(to, 0);
    let mut moved = std::mem::take(&mut f.graph[to].insts);
    f.graph[from].insts.append(&mut moved);

    for succ in f.succs(to) {
        f.disconnect(to, succ);
        f.connect(from, succ);
    }
    f.disconnect(from, to);
    f.graph.remove_node(to);
    Ok(())
}
