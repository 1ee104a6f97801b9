// src/ir/reorder.rs
//! Block ordering and instruction numbering.
//!
//! Depth-first preorder traversal from the entry block assigns each reached
//! block a dense local id and its position in `sorted_blocks`; instructions
//! are then renumbered densely by walking blocks in sorted order. Blocks the
//! traversal never reaches are deleted together with their instructions,
//! except for the function exit block, which later passes rely on.
//!
//! Guarantee: if block A dominates B along the traversal path, every
//! instruction id in A is strictly smaller than every id in B. Linear scan
//! relies on this.

use crate::ir::function::{Function, Ir};
use crate::ir::instruction::InstId;
use log::trace;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashSet;

pub fn reorder_blocks(ir: &mut Ir) {
    for function in &mut ir.functions {
        reorder_function(function);
    }
}

fn reorder_function(f: &mut Function) {
    let mut sorted: Vec<NodeIndex> = Vec::with_capacity(f.graph.node_count());
    let mut visited: HashSet<NodeIndex> = HashSet::with_capacity(f.graph.node_count());

    // Iterative DFS preorder; successors are pushed in reverse so they are
    // visited in edge insertion order.
    let mut stack = vec![f.entry];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        sorted.push(node);
        let mut succs = f.succs(node);
        succs.reverse();
        stack.extend(succs);
    }

    // The exit block survives even when currently unreachable; block
    // merging starts its walk there.
    if !visited.contains(&f.exit) {
        visited.insert(f.exit);
        sorted.push(f.exit);
    }

    let unreachable: Vec<NodeIndex> =
        f.graph.node_indices().filter(|node| !visited.contains(node)).collect();
    for node in unreachable {
        trace!("reorder: dropping unreachable block b{}", f.graph[node].global_id);
        for id in std::mem::take(&mut f.graph[node].insts) {
            f.insts[id.index()] = None;
        }
        f.graph.remove_node(node);
    }

    for (index, &node) in sorted.iter().enumerate() {
        let block = &mut f.graph[node];
        block.local_id = index as u32;
        block.sorted_index = index;
    }

    renumber_insts(f, &sorted);
    f.sorted_blocks = sorted;
}

/// Rebuilds the instruction arena densely in sorted-block order, assigning
/// fresh local ids. Global ids are assigned once at construction and are not
/// changed here.
fn renumber_insts(f: &mut Function, sorted: &[NodeIndex]) {
    let mut arena: Vec<Option<crate::ir::instruction::Inst>> = Vec::with_capacity(f.insts.len());
    for &node in sorted {
        let ids = std::mem::take(&mut f.graph[node].insts);
        let mut renumbered = Vec::with_capacity(ids.len());
        for id in ids {
            let mut inst = f.insts[id.index()].take().expect("block lists reference live instructions");
            let new_id = InstId(arena.len() as u32);
            inst.local_id = new_id;
            arena.push(Some(inst));
            renumbered.push(new_id);
        }
        f.graph[node].insts = renumbered;
    }
    f.inst_count = arena.len() as u32;
    f.insts = arena;
}
