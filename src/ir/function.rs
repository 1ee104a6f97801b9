// src/ir/function.rs
use crate::asm::target::MachineReg;
use crate::ir::basic_block::BasicBlock;
use crate::ir::instruction::{Inst, InstId, InstKind};
use crate::ir::reg::Reg;
use crate::types::DataSize;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::fmt;
use std::sync::Arc;

/// A function under compilation.
///
/// Ownership is hierarchical: the function owns the block graph and the
/// instruction arena; blocks reference instructions by id, and CFG edges and
/// jump targets are non-owning `NodeIndex` references into the graph.
///
/// `insts` is the flat index from dense local instruction id to storage:
/// lookup by id is O(1). Removed instructions leave `None` holes that the
/// reorder pass compacts away.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Arc<str>,
    /// Registers holding the parameters after the entry moves.
    pub params: Vec<Reg>,
    pub graph: StableDiGraph<BasicBlock, ()>,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    /// DFS preorder of reachable blocks, output of the reorder pass.
    pub sorted_blocks: Vec<NodeIndex>,
    pub insts: Vec<Option<Inst>>,
    pub reg_count: u32,
    pub inst_count: u32,
    /// Stack slots in use: locals first, then allocator spill slots.
    pub stack_count: u32,
}

impl Function {
    pub fn new(name: Arc<str>) -> Self {
        Function {
            name,
            params: Vec::new(),
            graph: StableDiGraph::new(),
            entry: NodeIndex::end(),
            exit: NodeIndex::end(),
            sorted_blocks: Vec::new(),
            insts: Vec::new(),
            reg_count: 0,
            inst_count: 0,
            stack_count: 0,
        }
    }

    /// Allocates a fresh virtual register.
    pub fn new_reg(&mut self, size: DataSize) -> Reg {
        let virt = self.reg_count;
        self.reg_count += 1;
        Reg::new_virtual(size, virt)
    }

    /// Allocates a fresh fixed register pinned to `real`.
    pub fn new_fixed_reg(&mut self, size: DataSize, real: MachineReg) -> Reg {
        let virt = self.reg_count;
        self.reg_count += 1;
        Reg::new_fixed(size, virt, real)
    }

    /// Creates a block together with its `LABEL`, allocating a global block
    /// id and instruction ids from the passed counters.
    pub fn add_block(&mut self, block_count: &mut u32, global_insts: &mut u32) -> NodeIndex {
        let global_id = *block_count;
        *block_count += 1;
        let node = self.graph.add_node(BasicBlock::new(global_id));
        let label = self.new_inst(global_insts, InstKind::Label { id: global_id });
        self.graph[node].insts.push(label);
        node
    }

    /// Allocates a fresh instruction in the arena without placing it in any
    /// block. Local and global ids come from the owning counters.
    pub fn new_inst(&mut self, global_insts: &mut u32, kind: InstKind) -> InstId {
        debug_assert_eq!(self.inst_count as usize, self.insts.len());
        let local_id = InstId(self.inst_count);
        self.inst_count += 1;
        let global_id = *global_insts;
        *global_insts += 1;
        self.insts.push(Some(Inst::new(local_id, global_id, kind)));
        local_id
    }

    /// Allocates an instruction and appends it to `block`.
    pub fn emit(&mut self, block: NodeIndex, global_insts: &mut u32, kind: InstKind) -> InstId {
        let id = self.new_inst(global_insts, kind);
        self.graph[block].insts.push(id);
        id
    }

    #[inline]
    pub fn inst(&self, id: InstId) -> Option<&Inst> {
        self.insts.get(id.index())?.as_ref()
    }

    #[inline]
    pub fn inst_mut(&mut self, id: InstId) -> Option<&mut Inst> {
        self.insts.get_mut(id.index())?.as_mut()
    }

    #[inline]
    pub fn block(&self, node: NodeIndex) -> &BasicBlock {
        &self.graph[node]
    }

    #[inline]
    pub fn block_mut(&mut self, node: NodeIndex) -> &mut BasicBlock {
        &mut self.graph[node]
    }

    /// Inserts an already-allocated instruction into `block` before
    /// position `pos`.
    pub fn insert_before(&mut self, block: NodeIndex, pos: usize, id: InstId) {
        self.graph[block].insts.insert(pos, id);
    }

    /// Unlinks the instruction at `pos` in `block` from the block and the
    /// arena, dropping its analysis payload with it.
    pub fn remove_inst_at(&mut self, block: NodeIndex, pos: usize) -> InstId {
        let id = self.graph[block].insts.remove(pos);
        self.insts[id.index()] = None;
        id
    }

    /// Locates an instruction's block and position.
    pub fn find_inst(&self, id: InstId) -> Option<(NodeIndex, usize)> {
        for node in self.graph.node_indices() {
            if let Some(pos) = self.graph[node].insts.iter().position(|&i| i == id) {
                return Some((node, pos));
            }
        }
        None
    }

    /// Adds the CFG edge `a -> b`. Idempotent on duplicates.
    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex) {
        self.graph.update_edge(a, b, ());
    }

    /// Removes the CFG edge `a -> b`. Idempotent on missing edges.
    pub fn disconnect(&mut self, a: NodeIndex, b: NodeIndex) {
        if let Some(edge) = self.graph.find_edge(a, b) {
            self.graph.remove_edge(edge);
        }
    }

    /// Successor blocks in edge insertion order.
    pub fn succs(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(node, Direction::Outgoing).collect();
        out.reverse();
        out
    }

    /// Predecessor blocks in edge insertion order.
    pub fn preds(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(node, Direction::Incoming).collect();
        out.reverse();
        out
    }

    /// Iterates the instruction ids of all blocks in sorted order.
    pub fn sorted_inst_ids(&self) -> Vec<InstId> {
        let mut ids = Vec::with_capacity(self.insts.len());
        for &node in &self.sorted_blocks {
            ids.extend_from_slice(&self.graph[node].insts);
        }
        ids
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params_str = self.params.iter().map(Reg::to_string).collect::<Vec<_>>().join(", ");
        writeln!(f, "function {}({}):", self.name, params_str)?;
        let order: Vec<NodeIndex> = if self.sorted_blocks.is_empty() {
            self.graph.node_indices().collect()
        } else {
            self.sorted_blocks.clone()
        };
        for node in order {
            let block = &self.graph[node];
            let succs = self
                .succs(node)
                .iter()
                .map(|&s| self.graph[s].to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{block}: ; succs: [{succs}]")?;
            for &id in &block.insts {
                if let Some(inst) = self.inst(id) {
                    writeln!(f, "  {inst}")?;
                }
            }
        }
        Ok(())
    }
}

/// The whole IR: an ordered list of functions plus the global counters every
/// edit allocates ids from.
#[derive(Debug, Clone, Default)]
pub struct Ir {
    pub functions: Vec<Function>,
    /// Global instruction counter; every inserted instruction takes its
    /// global id from here.
    pub inst_count: u32,
    pub block_count: u32,
}

impl Ir {
    pub fn new() -> Self {
        Ir::default()
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }
}

impl fmt::Display for Ir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in &self.functions {
            function.fmt(f)?;
        }
        Ok(())
    }
}
