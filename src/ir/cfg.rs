//! Control flow graph over basic blocks of register instructions.
//!
//! Blocks are stored in an arena addressed by stable indices: pruning an
//! unreachable block empties it in place rather than shifting its neighbors,
//! so queued edits keyed by `(block, index)` stay valid for the lifetime of
//! one transform invocation. Branch targets live on typed edges, not in the
//! instructions themselves.

use std::collections::VecDeque;

use crate::{
    ir::{
        code::{BranchTargets, IrCode},
        instruction::Instruction,
    },
    Result,
};

/// Kind of a control flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Unconditional successor.
    Goto,
    /// Taken (`true`) or fall-through (`false`) side of a conditional branch.
    Branch(bool),
    /// Switch case with the given key.
    Case(i64),
    /// Switch fall-through when no key matches.
    Default,
}

/// An outgoing control flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Destination block index.
    pub dst: usize,
    /// Edge kind.
    pub kind: EdgeKind,
}

/// A basic block: a straight-line instruction run ending in a terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    id: usize,
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Returns the block index.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the instructions of this block.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns a mutable reference to the instructions.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Returns the terminator, if the block still has one.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// A pruned block is left empty in the arena; its index stays valid but
    /// it no longer participates in the graph.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A method body organized as a control flow graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    succs: Vec<Vec<Edge>>,
    preds: Vec<Vec<usize>>,
    entry: usize,
}

impl ControlFlowGraph {
    /// Creates an empty graph. The first added block becomes the entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block and returns its index.
    pub fn add_block(&mut self, instructions: Vec<Instruction>) -> usize {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock { id, instructions });
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        id
    }

    /// Adds an edge from `src` to `dst`.
    pub fn add_edge(&mut self, src: usize, dst: usize, kind: EdgeKind) {
        self.succs[src].push(Edge { dst, kind });
        self.preds[dst].push(src);
    }

    /// Returns the entry block index.
    #[must_use]
    pub const fn entry(&self) -> usize {
        self.entry
    }

    /// Returns the number of blocks in the arena (including pruned ones).
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> &BasicBlock {
        &self.blocks[index]
    }

    /// Returns a mutable reference to the block at `index`.
    pub fn block_mut(&mut self, index: usize) -> &mut BasicBlock {
        &mut self.blocks[index]
    }

    /// Outgoing edges of a block.
    #[must_use]
    pub fn successors(&self, block: usize) -> &[Edge] {
        &self.succs[block]
    }

    /// Predecessor block indices (one entry per incoming edge).
    #[must_use]
    pub fn predecessors(&self, block: usize) -> &[usize] {
        &self.preds[block]
    }

    /// The destination of the `Branch(taken)` edge out of `block`.
    #[must_use]
    pub fn branch_target(&self, block: usize, taken: bool) -> Option<usize> {
        self.succs[block]
            .iter()
            .find(|e| e.kind == EdgeKind::Branch(taken))
            .map(|e| e.dst)
    }

    /// The destination of the `Goto` edge out of `block`.
    #[must_use]
    pub fn goto_target(&self, block: usize) -> Option<usize> {
        self.succs[block]
            .iter()
            .find(|e| e.kind == EdgeKind::Goto)
            .map(|e| e.dst)
    }

    /// The destination for `key` in the switch terminating `block`, falling
    /// back to the `Default` edge.
    #[must_use]
    pub fn switch_target(&self, block: usize, key: i64) -> Option<usize> {
        self.succs[block]
            .iter()
            .find(|e| e.kind == EdgeKind::Case(key))
            .or_else(|| self.succs[block].iter().find(|e| e.kind == EdgeKind::Default))
            .map(|e| e.dst)
    }

    /// Replaces all outgoing edges of `block` with a single `Goto` edge to
    /// `dst`, fixing up predecessor lists.
    pub fn set_single_goto_edge(&mut self, block: usize, dst: usize) {
        self.clear_successors(block);
        self.add_edge(block, dst, EdgeKind::Goto);
    }

    /// Removes all outgoing edges of `block`.
    pub fn clear_successors(&mut self, block: usize) {
        let old = std::mem::take(&mut self.succs[block]);
        for edge in old {
            if let Some(pos) = self.preds[edge.dst].iter().position(|&p| p == block) {
                self.preds[edge.dst].swap_remove(pos);
            }
        }
    }

    /// Redirects every edge `src → old_dst` to point at `new_dst` instead.
    ///
    /// Returns the number of edges redirected.
    pub fn redirect_edge(&mut self, src: usize, old_dst: usize, new_dst: usize) -> usize {
        let mut moved = 0;
        for edge in &mut self.succs[src] {
            if edge.dst == old_dst {
                edge.dst = new_dst;
                moved += 1;
            }
        }
        for _ in 0..moved {
            if let Some(pos) = self.preds[old_dst].iter().position(|&p| p == src) {
                self.preds[old_dst].swap_remove(pos);
            }
            self.preds[new_dst].push(src);
        }
        moved
    }

    /// Computes the set of blocks reachable from the entry.
    #[must_use]
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        if self.blocks.is_empty() {
            return seen;
        }
        let mut queue = VecDeque::from([self.entry]);
        seen[self.entry] = true;
        while let Some(block) = queue.pop_front() {
            for edge in &self.succs[block] {
                if !seen[edge.dst] {
                    seen[edge.dst] = true;
                    queue.push_back(edge.dst);
                }
            }
        }
        seen
    }

    /// Empties every block not reachable from the entry and removes its
    /// edges. Returns the number of blocks pruned. Block indices stay stable.
    pub fn prune_unreachable(&mut self) -> usize {
        let reachable = self.reachable();
        let mut pruned = 0;
        for block in 0..self.blocks.len() {
            if !reachable[block] && !self.blocks[block].is_dead() {
                self.blocks[block].instructions.clear();
                self.clear_successors(block);
                pruned += 1;
            }
        }
        // Predecessor lists may still name pruned blocks; drop those entries.
        for preds in &mut self.preds {
            preds.retain(|&p| reachable[p]);
        }
        pruned
    }

    /// Total number of instructions across live blocks.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    /// An upper bound on the registers used by this body (covering the second
    /// half of any wide pair).
    #[must_use]
    pub fn register_count(&self) -> usize {
        let mut max = 0usize;
        for block in &self.blocks {
            for insn in &block.instructions {
                for reg in insn.dest().into_iter().chain(insn.srcs()) {
                    max = max.max(reg.index() + 2);
                }
            }
        }
        max
    }

    /// Builds a graph from a flat body.
    ///
    /// Block boundaries fall at branch targets and after terminators; edges
    /// are derived from the body's target table. The body is validated first.
    pub fn from_code(code: &IrCode) -> Result<Self> {
        code.validate()?;
        let len = code.len();

        let mut is_leader = vec![false; len];
        is_leader[0] = true;
        for (index, insn) in code.insns().iter().enumerate() {
            if insn.is_terminator() && index + 1 < len {
                is_leader[index + 1] = true;
            }
            if let Some(entry) = code.targets_of(index) {
                for t in entry.iter() {
                    is_leader[t] = true;
                }
            }
        }

        // block_of[i] = block containing instruction i
        let mut block_of = vec![0usize; len];
        let mut graph = Self::new();
        let mut current = usize::MAX;
        for index in 0..len {
            if is_leader[index] {
                current = graph.add_block(Vec::new());
            }
            block_of[index] = current;
            graph.blocks[current]
                .instructions
                .push(code.insn(index).clone());
        }

        for (index, insn) in code.insns().iter().enumerate() {
            let src = block_of[index];
            let last_in_block = index + 1 == len || is_leader[index + 1];
            if !last_in_block {
                continue;
            }
            match (insn, code.targets_of(index)) {
                (Instruction::Goto, Some(BranchTargets::Goto(t))) => {
                    graph.add_edge(src, block_of[*t], EdgeKind::Goto);
                }
                (Instruction::If { .. }, Some(BranchTargets::If(t))) => {
                    if index + 1 >= len {
                        return Err(malformed_error!(
                            "conditional branch at {index} has no fall-through"
                        ));
                    }
                    graph.add_edge(src, block_of[*t], EdgeKind::Branch(true));
                    graph.add_edge(src, block_of[index + 1], EdgeKind::Branch(false));
                }
                (Instruction::Switch { .. }, Some(BranchTargets::Switch { keys, targets })) => {
                    if index + 1 >= len {
                        return Err(malformed_error!("switch at {index} has no fall-through"));
                    }
                    for (key, t) in keys.iter().zip(targets.iter()) {
                        graph.add_edge(src, block_of[*t], EdgeKind::Case(*key));
                    }
                    graph.add_edge(src, block_of[index + 1], EdgeKind::Default);
                }
                (Instruction::Return { .. } | Instruction::Throw { .. }, None) => {}
                (insn, _) if !insn.is_terminator() => {
                    // Straight-line fall-through into the next leader.
                    graph.add_edge(src, block_of[index + 1], EdgeKind::Goto);
                }
                (insn, _) => {
                    return Err(malformed_error!(
                        "terminator {} at {index} has inconsistent targets",
                        insn.mnemonic()
                    ));
                }
            }
        }

        Ok(graph)
    }
}
