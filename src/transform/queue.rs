//! Two-phase rewrite plumbing: rules queue edits, the committer applies them.
//!
//! Rules run over a read-only graph and may consult analysis state freely;
//! nothing they queue is visible until [`ChangeQueue::commit`] replays the
//! whole batch in one traversal. Every keyed edit stores a copy of the
//! instruction it targets, and commit panics if the instruction found at
//! that position differs — a stale edit means two rules raced for the same
//! slot, which is an internal invariant violation rather than an input
//! error.
//!
//! Structural edits (branch/switch simplification, edge forwarding, throw
//! truncation) trigger exactly one unreachable-block prune at the end of the
//! commit, so block indices and queued positions stay valid throughout.

use std::collections::HashMap;

use crate::ir::cfg::ControlFlowGraph;
use crate::ir::instruction::Instruction;
use crate::transform::stats::Stats;

/// One queued rewrite action.
#[derive(Debug)]
enum EditAction {
    /// Replace the instruction with a sequence.
    Replace(Vec<Instruction>),
    /// Remove the instruction.
    Delete,
    /// Truncate the block at the instruction and append a throw sequence;
    /// all outgoing edges are removed.
    ReplaceWithThrow(Vec<Instruction>),
    /// Replace the conditional terminator with a goto to `keep`.
    SimplifyBranch { keep: usize },
    /// Replace the switch terminator with a goto to `keep`.
    SimplifySwitch { keep: usize },
}

#[derive(Debug)]
struct KeyedEdit {
    original: Instruction,
    action: EditAction,
    delta: Stats,
}

#[derive(Debug)]
struct ForwardEdge {
    block: usize,
    old_dst: usize,
    new_dst: usize,
    delta: Stats,
}

/// Collects edits during the read-only rule pass.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    edits: HashMap<(usize, usize), KeyedEdit>,
    entry_inserts: Vec<Instruction>,
    entry_delta: Stats,
    forwards: Vec<ForwardEdge>,
}

impl ChangeQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.entry_inserts.is_empty() && self.forwards.is_empty()
    }

    fn push(&mut self, block: usize, index: usize, original: &Instruction, action: EditAction, delta: Stats) {
        let prior = self.edits.insert(
            (block, index),
            KeyedEdit {
                original: original.clone(),
                action,
                delta,
            },
        );
        assert!(
            prior.is_none(),
            "two edits queued for instruction {index} of block {block}"
        );
    }

    /// Queues replacing the instruction at `(block, index)` with `with`.
    pub fn replace(
        &mut self,
        block: usize,
        index: usize,
        original: &Instruction,
        with: Vec<Instruction>,
        delta: Stats,
    ) {
        self.push(block, index, original, EditAction::Replace(with), delta);
    }

    /// Queues deleting the instruction at `(block, index)`.
    pub fn delete(&mut self, block: usize, index: usize, original: &Instruction, delta: Stats) {
        self.push(block, index, original, EditAction::Delete, delta);
    }

    /// Queues truncating `block` at `index` and appending `throw_seq`.
    pub fn replace_with_throw(
        &mut self,
        block: usize,
        index: usize,
        original: &Instruction,
        throw_seq: Vec<Instruction>,
        delta: Stats,
    ) {
        self.push(
            block,
            index,
            original,
            EditAction::ReplaceWithThrow(throw_seq),
            delta,
        );
    }

    /// Queues rewriting the conditional terminator of `block` into a goto
    /// that keeps only the edge to `keep`.
    pub fn simplify_branch(
        &mut self,
        block: usize,
        index: usize,
        original: &Instruction,
        keep: usize,
        delta: Stats,
    ) {
        self.push(block, index, original, EditAction::SimplifyBranch { keep }, delta);
    }

    /// Queues rewriting the switch terminator of `block` into a goto.
    pub fn simplify_switch(
        &mut self,
        block: usize,
        index: usize,
        original: &Instruction,
        keep: usize,
        delta: Stats,
    ) {
        self.push(block, index, original, EditAction::SimplifySwitch { keep }, delta);
    }

    /// Queues instructions to be inserted right after the load-param prelude
    /// of the entry block.
    pub fn insert_at_entry(&mut self, insns: Vec<Instruction>, delta: Stats) {
        self.entry_inserts.extend(insns);
        self.entry_delta += delta;
    }

    /// Queues redirecting the edge `block → old_dst` to `new_dst`.
    pub fn forward_edge(&mut self, block: usize, old_dst: usize, new_dst: usize, delta: Stats) {
        self.forwards.push(ForwardEdge {
            block,
            old_dst,
            new_dst,
            delta,
        });
    }

    /// Applies every queued edit to `cfg` and accumulates their stat deltas.
    ///
    /// # Panics
    ///
    /// Panics when a queued edit no longer matches the graph (a stale
    /// position or a forwarded edge that disappeared). The queue must be
    /// built against the same graph it commits to, in the same pass.
    pub fn commit(self, cfg: &mut ControlFlowGraph, stats: &mut Stats) {
        let mut structural = !self.forwards.is_empty();

        // Per block, apply in descending index order so earlier positions
        // stay valid while later ones are spliced.
        let mut by_block: HashMap<usize, Vec<(usize, KeyedEdit)>> = HashMap::new();
        for ((block, index), edit) in self.edits {
            by_block.entry(block).or_default().push((index, edit));
        }
        for (block, mut edits) in by_block {
            edits.sort_by(|a, b| b.0.cmp(&a.0));
            for (index, edit) in edits {
                let found = cfg.block(block).instructions().get(index);
                assert!(
                    found == Some(&edit.original),
                    "stale edit at instruction {index} of block {block}: \
                     expected {:?}, found {found:?}",
                    edit.original
                );
                match edit.action {
                    EditAction::Replace(with) => {
                        cfg.block_mut(block)
                            .instructions_mut()
                            .splice(index..=index, with);
                    }
                    EditAction::Delete => {
                        cfg.block_mut(block).instructions_mut().remove(index);
                    }
                    EditAction::ReplaceWithThrow(throw_seq) => {
                        let insns = cfg.block_mut(block).instructions_mut();
                        insns.truncate(index);
                        insns.extend(throw_seq);
                        cfg.clear_successors(block);
                        structural = true;
                    }
                    EditAction::SimplifyBranch { keep } | EditAction::SimplifySwitch { keep } => {
                        let insns = cfg.block_mut(block).instructions_mut();
                        assert_eq!(
                            index + 1,
                            insns.len(),
                            "branch simplification must target the terminator"
                        );
                        insns[index] = Instruction::Goto;
                        cfg.set_single_goto_edge(block, keep);
                        structural = true;
                    }
                }
                *stats += edit.delta;
            }
        }

        if !self.entry_inserts.is_empty() {
            let entry = cfg.entry();
            let insns = cfg.block_mut(entry).instructions_mut();
            let prelude = insns
                .iter()
                .take_while(|i| matches!(i, Instruction::LoadParam { .. }))
                .count();
            insns.splice(prelude..prelude, self.entry_inserts);
            *stats += self.entry_delta;
        }

        for forward in self.forwards {
            let moved = cfg.redirect_edge(forward.block, forward.old_dst, forward.new_dst);
            assert!(
                moved > 0,
                "stale forward: no edge from block {} to block {}",
                forward.block,
                forward.old_dst
            );
            *stats += forward.delta;
        }

        if structural {
            cfg.prune_unreachable();
        }
    }
}
