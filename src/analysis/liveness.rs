//! Backward liveness analysis over registers.
//!
//! Computes, per basic block, the set of registers live on entry. The branch
//! forwarding rule uses these sets to prove that skipping a block is safe:
//! the writes the skipped block would have performed must all be dead at the
//! forwarding destination.
//!
//! Wide destinations occupy a register pair; both halves are marked.

use crate::ir::cfg::ControlFlowGraph;
use crate::ir::instruction::Instruction;
use crate::ir::pool::DexPool;
use crate::utils::BitSet;

/// Per-block live-in register sets.
#[derive(Debug)]
pub struct Liveness {
    live_in: Vec<BitSet>,
    registers: usize,
}

impl Liveness {
    /// Runs the backward fixpoint over `cfg`.
    #[must_use]
    pub fn analyze(cfg: &ControlFlowGraph, pool: &DexPool) -> Self {
        let registers = cfg.register_count().max(1);
        let count = cfg.block_count();

        // USE/DEF summaries per block, computed once.
        let mut uses = Vec::with_capacity(count);
        let mut defs = Vec::with_capacity(count);
        for index in 0..count {
            let mut use_set = BitSet::new(registers);
            let mut def_set = BitSet::new(registers);
            for insn in cfg.block(index).instructions() {
                for src in insn.srcs() {
                    if !def_set.contains(src.index()) {
                        use_set.insert(src.index());
                    }
                }
                for (reg, wide) in Self::writes(insn, pool) {
                    def_set.insert(reg);
                    if wide {
                        def_set.insert(reg + 1);
                    }
                }
            }
            uses.push(use_set);
            defs.push(def_set);
        }

        let mut live_in = vec![BitSet::new(registers); count];
        let mut changed = true;
        while changed {
            changed = false;
            for index in (0..count).rev() {
                let mut out = BitSet::new(registers);
                for edge in cfg.successors(index) {
                    out.union_with(&live_in[edge.dst]);
                }
                out.difference_with(&defs[index]);
                out.union_with(&uses[index]);
                if out != live_in[index] {
                    live_in[index] = out;
                    changed = true;
                }
            }
        }

        Self { live_in, registers }
    }

    fn writes(insn: &Instruction, pool: &DexPool) -> Option<(usize, bool)> {
        insn.dest().map(|d| (d.index(), insn.dest_is_wide(pool)))
    }

    /// The registers live on entry to `block`.
    #[must_use]
    pub fn live_in(&self, block: usize) -> &BitSet {
        &self.live_in[block]
    }

    /// Returns `true` if any register written by `block` is live on entry to
    /// `at`.
    #[must_use]
    pub fn block_defs_live_at(
        &self,
        cfg: &ControlFlowGraph,
        pool: &DexPool,
        block: usize,
        at: usize,
    ) -> bool {
        let live = self.live_in(at);
        for insn in cfg.block(block).instructions() {
            if let Some((reg, wide)) = Self::writes(insn, pool) {
                if live.contains(reg) || (wide && reg + 1 < self.registers && live.contains(reg + 1))
                {
                    return true;
                }
            }
        }
        false
    }
}
