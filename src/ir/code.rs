//! Flat (non-graph) method body representation.
//!
//! [`IrCode`] is the linear instruction list a method body arrives in before
//! a control flow graph is built: an ordered `Vec` of instructions plus a
//! side table mapping branch instruction indices to their targets. The legacy
//! transform entry point operates directly on this form; the graph entry
//! point goes through [`crate::ir::ControlFlowGraph::from_code`].

use std::collections::HashMap;

use crate::{
    ir::instruction::Instruction,
    {Error, Result},
};

/// Branch targets for one branch/switch instruction in a flat body.
///
/// Conditional branches fall through to the next instruction when not taken;
/// switches fall through on no matching key. Only the explicit targets are
/// recorded here.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchTargets {
    /// Unconditional jump target.
    Goto(usize),
    /// Taken target of a conditional branch.
    If(usize),
    /// Case keys and their targets, in parallel order.
    Switch { keys: Vec<i64>, targets: Vec<usize> },
}

impl BranchTargets {
    /// All target indices referenced by this entry.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let (one, many): (Option<usize>, &[usize]) = match self {
            Self::Goto(t) | Self::If(t) => (Some(*t), &[]),
            Self::Switch { targets, .. } => (None, targets.as_slice()),
        };
        one.into_iter().chain(many.iter().copied())
    }
}

/// A method body as a flat instruction list with a branch-target side table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrCode {
    insns: Vec<Instruction>,
    targets: HashMap<usize, BranchTargets>,
}

impl IrCode {
    /// Creates a flat body from an instruction list. Branch targets are added
    /// afterwards with the `set_*` methods.
    #[must_use]
    pub fn new(insns: Vec<Instruction>) -> Self {
        Self {
            insns,
            targets: HashMap::new(),
        }
    }

    /// Records the target of the `goto` at `index`.
    pub fn set_goto_target(&mut self, index: usize, target: usize) {
        self.targets.insert(index, BranchTargets::Goto(target));
    }

    /// Records the taken target of the conditional branch at `index`.
    pub fn set_if_target(&mut self, index: usize, target: usize) {
        self.targets.insert(index, BranchTargets::If(target));
    }

    /// Records the case table of the switch at `index`.
    pub fn set_switch_targets(&mut self, index: usize, keys: Vec<i64>, targets: Vec<usize>) {
        assert_eq!(keys.len(), targets.len(), "switch table shape mismatch");
        self.targets
            .insert(index, BranchTargets::Switch { keys, targets });
    }

    /// The instruction list.
    #[must_use]
    pub fn insns(&self) -> &[Instruction] {
        &self.insns
    }

    /// The instruction at `index`.
    #[must_use]
    pub fn insn(&self, index: usize) -> &Instruction {
        &self.insns[index]
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    /// Returns `true` if the body holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// The branch targets recorded for the instruction at `index`, if any.
    #[must_use]
    pub fn targets_of(&self, index: usize) -> Option<&BranchTargets> {
        self.targets.get(&index)
    }

    /// Checks structural well-formedness: non-empty, every branch target in
    /// bounds, every `goto`/`if`/`switch` has a target entry, and the body
    /// ends in a terminator.
    pub fn validate(&self) -> Result<()> {
        if self.insns.is_empty() {
            return Err(Error::Empty);
        }
        for (index, insn) in self.insns.iter().enumerate() {
            let needs_targets = matches!(
                insn,
                Instruction::Goto | Instruction::If { .. } | Instruction::Switch { .. }
            );
            match self.targets.get(&index) {
                Some(entry) => {
                    if !needs_targets {
                        return Err(malformed_error!(
                            "instruction {index} ({}) has a target entry but takes no targets",
                            insn.mnemonic()
                        ));
                    }
                    for t in entry.iter() {
                        if t >= self.insns.len() {
                            return Err(Error::TargetOutOfBounds {
                                target: t,
                                len: self.insns.len(),
                            });
                        }
                    }
                    let shape_ok = matches!(
                        (insn, entry),
                        (Instruction::Goto, BranchTargets::Goto(_))
                            | (Instruction::If { .. }, BranchTargets::If(_))
                            | (Instruction::Switch { .. }, BranchTargets::Switch { .. })
                    );
                    if !shape_ok {
                        return Err(malformed_error!(
                            "instruction {index} ({}) has a mismatched target entry",
                            insn.mnemonic()
                        ));
                    }
                }
                None if needs_targets => {
                    return Err(malformed_error!(
                        "instruction {index} ({}) is missing its target entry",
                        insn.mnemonic()
                    ));
                }
                None => {}
            }
        }
        let last = self.insns.last().expect("non-empty checked above");
        if !last.is_terminator() {
            return Err(malformed_error!(
                "method body does not end in a terminator (last is {})",
                last.mnemonic()
            ));
        }
        Ok(())
    }

    /// Rebuilds the body from per-index replacement sequences, fixing up the
    /// target table.
    ///
    /// `replacements` maps an original instruction index to the sequence that
    /// replaces it (empty sequence = deletion). Branch targets pointing at a
    /// deleted instruction are moved to the next surviving instruction.
    /// Target entries follow their instruction: a replaced branch keeps its
    /// entry only if `retargets` provides a new one.
    pub(crate) fn rebuild(
        &mut self,
        replacements: &HashMap<usize, Vec<Instruction>>,
        retargets: &HashMap<usize, Option<BranchTargets>>,
    ) {
        let old_len = self.insns.len();
        let mut new_insns = Vec::with_capacity(old_len);
        // remap[i] = new index of old instruction i, or of the first
        // instruction of its replacement sequence
        let mut remap = vec![usize::MAX; old_len + 1];

        for (index, insn) in self.insns.drain(..).enumerate() {
            remap[index] = new_insns.len();
            match replacements.get(&index) {
                Some(seq) => new_insns.extend(seq.iter().cloned()),
                None => new_insns.push(insn),
            }
        }
        remap[old_len] = new_insns.len();

        // A deleted instruction occupies zero slots, so its remap entry
        // already points at the next surviving instruction.
        let map_target = |t: usize| remap[t];

        let mut new_targets = HashMap::new();
        for (index, entry) in self.targets.drain() {
            let replaced = replacements.contains_key(&index) || retargets.contains_key(&index);
            if replaced {
                continue;
            }
            let mapped = match entry {
                BranchTargets::Goto(t) => BranchTargets::Goto(map_target(t)),
                BranchTargets::If(t) => BranchTargets::If(map_target(t)),
                BranchTargets::Switch { keys, targets } => BranchTargets::Switch {
                    keys,
                    targets: targets.into_iter().map(map_target).collect(),
                },
            };
            new_targets.insert(map_target(index), mapped);
        }
        for (&index, entry) in retargets {
            if let Some(entry) = entry {
                let mapped = match entry {
                    BranchTargets::Goto(t) => BranchTargets::Goto(map_target(*t)),
                    BranchTargets::If(t) => BranchTargets::If(map_target(*t)),
                    BranchTargets::Switch { keys, targets } => BranchTargets::Switch {
                        keys: keys.clone(),
                        targets: targets.iter().map(|&t| map_target(t)).collect(),
                    },
                };
                new_targets.insert(map_target(index), mapped);
            }
        }

        self.insns = new_insns;
        self.targets = new_targets;
    }
}
