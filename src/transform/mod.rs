//! The constant-propagation transform.
//!
//! [`Transform::apply`] consumes the per-method fixpoint result plus the
//! frozen whole-program state and rewrites one method body in place. The
//! pass is two-phase: a strictly read-only traversal queues
//! [`queue::ChangeQueue`] edits, then a single commit applies them. Rules
//! are mutually exclusive per instruction; null-check rules run before
//! constant substitution because they change reachability.
//!
//! [`Transform::apply_on_code`] is the legacy entry point over the flat
//! instruction list. It maintains its own rule loop but must agree with the
//! graph path on every shared rule.

pub mod config;
pub mod materialize;
pub mod npe;
pub mod queue;
pub mod stats;

pub use config::Config;
pub use npe::NullAssertionSet;
pub use stats::Stats;

use std::collections::{HashMap, HashSet};

use crate::analysis::environment::ConstantEnvironment;
use crate::analysis::fixpoint::{eval_conditional, FixpointIterator, FixpointResult};
use crate::analysis::liveness::Liveness;
use crate::analysis::wps::WholeProgramState;
use crate::ir::cfg::ControlFlowGraph;
use crate::ir::code::{BranchTargets, IrCode};
use crate::ir::instruction::{Instruction, Reg};
use crate::ir::pool::{DexPool, MethodRef, RetType, TypeId};
use crate::partition::StoreRefs;
use crate::transform::materialize::materialize;
use crate::transform::queue::ChangeQueue;

/// Returns `true` if rewriting control flow in `method` could change which
/// type its return value carries across a store boundary.
///
/// Removing a branch can narrow or widen the set of return sites; when the
/// declared return type is external or partition-illegal from the declaring
/// class, the safe move is to leave every branch alone.
#[must_use]
pub fn has_problematic_return(pool: &DexPool, stores: &StoreRefs, method: MethodRef) -> bool {
    let def = pool.method(method);
    match def.ret {
        RetType::Object(ty) => pool.type_def(ty).external || stores.illegal_ref(def.class, ty),
        _ => false,
    }
}

/// One configured transform instance, shareable across methods.
pub struct Transform<'a> {
    config: Config,
    assertions: &'a NullAssertionSet,
}

impl<'a> Transform<'a> {
    #[must_use]
    pub fn new(config: Config, assertions: &'a NullAssertionSet) -> Self {
        Self { config, assertions }
    }

    /// Rewrites `cfg` in place using the precomputed analysis, returning
    /// what changed. One invocation is one read-only pass plus one commit.
    pub fn apply(
        &self,
        fixpoint: &FixpointIterator<'_>,
        analysis: &FixpointResult,
        wps: &WholeProgramState,
        cfg: &mut ControlFlowGraph,
        pool: &DexPool,
        method: MethodRef,
        stores: &StoreRefs,
    ) -> Stats {
        let declaring = pool.method(method).class;
        let problematic_return = has_problematic_return(pool, stores, method);
        let liveness = Liveness::analyze(cfg, pool);
        let scratch = u16::try_from(cfg.register_count()).expect("register space exhausted");

        let mut queue = ChangeQueue::new();
        self.queue_param_consts(cfg, wps, method, &mut queue);

        // Blocks whose outgoing edges are already rewritten by a queued
        // terminator edit; forwarding must not touch them again.
        let mut edges_rewritten = vec![false; cfg.block_count()];

        for block in 0..cfg.block_count() {
            if cfg.block(block).is_dead() {
                continue;
            }
            let mut env = analysis.entry_state(block).clone();
            if env.is_unreachable() {
                continue;
            }
            let insns = cfg.block(block).instructions();
            let mut claimed_next = false;
            for (index, insn) in insns.iter().enumerate() {
                let claimed = claimed_next;
                claimed_next = false;
                if !claimed {
                    match insn {
                        Instruction::Invoke {
                            method: callee,
                            args,
                            ..
                        } if self.assertions.contains(*callee) && !args.is_empty() => {
                            let checked = args[0];
                            let value = env.get(checked);
                            if value.is_non_null() {
                                queue.delete(block, index, insn, Stats {
                                    null_checks: 1,
                                    null_checks_method_calls: 1,
                                    ..Stats::default()
                                });
                                // Some front ends make the helper return its
                                // argument; keep that binding alive.
                                if let Some(next @ Instruction::MoveResult { dest, kind }) =
                                    insns.get(index + 1)
                                {
                                    queue.replace(
                                        block,
                                        index + 1,
                                        next,
                                        vec![Instruction::Move {
                                            dest: *dest,
                                            src: checked,
                                            kind: *kind,
                                        }],
                                        Stats::default(),
                                    );
                                    claimed_next = true;
                                }
                            } else if value.is_null() {
                                let throw_seq = self.assertions.synthesize_throw(
                                    stores,
                                    declaring,
                                    Reg::new(scratch),
                                    Reg::new(scratch + 1),
                                );
                                queue.replace_with_throw(block, index, insn, throw_seq, Stats {
                                    null_checks: 1,
                                    throws: 1,
                                    ..Stats::default()
                                });
                                edges_rewritten[block] = true;
                                // Everything after the call is discarded at
                                // commit; stop scanning this block.
                                break;
                            }
                        }
                        Instruction::Move { src, .. } if self.config.replace_moves_with_consts => {
                            if let Some(with) =
                                materialize(pool, env.get(*src), insn, stores, declaring)
                            {
                                queue.replace(block, index, insn, with, Stats {
                                    materialized_consts: 1,
                                    ..Stats::default()
                                });
                            }
                        }
                        Instruction::MoveResult { .. } => {
                            let from_pure_getter = index
                                .checked_sub(1)
                                .map(|i| &insns[i])
                                .is_some_and(|prev| matches!(
                                    prev,
                                    Instruction::Invoke { method: m, .. }
                                        if wps.is_pure_getter(*m)
                                ));
                            if self.config.replace_move_result_with_consts || from_pure_getter {
                                if let Some(with) =
                                    materialize(pool, env.result(), insn, stores, declaring)
                                {
                                    queue.replace(block, index, insn, with, Stats {
                                        materialized_consts: 1,
                                        ..Stats::default()
                                    });
                                }
                            }
                        }
                        Instruction::SPut { src, field } => {
                            let written = env.get(*src);
                            let current =
                                if self.config.class_under_init == Some(pool.field(*field).class) {
                                    env.field(*field)
                                } else {
                                    wps.field_value(*field)
                                };
                            if written.is_singleton() && written == current {
                                queue.delete(block, index, insn, Stats {
                                    redundant_puts_removed: 1,
                                    ..Stats::default()
                                });
                            }
                        }
                        Instruction::If { op, src1, src2 } if !problematic_return => {
                            let lhs = env.get(*src1);
                            let rhs = src2.map_or(
                                crate::analysis::domain::ConstantValue::Signed(0),
                                |r| env.get(r),
                            );
                            if let Some(decided) = eval_conditional(*op, lhs, rhs) {
                                let keep = cfg
                                    .branch_target(block, decided)
                                    .expect("decided branch has no edge for its outcome");
                                let forwarded =
                                    chase(cfg, fixpoint, analysis, &liveness, pool, keep);
                                queue.simplify_branch(block, index, insn, forwarded, Stats {
                                    branches_removed: 1,
                                    branches_forwarded: u64::from(forwarded != keep),
                                    ..Stats::default()
                                });
                                edges_rewritten[block] = true;
                            }
                        }
                        Instruction::Switch { src }
                            if self.config.remove_dead_switch && !problematic_return =>
                        {
                            if let Some(value) = env.get(*src).as_signed() {
                                let keep = cfg
                                    .switch_target(block, value)
                                    .expect("switch has no default edge");
                                let forwarded =
                                    chase(cfg, fixpoint, analysis, &liveness, pool, keep);
                                queue.simplify_switch(block, index, insn, forwarded, Stats {
                                    branches_removed: 1,
                                    branches_forwarded: u64::from(forwarded != keep),
                                    ..Stats::default()
                                });
                                edges_rewritten[block] = true;
                            }
                        }
                        _ => {}
                    }
                }
                fixpoint.eval_instruction(insn, &mut env);
            }
        }

        // Forward remaining edges past trivial blocks.
        if !problematic_return {
            for block in 0..cfg.block_count() {
                if cfg.block(block).is_dead()
                    || edges_rewritten[block]
                    || analysis.entry_state(block).is_unreachable()
                {
                    continue;
                }
                let mut seen_dsts = HashSet::new();
                for edge in cfg.successors(block) {
                    if !seen_dsts.insert(edge.dst) {
                        continue;
                    }
                    let forwarded = chase(cfg, fixpoint, analysis, &liveness, pool, edge.dst);
                    if forwarded != edge.dst {
                        queue.forward_edge(block, edge.dst, forwarded, Stats {
                            branches_forwarded: 1,
                            ..Stats::default()
                        });
                    }
                }
            }
        }

        let mut stats = Stats::default();
        queue.commit(cfg, &mut stats);
        stats
    }

    /// Injects const loads for parameters every caller passes the same
    /// number to. Adds instructions, never removes any; a const already
    /// present from a previous run is not duplicated.
    fn queue_param_consts(
        &self,
        cfg: &ControlFlowGraph,
        wps: &WholeProgramState,
        method: MethodRef,
        queue: &mut ChangeQueue,
    ) {
        let insns = cfg.block(cfg.entry()).instructions();
        let prelude = insns
            .iter()
            .take_while(|i| matches!(i, Instruction::LoadParam { .. }))
            .count();
        let existing: Vec<&Instruction> = insns[prelude..]
            .iter()
            .take_while(|i| {
                matches!(i, Instruction::Const { .. } | Instruction::ConstWide { .. })
            })
            .collect();

        let mut adds = Vec::new();
        for (param, insn) in insns[..prelude].iter().enumerate() {
            let Instruction::LoadParam { dest, wide } = insn else {
                unreachable!("prelude holds only load-param instructions");
            };
            let Some(value) =
                wps.param_value(method, param as u16).as_signed()
            else {
                continue;
            };
            let load = if *wide {
                Instruction::ConstWide { dest: *dest, value }
            } else {
                let Ok(narrow) = i32::try_from(value) else {
                    continue;
                };
                Instruction::Const {
                    dest: *dest,
                    value: narrow,
                }
            };
            if existing.iter().any(|e| **e == load) {
                continue;
            }
            adds.push(load);
        }
        if !adds.is_empty() {
            let count = adds.len() as u64;
            queue.insert_at_entry(adds, Stats {
                added_param_consts: count,
                ..Stats::default()
            });
        }
    }

    /// Legacy entry point over the flat instruction list.
    ///
    /// `envs[i]` is the abstract state immediately before instruction `i`;
    /// the caller computes it by stepping
    /// [`FixpointIterator::eval_instruction`] over the list. Shares the
    /// constant-substitution, redundant-put, null-check and dead-branch
    /// rules with the graph path; forwarding and switch pruning are graph
    /// concerns and stay there.
    ///
    /// # Panics
    ///
    /// Panics when `envs` does not cover every instruction.
    pub fn apply_on_code(
        &self,
        envs: &[ConstantEnvironment],
        wps: &WholeProgramState,
        code: &mut IrCode,
        pool: &DexPool,
        method: MethodRef,
        stores: &StoreRefs,
    ) -> Stats {
        assert_eq!(
            envs.len(),
            code.len(),
            "analysis states must cover the whole body"
        );
        let declaring = pool.method(method).class;
        let problematic_return = has_problematic_return(pool, stores, method);
        let scratch = code
            .insns()
            .iter()
            .flat_map(|i| i.dest().into_iter().chain(i.srcs()))
            .map(|r| r.0 + 2)
            .max()
            .unwrap_or(0);

        let mut stats = Stats::default();
        let mut replacements: HashMap<usize, Vec<Instruction>> = HashMap::new();
        let mut retargets: HashMap<usize, Option<BranchTargets>> = HashMap::new();

        for (index, insn) in code.insns().iter().enumerate() {
            if replacements.contains_key(&index) {
                continue;
            }
            let env = &envs[index];
            if env.is_unreachable() {
                continue;
            }
            match insn {
                Instruction::Invoke {
                    method: callee,
                    args,
                    ..
                } if self.assertions.contains(*callee) && !args.is_empty() => {
                    let checked = args[0];
                    let value = env.get(checked);
                    if value.is_non_null() {
                        replacements.insert(index, Vec::new());
                        stats.null_checks += 1;
                        stats.null_checks_method_calls += 1;
                        if let Some(Instruction::MoveResult { dest, kind }) =
                            code.insns().get(index + 1)
                        {
                            replacements.insert(
                                index + 1,
                                vec![Instruction::Move {
                                    dest: *dest,
                                    src: checked,
                                    kind: *kind,
                                }],
                            );
                        }
                    } else if value.is_null() {
                        let throw_seq = self.assertions.synthesize_throw(
                            stores,
                            declaring,
                            Reg::new(scratch),
                            Reg::new(scratch + 1),
                        );
                        replacements.insert(index, throw_seq);
                        stats.null_checks += 1;
                        stats.throws += 1;
                    }
                }
                Instruction::Move { src, .. } if self.config.replace_moves_with_consts => {
                    if let Some(with) = materialize(pool, env.get(*src), insn, stores, declaring) {
                        replacements.insert(index, with);
                        stats.materialized_consts += 1;
                    }
                }
                Instruction::MoveResult { .. } => {
                    let from_pure_getter = index
                        .checked_sub(1)
                        .map(|i| code.insn(i))
                        .is_some_and(|prev| matches!(
                            prev,
                            Instruction::Invoke { method: m, .. } if wps.is_pure_getter(*m)
                        ));
                    if self.config.replace_move_result_with_consts || from_pure_getter {
                        if let Some(with) =
                            materialize(pool, env.result(), insn, stores, declaring)
                        {
                            replacements.insert(index, with);
                            stats.materialized_consts += 1;
                        }
                    }
                }
                Instruction::SPut { src, field } => {
                    let written = env.get(*src);
                    let current =
                        if self.config.class_under_init == Some(pool.field(*field).class) {
                            env.field(*field)
                        } else {
                            wps.field_value(*field)
                        };
                    if written.is_singleton() && written == current {
                        replacements.insert(index, Vec::new());
                        stats.redundant_puts_removed += 1;
                    }
                }
                Instruction::If { op, src1, src2 } if !problematic_return => {
                    let lhs = env.get(*src1);
                    let rhs = src2.map_or(
                        crate::analysis::domain::ConstantValue::Signed(0),
                        |r| env.get(r),
                    );
                    if let Some(decided) = eval_conditional(*op, lhs, rhs) {
                        if decided {
                            let Some(BranchTargets::If(target)) = code.targets_of(index) else {
                                panic!("conditional at {index} is missing its target entry");
                            };
                            replacements.insert(index, vec![Instruction::Goto]);
                            retargets.insert(index, Some(BranchTargets::Goto(*target)));
                        } else {
                            // Never taken: the branch is a fall-through.
                            replacements.insert(index, Vec::new());
                            retargets.insert(index, None);
                        }
                        stats.branches_removed += 1;
                    }
                }
                _ => {}
            }
        }

        if !replacements.is_empty() || !retargets.is_empty() {
            code.rebuild(&replacements, &retargets);
        }
        stats
    }
}

/// Follows chains of skippable blocks from `start` and returns the furthest
/// safe destination.
///
/// A block is skippable when everything before its terminator is free of
/// side effects and throws, its terminator's destination is statically known
/// (a goto, or a branch/switch the analysis decides), and nothing it defines
/// is live where the chain continues.
fn chase(
    cfg: &ControlFlowGraph,
    fixpoint: &FixpointIterator<'_>,
    analysis: &FixpointResult,
    liveness: &Liveness,
    pool: &DexPool,
    start: usize,
) -> usize {
    let mut seen = HashSet::from([start]);
    let mut current = start;
    loop {
        let Some(next) = effective_target(cfg, fixpoint, analysis, current) else {
            return current;
        };
        if liveness.block_defs_live_at(cfg, pool, current, next) || !seen.insert(next) {
            return current;
        }
        current = next;
    }
}

/// The single successor `block` statically transfers to, if any.
fn effective_target(
    cfg: &ControlFlowGraph,
    fixpoint: &FixpointIterator<'_>,
    analysis: &FixpointResult,
    block: usize,
) -> Option<usize> {
    let body = cfg.block(block).instructions();
    let (terminator, prefix) = body.split_last()?;
    if prefix
        .iter()
        .any(|i| i.has_side_effects() || i.can_throw() || matches!(i, Instruction::LoadParam { .. }))
    {
        return None;
    }
    match terminator {
        Instruction::Goto => cfg.goto_target(block),
        Instruction::If { op, src1, src2 } => {
            let mut env = analysis.entry_state(block).clone();
            if env.is_unreachable() {
                return None;
            }
            for insn in prefix {
                fixpoint.eval_instruction(insn, &mut env);
            }
            let lhs = env.get(*src1);
            let rhs = src2.map_or(crate::analysis::domain::ConstantValue::Signed(0), |r| {
                env.get(r)
            });
            let decided = eval_conditional(*op, lhs, rhs)?;
            cfg.branch_target(block, decided)
        }
        Instruction::Switch { src } => {
            let mut env = analysis.entry_state(block).clone();
            if env.is_unreachable() {
                return None;
            }
            for insn in prefix {
                fixpoint.eval_instruction(insn, &mut env);
            }
            let value = env.get(*src).as_signed()?;
            cfg.switch_target(block, value)
        }
        _ => None,
    }
}
