//! Forward dataflow fixpoint over the control flow graph.
//!
//! The iterator seeds the entry block with an initial [`ConstantEnvironment`]
//! (parameter facts from the whole-program state), then propagates through a
//! worklist until the per-block entry states stabilize. Branch edges refine
//! the propagated state: on the taken side of `if-eqz v` the register is
//! known to be zero, on the other side non-zero. Edges the abstract state
//! proves infeasible propagate the unreachable environment, so blocks only
//! reachable through dead branches end up with a `Bottom` entry state.
//!
//! The transfer function is exposed as [`FixpointIterator::eval_instruction`]
//! so the transform can replay it instruction by instruction and recover the
//! state at any program point from the per-block fixpoint.

use std::collections::VecDeque;

use crate::analysis::domain::ConstantValue;
use crate::analysis::environment::ConstantEnvironment;
use crate::analysis::wps::WholeProgramState;
use crate::ir::cfg::{ControlFlowGraph, EdgeKind};
use crate::ir::instruction::{BinopKind, IfOp, Instruction};
use crate::ir::pool::{DexPool, TypeId};

/// Folds a binary operation over abstract operands.
///
/// Arithmetic wraps like the runtime does. Division and remainder by a
/// proven zero yield `Top`: the instruction throws instead of producing a
/// value, and the throw is not this analysis' concern.
#[must_use]
pub fn eval_binop(op: BinopKind, lhs: ConstantValue, rhs: ConstantValue) -> ConstantValue {
    let (Some(a), Some(b)) = (lhs.as_signed(), rhs.as_signed()) else {
        return ConstantValue::Top;
    };
    let folded = match op {
        BinopKind::Add => a.wrapping_add(b),
        BinopKind::Sub => a.wrapping_sub(b),
        BinopKind::Mul => a.wrapping_mul(b),
        BinopKind::Div => {
            if b == 0 {
                return ConstantValue::Top;
            }
            a.wrapping_div(b)
        }
        BinopKind::Rem => {
            if b == 0 {
                return ConstantValue::Top;
            }
            a.wrapping_rem(b)
        }
        BinopKind::And => a & b,
        BinopKind::Or => a | b,
        BinopKind::Xor => a ^ b,
        BinopKind::Shl => a.wrapping_shl(b as u32 & 63),
        BinopKind::Shr => a.wrapping_shr(b as u32 & 63),
    };
    ConstantValue::Signed(folded)
}

/// Decides a conditional statically, if the abstract operands allow it.
///
/// Besides two proven numbers, equality tests against zero are decided by
/// nullability alone: a proven non-null reference compared `eqz` is always
/// false even when its exact value is unknown.
#[must_use]
pub fn eval_conditional(op: IfOp, lhs: ConstantValue, rhs: ConstantValue) -> Option<bool> {
    if let (Some(a), Some(b)) = (lhs.as_signed(), rhs.as_signed()) {
        return Some(match op {
            IfOp::Eq => a == b,
            IfOp::Ne => a != b,
            IfOp::Lt => a < b,
            IfOp::Ge => a >= b,
            IfOp::Gt => a > b,
            IfOp::Le => a <= b,
        });
    }
    if rhs == ConstantValue::Signed(0) {
        match op {
            IfOp::Eq if lhs.is_non_null() => return Some(false),
            IfOp::Ne if lhs.is_non_null() => return Some(true),
            _ => {}
        }
    }
    None
}

/// Per-block entry states produced by one fixpoint run.
#[derive(Debug)]
pub struct FixpointResult {
    entry_states: Vec<ConstantEnvironment>,
}

impl FixpointResult {
    /// The abstract state on entry to `block`. Unreachable blocks carry the
    /// unreachable environment.
    #[must_use]
    pub fn entry_state(&self, block: usize) -> &ConstantEnvironment {
        &self.entry_states[block]
    }
}

/// The intraprocedural constant propagation analysis for one method.
pub struct FixpointIterator<'a> {
    pool: &'a DexPool,
    wps: &'a WholeProgramState,
    /// When analyzing a class initializer, static fields of this class act
    /// like locals: writes are tracked in the environment and reads hit the
    /// tracked value instead of the whole-program join.
    class_under_init: Option<TypeId>,
}

impl<'a> FixpointIterator<'a> {
    #[must_use]
    pub fn new(
        pool: &'a DexPool,
        wps: &'a WholeProgramState,
        class_under_init: Option<TypeId>,
    ) -> Self {
        Self {
            pool,
            wps,
            class_under_init,
        }
    }

    /// Applies one instruction's transfer function to `env` in place.
    pub fn eval_instruction(&self, insn: &Instruction, env: &mut ConstantEnvironment) {
        if env.is_unreachable() {
            return;
        }
        match insn {
            // Parameter facts arrive through the entry seed.
            Instruction::Nop | Instruction::LoadParam { .. } => {}
            Instruction::Const { dest, value } => {
                env.set(*dest, ConstantValue::Signed(i64::from(*value)));
            }
            Instruction::ConstWide { dest, value } => {
                env.set(*dest, ConstantValue::Signed(*value));
            }
            Instruction::ConstString { string } => {
                env.set_result(ConstantValue::String(*string));
            }
            Instruction::ConstClass { class } => {
                env.set_result(ConstantValue::Class(*class));
            }
            Instruction::MoveResultPseudo { dest } | Instruction::MoveResult { dest, .. } => {
                let value = env.result();
                env.set(*dest, value);
                env.set_result(ConstantValue::Top);
            }
            Instruction::Move { dest, src, .. } => {
                let value = env.get(*src);
                env.set(*dest, value);
            }
            Instruction::Binop {
                op,
                dest,
                src1,
                src2,
            } => {
                let value = eval_binop(*op, env.get(*src1), env.get(*src2));
                env.set(*dest, value);
            }
            Instruction::BinopLit { op, dest, src, lit } => {
                let value = eval_binop(*op, env.get(*src), ConstantValue::Signed(i64::from(*lit)));
                env.set(*dest, value);
            }
            Instruction::SGet { dest, field } => {
                let value = if self.class_under_init == Some(self.pool.field(*field).class) {
                    env.field(*field)
                } else {
                    self.wps.field_value(*field)
                };
                env.set(*dest, value);
            }
            Instruction::SPut { src, field } => {
                if self.class_under_init == Some(self.pool.field(*field).class) {
                    let value = env.get(*src);
                    env.set_field(*field, value);
                }
            }
            Instruction::IGet { dest, .. } => {
                env.set(*dest, ConstantValue::Top);
            }
            Instruction::IPut { .. } => {}
            Instruction::NewInstance { dest, .. } => {
                env.set(*dest, ConstantValue::NonNull);
            }
            Instruction::Invoke { method, .. } => {
                env.set_result(self.wps.return_value(*method));
                // Arbitrary code may store to the fields we track locally.
                if !self.wps.is_pure_getter(*method) {
                    env.havoc_fields();
                }
            }
            Instruction::Goto
            | Instruction::If { .. }
            | Instruction::Switch { .. }
            | Instruction::Return { .. }
            | Instruction::Throw { .. } => {}
        }
    }

    /// Narrows `env` for one outgoing edge of `block`, marking it
    /// unreachable when the abstract state proves the edge infeasible.
    fn refine_edge(
        &self,
        cfg: &ControlFlowGraph,
        block: usize,
        kind: EdgeKind,
        env: &mut ConstantEnvironment,
    ) {
        let Some(terminator) = cfg.block(block).terminator() else {
            return;
        };
        match (terminator, kind) {
            (Instruction::If { op, src1, src2 }, EdgeKind::Branch(taken)) => {
                let lhs = env.get(*src1);
                let rhs = src2.map_or(ConstantValue::Signed(0), |r| env.get(r));
                if let Some(decided) = eval_conditional(*op, lhs, rhs) {
                    if decided != taken {
                        env.set_unreachable();
                        return;
                    }
                }
                // Zero tests teach us nullability on both sides.
                if src2.is_none() {
                    match (op, taken) {
                        (IfOp::Eq, true) | (IfOp::Ne, false) => {
                            env.refine(*src1, ConstantValue::Signed(0));
                        }
                        (IfOp::Eq, false) | (IfOp::Ne, true) => {
                            env.refine(*src1, ConstantValue::NonNull);
                        }
                        _ => {}
                    }
                }
            }
            (Instruction::Switch { src }, EdgeKind::Case(key)) => {
                if let Some(value) = env.get(*src).as_signed() {
                    if value != key {
                        env.set_unreachable();
                        return;
                    }
                }
                env.refine(*src, ConstantValue::Signed(key));
            }
            (Instruction::Switch { src }, EdgeKind::Default) => {
                if let Some(value) = env.get(*src).as_signed() {
                    let covered = cfg
                        .successors(block)
                        .iter()
                        .any(|e| e.kind == EdgeKind::Case(value));
                    if covered {
                        env.set_unreachable();
                    }
                }
            }
            _ => {}
        }
    }

    /// Runs the analysis to a fixpoint and returns the per-block entry
    /// states. `entry_seed` carries facts known about the parameters.
    #[must_use]
    pub fn analyze(
        &self,
        cfg: &ControlFlowGraph,
        entry_seed: ConstantEnvironment,
    ) -> FixpointResult {
        let count = cfg.block_count();
        let mut entry_states = vec![ConstantEnvironment::unreachable(); count];
        if count == 0 {
            return FixpointResult { entry_states };
        }
        entry_states[cfg.entry()] = entry_seed;

        let mut queued = vec![false; count];
        let mut worklist = VecDeque::from([cfg.entry()]);
        queued[cfg.entry()] = true;

        while let Some(block) = worklist.pop_front() {
            queued[block] = false;
            let mut out = entry_states[block].clone();
            for insn in cfg.block(block).instructions() {
                self.eval_instruction(insn, &mut out);
            }
            for edge in cfg.successors(block) {
                let mut along = out.clone();
                self.refine_edge(cfg, block, edge.kind, &mut along);
                if entry_states[edge.dst].join_with(&along) && !queued[edge.dst] {
                    queued[edge.dst] = true;
                    worklist.push_back(edge.dst);
                }
            }
        }

        FixpointResult { entry_states }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::EdgeKind;
    use crate::ir::instruction::Reg;

    fn fixture() -> (DexPool, WholeProgramState) {
        (DexPool::new(), WholeProgramState::empty())
    }

    #[test]
    fn test_eval_binop_folds() {
        let five = ConstantValue::Signed(5);
        let three = ConstantValue::Signed(3);
        assert_eq!(eval_binop(BinopKind::Add, five, three), ConstantValue::Signed(8));
        assert_eq!(eval_binop(BinopKind::Div, five, ConstantValue::Signed(0)), ConstantValue::Top);
        assert_eq!(eval_binop(BinopKind::Mul, five, ConstantValue::Top), ConstantValue::Top);
        assert_eq!(
            eval_binop(BinopKind::Add, ConstantValue::Signed(i64::MAX), ConstantValue::Signed(1)),
            ConstantValue::Signed(i64::MIN)
        );
    }

    #[test]
    fn test_eval_conditional_nullability() {
        assert_eq!(
            eval_conditional(IfOp::Eq, ConstantValue::NonNull, ConstantValue::Signed(0)),
            Some(false)
        );
        assert_eq!(
            eval_conditional(IfOp::Ne, ConstantValue::NonNull, ConstantValue::Signed(0)),
            Some(true)
        );
        assert_eq!(
            eval_conditional(IfOp::Lt, ConstantValue::NonNull, ConstantValue::Signed(0)),
            None
        );
        assert_eq!(
            eval_conditional(IfOp::Ge, ConstantValue::Signed(2), ConstantValue::Signed(2)),
            Some(true)
        );
    }

    #[test]
    fn test_dead_branch_side_is_unreachable() {
        // b0: const v0, #5; if-eqz v0 -> b1 | b2
        // b1: (taken, infeasible)  b2: return
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.add_block(vec![
            Instruction::Const {
                dest: Reg::new(0),
                value: 5,
            },
            Instruction::If {
                op: IfOp::Eq,
                src1: Reg::new(0),
                src2: None,
            },
        ]);
        let b1 = cfg.add_block(vec![Instruction::Return { src: None }]);
        let b2 = cfg.add_block(vec![Instruction::Return { src: Some(Reg::new(0)) }]);
        cfg.add_edge(b0, b1, EdgeKind::Branch(true));
        cfg.add_edge(b0, b2, EdgeKind::Branch(false));

        let (pool, wps) = fixture();
        let iter = FixpointIterator::new(&pool, &wps, None);
        let result = iter.analyze(&cfg, ConstantEnvironment::top());
        assert!(result.entry_state(b1).is_unreachable());
        assert_eq!(result.entry_state(b2).get(Reg::new(0)), ConstantValue::Signed(5));
    }

    #[test]
    fn test_zero_test_refines_both_sides() {
        // v0 unknown; if-eqz splits it into null / non-null facts.
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.add_block(vec![Instruction::If {
            op: IfOp::Eq,
            src1: Reg::new(0),
            src2: None,
        }]);
        let b1 = cfg.add_block(vec![Instruction::Return { src: None }]);
        let b2 = cfg.add_block(vec![Instruction::Return { src: None }]);
        cfg.add_edge(b0, b1, EdgeKind::Branch(true));
        cfg.add_edge(b0, b2, EdgeKind::Branch(false));

        let (pool, wps) = fixture();
        let iter = FixpointIterator::new(&pool, &wps, None);
        let result = iter.analyze(&cfg, ConstantEnvironment::top());
        assert!(result.entry_state(b1).get(Reg::new(0)).is_null());
        assert!(result.entry_state(b2).get(Reg::new(0)).is_non_null());
    }

    #[test]
    fn test_loop_join_widens() {
        // b0: const v0, #0         -> b1
        // b1: if-eqz v1 -> b3 | b2 (v1 unknown, loop condition)
        // b2: binop-lit.add v0, v0, #1; goto b1
        // b3: return v0
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.add_block(vec![
            Instruction::Const {
                dest: Reg::new(0),
                value: 0,
            },
            Instruction::Goto,
        ]);
        let b1 = cfg.add_block(vec![Instruction::If {
            op: IfOp::Eq,
            src1: Reg::new(1),
            src2: None,
        }]);
        let b2 = cfg.add_block(vec![
            Instruction::BinopLit {
                op: BinopKind::Add,
                dest: Reg::new(0),
                src: Reg::new(0),
                lit: 1,
            },
            Instruction::Goto,
        ]);
        let b3 = cfg.add_block(vec![Instruction::Return { src: Some(Reg::new(0)) }]);
        cfg.add_edge(b0, b1, EdgeKind::Goto);
        cfg.add_edge(b1, b3, EdgeKind::Branch(true));
        cfg.add_edge(b1, b2, EdgeKind::Branch(false));
        cfg.add_edge(b2, b1, EdgeKind::Goto);

        let (pool, wps) = fixture();
        let iter = FixpointIterator::new(&pool, &wps, None);
        let result = iter.analyze(&cfg, ConstantEnvironment::top());
        // v0 is 0 or any increment: no single constant survives the loop.
        let at_exit = result.entry_state(b3).get(Reg::new(0));
        assert_eq!(at_exit.as_signed(), None);
    }
}
