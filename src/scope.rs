//! Driving the transform across a whole program.
//!
//! Method bodies are independently owned, and every analysis input (pool,
//! whole-program state, store layout, assertion set) is frozen before the
//! run, so methods are transformed in parallel and their [`Stats`] reduced
//! by addition.

use rayon::prelude::*;

use crate::analysis::environment::ConstantEnvironment;
use crate::analysis::fixpoint::FixpointIterator;
use crate::analysis::wps::WholeProgramState;
use crate::ir::cfg::ControlFlowGraph;
use crate::ir::instruction::Instruction;
use crate::ir::pool::{DexPool, MethodRef};
use crate::partition::StoreRefs;
use crate::transform::{Config, NullAssertionSet, Stats, Transform};

/// One method queued for transformation.
#[derive(Debug)]
pub struct MethodBody {
    pub method: MethodRef,
    pub cfg: ControlFlowGraph,
}

/// Builds the entry-block seed environment from interprocedural parameter
/// facts: each `load-param` destination starts at the join of every value
/// callers pass in that position.
#[must_use]
pub fn entry_seed(
    cfg: &ControlFlowGraph,
    wps: &WholeProgramState,
    method: MethodRef,
) -> ConstantEnvironment {
    let mut env = ConstantEnvironment::top();
    let insns = cfg.block(cfg.entry()).instructions();
    for (param, insn) in insns
        .iter()
        .take_while(|i| matches!(i, Instruction::LoadParam { .. }))
        .enumerate()
    {
        if let Instruction::LoadParam { dest, .. } = insn {
            env.set(*dest, wps.param_value(method, param as u16));
        }
    }
    env
}

/// Analyzes and transforms every body in parallel, returning the summed
/// stats. Bodies are mutated in place.
pub fn run_transforms(
    pool: &DexPool,
    wps: &WholeProgramState,
    stores: &StoreRefs,
    config: &Config,
    assertions: &NullAssertionSet,
    bodies: &mut [MethodBody],
) -> Stats {
    bodies
        .par_iter_mut()
        .map(|body| {
            let fixpoint = FixpointIterator::new(pool, wps, config.class_under_init);
            let seed = entry_seed(&body.cfg, wps, body.method);
            let analysis = fixpoint.analyze(&body.cfg, seed);
            let transform = Transform::new(config.clone(), assertions);
            transform.apply(
                &fixpoint,
                &analysis,
                wps,
                &mut body.cfg,
                pool,
                body.method,
                stores,
            )
        })
        .reduce(Stats::default, |a, b| a + b)
}
