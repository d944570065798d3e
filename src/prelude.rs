//! Convenient re-exports of the commonly used types.
//!
//! ```
//! use dexprop::prelude::*;
//! ```

pub use crate::analysis::{
    ConstantEnvironment, ConstantValue, FixpointIterator, FixpointResult, Liveness,
    WholeProgramState, WholeProgramStateBuilder,
};
pub use crate::ir::{
    BasicBlock, BinopKind, BranchTargets, ControlFlowGraph, DexPool, Edge, EdgeKind, FieldRef,
    IfOp, Instruction, InvokeKind, IrCode, MethodRef, MoveKind, Reg, RetType, StringId, TypeId,
};
pub use crate::partition::StoreRefs;
pub use crate::scope::{entry_seed, run_transforms, MethodBody};
pub use crate::transform::{Config, NullAssertionSet, Stats, Transform};
pub use crate::{Error, Result};
