//! The register-based bytecode intermediate representation.
//!
//! This module defines the structures the transform reads and mutates:
//!
//! - [`pool`] - interned reference tables (strings, types, fields, methods)
//! - [`instruction`] - the decomposed instruction set
//! - [`code`] - the flat instruction-list form of a method body
//! - [`cfg`] - the control-flow-graph form of a method body
//!
//! A method body is owned by the caller and borrowed mutably by the
//! transform for the duration of one invocation; the pool is read-only and
//! shared across all methods.

pub mod cfg;
pub mod code;
pub mod instruction;
pub mod pool;

pub use cfg::{BasicBlock, ControlFlowGraph, Edge, EdgeKind};
pub use code::{BranchTargets, IrCode};
pub use instruction::{BinopKind, IfOp, InsnFlags, Instruction, InvokeKind, MoveKind, Reg};
pub use pool::{DexPool, FieldDef, FieldRef, MethodDef, MethodRef, RetType, StringId, TypeDef, TypeId};
