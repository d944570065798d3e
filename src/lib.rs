#![allow(clippy::too_many_arguments)]

//! # dexprop
//!
//! Whole-program constant propagation and branch simplification for a
//! register-based Dalvik-style bytecode IR.
//!
//! The crate splits the work into three read-only inputs and one mutating
//! pass:
//!
//! - [`analysis::WholeProgramState`] — interprocedural facts (uniform field
//!   writes, constant returns, constant call arguments), built concurrently
//!   and frozen before any method is touched
//! - [`analysis::FixpointIterator`] — the per-method forward dataflow
//!   producing an abstract [`analysis::ConstantEnvironment`] per block
//! - [`partition::StoreRefs`] — which cross-store references new constants
//!   are allowed to mint
//! - [`transform::Transform`] — one read-only rule pass queuing edits, one
//!   commit mutating the [`ir::ControlFlowGraph`] in place
//!
//! ## Quick start
//!
//! ```
//! use dexprop::prelude::*;
//!
//! let mut pool = DexPool::new();
//! let assertions = NullAssertionSet::from_pool(&mut pool);
//! let owner = pool.intern_type("Lcom/example/Foo;", false);
//! let method = pool.add_method(owner, "choose", RetType::Primitive);
//!
//! // v0 = 5; if v0 > 0 return v0 else return 0  — the branch is dead.
//! let mut cfg = ControlFlowGraph::new();
//! let b0 = cfg.add_block(vec![
//!     Instruction::Const { dest: Reg::new(0), value: 5 },
//!     Instruction::If { op: IfOp::Gt, src1: Reg::new(0), src2: None },
//! ]);
//! let b1 = cfg.add_block(vec![Instruction::Return { src: Some(Reg::new(0)) }]);
//! let b2 = cfg.add_block(vec![Instruction::Return { src: None }]);
//! cfg.add_edge(b0, b1, EdgeKind::Branch(true));
//! cfg.add_edge(b0, b2, EdgeKind::Branch(false));
//!
//! let wps = WholeProgramState::empty();
//! let stores = StoreRefs::single_store();
//! let mut bodies = vec![MethodBody { method, cfg }];
//! let stats = run_transforms(
//!     &pool, &wps, &stores, &Config::default(), &assertions, &mut bodies,
//! );
//! assert_eq!(stats.branches_removed, 1);
//! ```
//!
//! Rewrites never return recoverable errors: a rule that cannot prove its
//! precondition abstains, and internal invariant violations panic. The
//! fallible surface ([`Error`]) is limited to building IR from untrusted
//! input, e.g. [`ir::ControlFlowGraph::from_code`].

#[macro_use]
pub(crate) mod error;
pub(crate) mod utils;

pub mod analysis;
pub mod ir;
pub mod partition;
pub mod prelude;
pub mod scope;
pub mod transform;

pub use error::{Error, Result};
