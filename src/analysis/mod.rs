//! Dataflow analyses feeding the constant propagation transform.
//!
//! - [`domain`]: the abstract value lattice
//! - [`environment`]: per-program-point register state
//! - [`fixpoint`]: the forward intraprocedural analysis
//! - [`liveness`]: backward register liveness, used to validate forwarding
//! - [`wps`]: interprocedural field / return / parameter facts

pub mod domain;
pub mod environment;
pub mod fixpoint;
pub mod liveness;
pub mod wps;

pub use domain::ConstantValue;
pub use environment::ConstantEnvironment;
pub use fixpoint::{eval_binop, eval_conditional, FixpointIterator, FixpointResult};
pub use liveness::Liveness;
pub use wps::{WholeProgramState, WholeProgramStateBuilder};
