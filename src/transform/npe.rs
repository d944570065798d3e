//! Null-assertion helpers and throw synthesis.
//!
//! Kotlin-compiled code is full of calls to the `Intrinsics` null-assertion
//! helpers. When the analysis proves the checked reference non-null the call
//! is dead weight; when it proves it null, everything after the call is
//! unreachable and the assertion can be collapsed into a direct
//! `NullPointerException` throw.
//!
//! The [`NullAssertionSet`] is built once at startup, while the pool is
//! still mutable, and then shared read-only by every method transform.

use std::collections::HashSet;

use crate::ir::instruction::{Instruction, InvokeKind, Reg};
use crate::ir::pool::{DexPool, MethodRef, RetType, StringId, TypeId};
use crate::partition::StoreRefs;

const INTRINSICS_DESC: &str = "Lkotlin/jvm/internal/Intrinsics;";
const NPE_DESC: &str = "Ljava/lang/NullPointerException;";

/// Intrinsics methods whose first argument is a null-asserted reference.
const ASSERTION_NAMES: [&str; 4] = [
    "checkParameterIsNotNull",
    "checkNotNullParameter",
    "checkExpressionValueIsNotNull",
    "checkNotNullExpressionValue",
];

/// The recognized null-assertion methods, plus everything needed to
/// synthesize a replacement throw.
#[derive(Debug)]
pub struct NullAssertionSet {
    assertions: HashSet<MethodRef>,
    npe_type: TypeId,
    npe_init: MethodRef,
    npe_init_msg: MethodRef,
    message: StringId,
}

impl NullAssertionSet {
    /// Scans the pool for known assertion helpers and interns the handles
    /// throw synthesis needs. Call once, before the pool is frozen.
    pub fn from_pool(pool: &mut DexPool) -> Self {
        let intrinsics = pool.find_type(INTRINSICS_DESC);
        let assertions = pool
            .methods()
            .filter(|(_, def)| {
                Some(def.class) == intrinsics
                    && ASSERTION_NAMES.contains(&def.name.as_str())
            })
            .map(|(method, _)| method)
            .collect();

        let npe_type = pool.intern_type(NPE_DESC, true);
        let npe_init = pool.add_method(npe_type, "<init>", RetType::Void);
        let npe_init_msg = pool.add_method(npe_type, "<init>", RetType::Void);
        let message = pool.intern_string("Null check failed");

        Self {
            assertions,
            npe_type,
            npe_init,
            npe_init_msg,
            message,
        }
    }

    /// Returns `true` if `method` is a recognized null-assertion helper.
    #[must_use]
    pub fn contains(&self, method: MethodRef) -> bool {
        self.assertions.contains(&method)
    }

    /// Builds `new-instance NPE; <init>; throw` into two scratch registers.
    ///
    /// The message-carrying constructor is used when the message string is
    /// partition-legal from `declaring`; otherwise the no-argument
    /// constructor keeps the throw legal everywhere.
    #[must_use]
    pub fn synthesize_throw(
        &self,
        stores: &StoreRefs,
        declaring: TypeId,
        exc_reg: Reg,
        msg_reg: Reg,
    ) -> Vec<Instruction> {
        let mut insns = vec![Instruction::NewInstance {
            dest: exc_reg,
            class: self.npe_type,
        }];
        if stores.illegal_string_ref(declaring, self.message) {
            insns.push(Instruction::Invoke {
                kind: InvokeKind::Direct,
                method: self.npe_init,
                args: vec![exc_reg],
            });
        } else {
            insns.push(Instruction::ConstString {
                string: self.message,
            });
            insns.push(Instruction::MoveResultPseudo { dest: msg_reg });
            insns.push(Instruction::Invoke {
                kind: InvokeKind::Direct,
                method: self.npe_init_msg,
                args: vec![exc_reg, msg_reg],
            });
        }
        insns.push(Instruction::Throw { src: exc_reg });
        insns
    }
}
