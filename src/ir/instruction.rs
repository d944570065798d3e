//! Register-based bytecode instructions.
//!
//! This module defines [`Instruction`], the decomposed representation of a
//! Dalvik-style register instruction in `dest = op(srcs)` form. Branch and
//! switch instructions carry no targets here: in graph form targets live on
//! CFG edges, and in the flat list form they live in a side table
//! (see [`crate::ir::IrCode`]).
//!
//! # Conventions
//!
//! - `dest`: the destination register of the operation result
//! - `src`, `src1`, `src2`: source registers
//! - Instructions that conceptually "return" into a latent result slot
//!   (`const-string`, `const-class`, `invoke-*`) are followed by a
//!   `move-result`/`move-result-pseudo` that names the destination register.
//!   The pair must never be separated; rewrite rules treat the pseudo move as
//!   part of its host instruction.

use std::fmt;

use bitflags::bitflags;
use strum::IntoStaticStr;

use crate::ir::pool::{DexPool, FieldRef, MethodRef, StringId, TypeId};

/// A virtual register.
///
/// Wide (64-bit) values occupy a register pair `(v, v+1)`; the pair is always
/// addressed through its first register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u16);

impl Reg {
    /// Creates a register from a raw number.
    #[must_use]
    pub const fn new(number: u16) -> Self {
        Self(number)
    }

    /// Returns the register number as an index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Width/kind discriminator for `move` family instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// 32-bit value move.
    Value,
    /// 64-bit value move (register pair).
    Wide,
    /// Object reference move.
    Object,
}

/// Binary arithmetic/bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Conditional branch comparisons.
///
/// When the second operand is absent the comparison is against zero
/// (`if-eqz` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum IfOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// Invocation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Direct,
    Interface,
}

bitflags! {
    /// Static properties of an instruction, used by rewrite rules to decide
    /// what is safe to delete, replace or skip over.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InsnFlags: u8 {
        /// Observable effects beyond writing `dest` (calls, stores, throws).
        const SIDE_EFFECTS = 1 << 0;
        /// May raise an exception.
        const CAN_THROW = 1 << 1;
        /// Fills the latent result slot consumed by a following move-result.
        const SETS_RESULT = 1 << 2;
        /// Ends a basic block.
        const TERMINATOR = 1 << 3;
        /// Writes a 64-bit register pair.
        const WIDE_DEST = 1 << 4;
    }
}

/// A single register-based bytecode instruction.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Instruction {
    /// No operation.
    Nop,

    /// Method-entry parameter binding. The prelude of every method is a run
    /// of `load-param` instructions, one per incoming parameter.
    LoadParam { dest: Reg, wide: bool },

    /// `dest = value` (32-bit).
    Const { dest: Reg, value: i32 },

    /// `dest = value` (64-bit register pair).
    ConstWide { dest: Reg, value: i64 },

    /// Load an interned string; result lands in the latent result slot.
    ConstString { string: StringId },

    /// Load a class object; result lands in the latent result slot.
    ConstClass { class: TypeId },

    /// Binds the latent result of the immediately preceding instruction.
    MoveResultPseudo { dest: Reg },

    /// `dest = src`.
    Move { dest: Reg, src: Reg, kind: MoveKind },

    /// Binds the return value of the immediately preceding invoke.
    MoveResult { dest: Reg, kind: MoveKind },

    /// `dest = src1 <op> src2`.
    Binop {
        op: BinopKind,
        dest: Reg,
        src1: Reg,
        src2: Reg,
    },

    /// `dest = src <op> literal`.
    BinopLit {
        op: BinopKind,
        dest: Reg,
        src: Reg,
        lit: i32,
    },

    /// Static field read: `dest = field`.
    #[strum(serialize = "sget")]
    SGet { dest: Reg, field: FieldRef },

    /// Static field write: `field = src`.
    #[strum(serialize = "sput")]
    SPut { src: Reg, field: FieldRef },

    /// Instance field read: `dest = object.field`.
    #[strum(serialize = "iget")]
    IGet {
        dest: Reg,
        object: Reg,
        field: FieldRef,
    },

    /// Instance field write: `object.field = src`.
    #[strum(serialize = "iput")]
    IPut {
        src: Reg,
        object: Reg,
        field: FieldRef,
    },

    /// Allocate an instance: `dest = new class` (uninitialized until the
    /// matching constructor invoke).
    NewInstance { dest: Reg, class: TypeId },

    /// Method invocation; a return value, if any, lands in the latent result
    /// slot and is bound by a following `move-result`.
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        args: Vec<Reg>,
    },

    /// Unconditional jump (target on the CFG edge / in the target table).
    Goto,

    /// Conditional branch. `src2 == None` means compare against zero.
    If {
        op: IfOp,
        src1: Reg,
        src2: Option<Reg>,
    },

    /// Multi-way branch on `src` (case keys on the CFG edges / target table).
    Switch { src: Reg },

    /// Return from the method, optionally carrying a value.
    Return { src: Option<Reg> },

    /// Throw the exception object in `src`.
    Throw { src: Reg },
}

impl Instruction {
    /// The mnemonic for this instruction, e.g. `"const-string"`.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }

    /// The destination register written by this instruction, if any.
    #[must_use]
    pub fn dest(&self) -> Option<Reg> {
        match self {
            Self::LoadParam { dest, .. }
            | Self::Const { dest, .. }
            | Self::ConstWide { dest, .. }
            | Self::MoveResultPseudo { dest }
            | Self::Move { dest, .. }
            | Self::MoveResult { dest, .. }
            | Self::Binop { dest, .. }
            | Self::BinopLit { dest, .. }
            | Self::SGet { dest, .. }
            | Self::IGet { dest, .. }
            | Self::NewInstance { dest, .. } => Some(*dest),
            _ => None,
        }
    }

    /// The source registers read by this instruction.
    #[must_use]
    pub fn srcs(&self) -> Vec<Reg> {
        match self {
            Self::Move { src, .. }
            | Self::BinopLit { src, .. }
            | Self::SPut { src, .. }
            | Self::Throw { src }
            | Self::Switch { src } => vec![*src],
            Self::Binop { src1, src2, .. } => vec![*src1, *src2],
            Self::IGet { object, .. } => vec![*object],
            Self::IPut { src, object, .. } => vec![*src, *object],
            Self::Invoke { args, .. } => args.clone(),
            Self::If { src1, src2, .. } => match src2 {
                Some(s2) => vec![*src1, *s2],
                None => vec![*src1],
            },
            Self::Return { src } => src.map(|s| vec![s]).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Static property flags for this instruction.
    #[must_use]
    pub fn flags(&self) -> InsnFlags {
        match self {
            Self::Nop | Self::LoadParam { wide: false, .. } => InsnFlags::empty(),
            Self::LoadParam { wide: true, .. } => InsnFlags::WIDE_DEST,
            Self::Const { .. } => InsnFlags::empty(),
            Self::ConstWide { .. } => InsnFlags::WIDE_DEST,
            Self::ConstString { .. } | Self::ConstClass { .. } => {
                InsnFlags::SETS_RESULT | InsnFlags::CAN_THROW
            }
            Self::MoveResultPseudo { .. } => InsnFlags::empty(),
            Self::Move { kind, .. } | Self::MoveResult { kind, .. } => match kind {
                MoveKind::Wide => InsnFlags::WIDE_DEST,
                _ => InsnFlags::empty(),
            },
            Self::Binop {
                op: BinopKind::Div | BinopKind::Rem,
                ..
            } => InsnFlags::CAN_THROW,
            Self::Binop { .. } | Self::BinopLit { .. } => InsnFlags::empty(),
            Self::SGet { .. } | Self::IGet { .. } => InsnFlags::CAN_THROW,
            Self::SPut { .. } | Self::IPut { .. } => {
                InsnFlags::SIDE_EFFECTS | InsnFlags::CAN_THROW
            }
            Self::NewInstance { .. } => InsnFlags::CAN_THROW,
            Self::Invoke { .. } => {
                InsnFlags::SIDE_EFFECTS | InsnFlags::CAN_THROW | InsnFlags::SETS_RESULT
            }
            Self::Goto | Self::If { .. } | Self::Switch { .. } | Self::Return { .. } => {
                InsnFlags::TERMINATOR
            }
            Self::Throw { .. } => {
                InsnFlags::TERMINATOR | InsnFlags::SIDE_EFFECTS | InsnFlags::CAN_THROW
            }
        }
    }

    /// Returns `true` if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.flags().contains(InsnFlags::TERMINATOR)
    }

    /// Returns `true` if this instruction has observable effects beyond
    /// writing its destination register.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        self.flags().contains(InsnFlags::SIDE_EFFECTS)
    }

    /// Returns `true` if this instruction may raise an exception.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        self.flags().contains(InsnFlags::CAN_THROW)
    }

    /// Returns `true` if this instruction fills the latent result slot.
    #[must_use]
    pub fn sets_result(&self) -> bool {
        self.flags().contains(InsnFlags::SETS_RESULT)
    }

    /// Returns `true` if the destination is a 64-bit register pair.
    ///
    /// For `sget`/`iget` the width comes from the field definition, which is
    /// why the pool is needed.
    #[must_use]
    pub fn dest_is_wide(&self, pool: &DexPool) -> bool {
        match self {
            Self::SGet { field, .. } | Self::IGet { field, .. } => pool.field(*field).wide,
            _ => self.flags().contains(InsnFlags::WIDE_DEST),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        match self {
            Self::Const { dest, value } => write!(f, " {dest}, #{value}"),
            Self::ConstWide { dest, value } => write!(f, " {dest}, #{value}"),
            Self::ConstString { string } => write!(f, " {string}"),
            Self::ConstClass { class } => write!(f, " {class}"),
            Self::Binop {
                op,
                dest,
                src1,
                src2,
            } => write!(f, ".{op} {dest}, {src1}, {src2}"),
            Self::BinopLit { op, dest, src, lit } => write!(f, ".{op} {dest}, {src}, #{lit}"),
            Self::If { op, src1, src2 } => match src2 {
                Some(s2) => write!(f, "-{op} {src1}, {s2}"),
                None => write!(f, "-{op}z {src1}"),
            },
            Self::Invoke { method, args, .. } => {
                write!(f, " {{")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, "}}, {method}")
            }
            other => {
                let dest = other.dest();
                let srcs = other.srcs();
                let mut first = true;
                for r in dest.into_iter().chain(srcs) {
                    write!(f, "{} {r}", if first { "" } else { "," })?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}
