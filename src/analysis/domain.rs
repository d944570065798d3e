//! The abstract value lattice for constant propagation.
//!
//! [`ConstantValue`] tracks what is known about one register (or one static
//! field) at one program point:
//!
//! ```text
//!               Top (no information)
//!                |
//!      +---------+----------+--------+
//!      |         |          |        |
//!   Signed    String      Class   NonNull
//!      |         |          |        |
//!      +---------+----------+--------+
//!                |
//!             Bottom (unreachable / conflict)
//! ```
//!
//! `Signed` doubles as the value of object registers proven null (`Signed(0)`
//! is the null reference). `String` and `Class` are singleton object
//! constants; since strings and class objects are interned, equal handles
//! mean the same runtime object. `NonNull` carries no value but licenses
//! null-check elimination.

use std::fmt;

use crate::ir::pool::{StringId, TypeId};

/// A lattice element describing the possible values of one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantValue {
    /// No information.
    Top,
    /// Proven to be exactly this numeric value (or the null reference when 0).
    Signed(i64),
    /// Proven to be exactly this interned string object.
    String(StringId),
    /// Proven to be exactly the class object of this type.
    Class(TypeId),
    /// An object reference proven non-null, value otherwise unknown.
    NonNull,
    /// Unreachable, or conflicting facts.
    Bottom,
}

impl ConstantValue {
    /// Least upper bound: combines facts arriving over different paths.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => x,
            (Self::Top, _) | (_, Self::Top) => Self::Top,
            (a, b) if a == b => a,
            // Distinct non-null singletons still agree on non-nullness.
            (a, b) if a.is_non_null() && b.is_non_null() => Self::NonNull,
            _ => Self::Top,
        }
    }

    /// Greatest lower bound: intersects facts known to hold simultaneously.
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        match (self, other) {
            (Self::Top, x) | (x, Self::Top) => x,
            (Self::Bottom, _) | (_, Self::Bottom) => Self::Bottom,
            (a, b) if a == b => a,
            (Self::NonNull, x) | (x, Self::NonNull) if x.is_non_null() => x,
            _ => Self::Bottom,
        }
    }

    /// The proven numeric value, if this is a singleton number.
    #[must_use]
    pub const fn as_signed(self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(v),
            _ => None,
        }
    }

    /// The proven string constant, if any.
    #[must_use]
    pub const fn as_string(self) -> Option<StringId> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The proven class constant, if any.
    #[must_use]
    pub const fn as_class(self) -> Option<TypeId> {
        match self {
            Self::Class(t) => Some(t),
            _ => None,
        }
    }

    /// Returns `true` if an object register holding this value is provably
    /// the null reference.
    #[must_use]
    pub const fn is_null(self) -> bool {
        matches!(self, Self::Signed(0))
    }

    /// Returns `true` if an object register holding this value is provably
    /// not null.
    #[must_use]
    pub const fn is_non_null(self) -> bool {
        match self {
            Self::String(_) | Self::Class(_) | Self::NonNull => true,
            Self::Signed(v) => v != 0,
            _ => false,
        }
    }

    /// Returns `true` if this is a singleton the materializer could turn
    /// into instructions (partition legality aside).
    #[must_use]
    pub const fn is_singleton(self) -> bool {
        matches!(self, Self::Signed(_) | Self::String(_) | Self::Class(_))
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "⊤"),
            Self::Signed(v) => write!(f, "#{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Class(t) => write!(f, "{t}"),
            Self::NonNull => write!(f, "non-null"),
            Self::Bottom => write!(f, "⊥"),
        }
    }
}
