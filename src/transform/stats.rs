//! Rewrite counters.

use std::fmt;
use std::ops::{Add, AddAssign};

/// What one transform application did, by category.
///
/// Addition is associative and commutative, so per-method stats can be
/// reduced in any order by a parallel driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Conditional branches and switches replaced by unconditional gotos.
    pub branches_removed: u64,
    /// Edges retargeted past trivial blocks.
    pub branches_forwarded: u64,
    /// Instructions replaced by materialized constant loads.
    pub materialized_consts: u64,
    /// Constant loads injected for proven-constant parameters.
    pub added_param_consts: u64,
    /// Blocks truncated into synthesized null-pointer throws.
    pub throws: u64,
    /// Null-assertion results resolved statically.
    pub null_checks: u64,
    /// Of those, assertion calls removed outright.
    pub null_checks_method_calls: u64,
    /// Redundant static field writes deleted.
    pub redundant_puts_removed: u64,
}

impl Stats {
    /// Returns `true` if the transform changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.branches_removed += rhs.branches_removed;
        self.branches_forwarded += rhs.branches_forwarded;
        self.materialized_consts += rhs.materialized_consts;
        self.added_param_consts += rhs.added_param_consts;
        self.throws += rhs.throws;
        self.null_checks += rhs.null_checks;
        self.null_checks_method_calls += rhs.null_checks_method_calls;
        self.redundant_puts_removed += rhs.redundant_puts_removed;
    }
}

impl Add for Stats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "branches_removed={} branches_forwarded={} materialized_consts={} \
             added_param_consts={} throws={} null_checks={} \
             null_checks_method_calls={} redundant_puts_removed={}",
            self.branches_removed,
            self.branches_forwarded,
            self.materialized_consts,
            self.added_param_consts,
            self.throws,
            self.null_checks,
            self.null_checks_method_calls,
            self.redundant_puts_removed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_associative_and_commutative() {
        let a = Stats {
            branches_removed: 1,
            null_checks: 2,
            ..Stats::default()
        };
        let b = Stats {
            branches_removed: 3,
            throws: 1,
            ..Stats::default()
        };
        let c = Stats {
            materialized_consts: 7,
            ..Stats::default()
        };
        assert_eq!(a + b, b + a);
        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!(a + Stats::default(), a);
    }
}
