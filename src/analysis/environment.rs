//! The abstract state threaded through the intraprocedural analysis.
//!
//! A [`ConstantEnvironment`] maps registers to [`ConstantValue`]s, plus two
//! extras the register file cannot express: a *result* slot bound between an
//! invoke (or const-string / const-class) and the move-result that consumes
//! it, and per-field facts used while analyzing a class initializer (where
//! static fields of the class under init behave like locals).
//!
//! Absent entries mean [`ConstantValue::Top`]. A whole environment can be
//! *unreachable*, the bottom of the environment lattice; joining anything
//! with it returns the other side unchanged.

use std::collections::HashMap;

use crate::analysis::domain::ConstantValue;
use crate::ir::instruction::Reg;
use crate::ir::pool::FieldRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantEnvironment {
    regs: HashMap<Reg, ConstantValue>,
    fields: HashMap<FieldRef, ConstantValue>,
    result: ConstantValue,
    unreachable: bool,
}

impl Default for ConstantEnvironment {
    fn default() -> Self {
        Self::top()
    }
}

impl ConstantEnvironment {
    /// The environment with no information: every register is `Top`.
    #[must_use]
    pub fn top() -> Self {
        Self {
            regs: HashMap::new(),
            fields: HashMap::new(),
            result: ConstantValue::Top,
            unreachable: false,
        }
    }

    /// The unreachable environment.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            regs: HashMap::new(),
            fields: HashMap::new(),
            result: ConstantValue::Top,
            unreachable: true,
        }
    }

    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    /// Marks this environment unreachable, discarding all facts.
    pub fn set_unreachable(&mut self) {
        self.regs.clear();
        self.fields.clear();
        self.result = ConstantValue::Top;
        self.unreachable = true;
    }

    /// The fact for a register. `Top` when nothing is recorded; `Bottom`
    /// when the environment is unreachable.
    #[must_use]
    pub fn get(&self, reg: Reg) -> ConstantValue {
        if self.unreachable {
            return ConstantValue::Bottom;
        }
        self.regs.get(&reg).copied().unwrap_or(ConstantValue::Top)
    }

    pub fn set(&mut self, reg: Reg, value: ConstantValue) {
        if self.unreachable {
            return;
        }
        if value == ConstantValue::Top {
            self.regs.remove(&reg);
        } else {
            self.regs.insert(reg, value);
        }
    }

    /// Refines a register fact with `meet`; used on branch edges.
    pub fn refine(&mut self, reg: Reg, value: ConstantValue) {
        let refined = self.get(reg).meet(value);
        if refined == ConstantValue::Bottom {
            self.set_unreachable();
        } else {
            self.set(reg, refined);
        }
    }

    /// The latent result slot, bound by the most recent result-setting
    /// instruction and consumed by move-result.
    #[must_use]
    pub fn result(&self) -> ConstantValue {
        if self.unreachable {
            ConstantValue::Bottom
        } else {
            self.result
        }
    }

    pub fn set_result(&mut self, value: ConstantValue) {
        if !self.unreachable {
            self.result = value;
        }
    }

    /// The env-local fact for a static field. Only meaningful inside the
    /// field's own class initializer.
    #[must_use]
    pub fn field(&self, field: FieldRef) -> ConstantValue {
        if self.unreachable {
            return ConstantValue::Bottom;
        }
        self.fields
            .get(&field)
            .copied()
            .unwrap_or(ConstantValue::Top)
    }

    pub fn set_field(&mut self, field: FieldRef, value: ConstantValue) {
        if self.unreachable {
            return;
        }
        if value == ConstantValue::Top {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, value);
        }
    }

    /// Drops all field facts. Called when an instruction may run arbitrary
    /// code that could write the fields back.
    pub fn havoc_fields(&mut self) {
        self.fields.clear();
    }

    /// Joins `other` into `self`, returning `true` if `self` changed.
    pub fn join_with(&mut self, other: &Self) -> bool {
        if other.unreachable {
            return false;
        }
        if self.unreachable {
            *self = other.clone();
            return true;
        }
        let mut changed = false;
        // Keys present only in `other` are already Top here and stay Top.
        self.regs.retain(|reg, value| {
            let joined = value.join(other.get(*reg));
            if joined != *value {
                changed = true;
            }
            *value = joined;
            joined != ConstantValue::Top
        });
        self.fields.retain(|field, value| {
            let joined = value.join(other.field(*field));
            if joined != *value {
                changed = true;
            }
            *value = joined;
            joined != ConstantValue::Top
        });
        let result = self.result.join(other.result);
        if result != self.result {
            self.result = result;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_top() {
        let env = ConstantEnvironment::top();
        assert_eq!(env.get(Reg(0)), ConstantValue::Top);
        assert_eq!(env.result(), ConstantValue::Top);
    }

    #[test]
    fn test_unreachable_absorbs() {
        let mut dead = ConstantEnvironment::unreachable();
        assert_eq!(dead.get(Reg(0)), ConstantValue::Bottom);

        let mut live = ConstantEnvironment::top();
        live.set(Reg(0), ConstantValue::Signed(5));
        // Joining a dead predecessor changes nothing.
        assert!(!live.join_with(&ConstantEnvironment::unreachable()));
        assert_eq!(live.get(Reg(0)), ConstantValue::Signed(5));
        // Joining into dead adopts the live side.
        assert!(dead.join_with(&live));
        assert_eq!(dead.get(Reg(0)), ConstantValue::Signed(5));
    }

    #[test]
    fn test_join_widens_disagreement() {
        let mut a = ConstantEnvironment::top();
        a.set(Reg(0), ConstantValue::Signed(1));
        a.set(Reg(1), ConstantValue::Signed(7));
        let mut b = ConstantEnvironment::top();
        b.set(Reg(0), ConstantValue::Signed(1));
        b.set(Reg(1), ConstantValue::Signed(9));

        assert!(a.join_with(&b));
        assert_eq!(a.get(Reg(0)), ConstantValue::Signed(1));
        // 7 join 9: both non-zero, so non-null survives.
        assert_eq!(a.get(Reg(1)), ConstantValue::NonNull);
        // A second identical join reaches a fixpoint.
        assert!(!a.join_with(&b));
    }

    #[test]
    fn test_refine_to_contradiction_kills_env() {
        let mut env = ConstantEnvironment::top();
        env.set(Reg(2), ConstantValue::Signed(3));
        env.refine(Reg(2), ConstantValue::Signed(4));
        assert!(env.is_unreachable());
    }
}
