//! Whole-program facts shared by every per-method analysis.
//!
//! The interprocedural pass records, per static field, the join of every
//! value ever written to it; per method, the join of every value it returns
//! and of each argument it is called with. A frozen [`WholeProgramState`] is
//! then read concurrently by all per-method transforms.
//!
//! The builder side is thread-safe: collection phases run over methods in
//! parallel and publish into `DashMap`s.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use crate::analysis::domain::ConstantValue;
use crate::ir::pool::{FieldRef, MethodRef};

/// Immutable interprocedural facts.
///
/// Lookups return `None` for entities the collection phase never saw, which
/// callers must treat as [`ConstantValue::Top`]: an unseen field or method
/// may be written or called from code outside the analyzed scope.
#[derive(Debug, Default)]
pub struct WholeProgramState {
    field_values: HashMap<FieldRef, ConstantValue>,
    return_values: HashMap<MethodRef, ConstantValue>,
    param_values: HashMap<(MethodRef, u16), ConstantValue>,
    pure_getters: HashSet<MethodRef>,
}

impl WholeProgramState {
    /// The state with no facts at all; every lookup yields `Top`.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The join of all values written to `field`, or `Top` if unknown.
    #[must_use]
    pub fn field_value(&self, field: FieldRef) -> ConstantValue {
        self.field_values
            .get(&field)
            .copied()
            .unwrap_or(ConstantValue::Top)
    }

    /// The join of all values returned by `method`, or `Top` if unknown.
    #[must_use]
    pub fn return_value(&self, method: MethodRef) -> ConstantValue {
        self.return_values
            .get(&method)
            .copied()
            .unwrap_or(ConstantValue::Top)
    }

    /// The join of all values passed as argument `index` of `method`.
    #[must_use]
    pub fn param_value(&self, method: MethodRef, index: u16) -> ConstantValue {
        self.param_values
            .get(&(method, index))
            .copied()
            .unwrap_or(ConstantValue::Top)
    }

    /// Whether `method` is a side-effect-free accessor. Calls to such
    /// methods do not invalidate env-local field facts, and their results
    /// may be forwarded through move-result substitution.
    #[must_use]
    pub fn is_pure_getter(&self, method: MethodRef) -> bool {
        self.pure_getters.contains(&method)
    }
}

/// Accumulates whole-program facts from parallel collection passes.
#[derive(Debug, Default)]
pub struct WholeProgramStateBuilder {
    field_values: DashMap<FieldRef, ConstantValue>,
    return_values: DashMap<MethodRef, ConstantValue>,
    param_values: DashMap<(MethodRef, u16), ConstantValue>,
    pure_getters: DashMap<MethodRef, ()>,
}

impl WholeProgramStateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins an observed write of `value` into `field`.
    pub fn record_field_write(&self, field: FieldRef, value: ConstantValue) {
        self.field_values
            .entry(field)
            .and_modify(|v| *v = v.join(value))
            .or_insert(value);
    }

    /// Joins an observed return of `value` from `method`.
    pub fn record_return(&self, method: MethodRef, value: ConstantValue) {
        self.return_values
            .entry(method)
            .and_modify(|v| *v = v.join(value))
            .or_insert(value);
    }

    /// Joins an observed call argument.
    pub fn record_param(&self, method: MethodRef, index: u16, value: ConstantValue) {
        self.param_values
            .entry((method, index))
            .and_modify(|v| *v = v.join(value))
            .or_insert(value);
    }

    pub fn record_pure_getter(&self, method: MethodRef) {
        self.pure_getters.insert(method, ());
    }

    /// Freezes the builder, keeping only facts that survived joining as
    /// singletons or non-null. `Top` entries are dropped; lookups on the
    /// frozen state already default to `Top`.
    #[must_use]
    pub fn freeze(self) -> WholeProgramState {
        let keep = |v: &ConstantValue| *v != ConstantValue::Top;
        WholeProgramState {
            field_values: self
                .field_values
                .into_iter()
                .filter(|(_, v)| keep(v))
                .collect(),
            return_values: self
                .return_values
                .into_iter()
                .filter(|(_, v)| keep(v))
                .collect(),
            param_values: self
                .param_values
                .into_iter()
                .filter(|(_, v)| keep(v))
                .collect(),
            pure_getters: self.pure_getters.into_iter().map(|(m, ())| m).collect(),
        }
    }
}
