//! Store partition legality.
//!
//! Optimized programs ship as multiple stores (the primary dex plus modules
//! that may be absent or loaded late). Code in one store may only reference
//! types and strings assigned to its own store, the root store, or a store it
//! declares a dependency on. Materializing a `const-class` or `const-string`
//! would mint a new cross-store reference, so the materializer asks
//! [`StoreRefs`] first and abstains when the reference would be illegal.
//!
//! Types and strings with no recorded assignment belong to the root store
//! (index 0), which everything may reference.

use std::collections::HashMap;

use crate::ir::pool::{StringId, TypeId};

/// The root store every other store implicitly depends on.
pub const ROOT_STORE: usize = 0;

/// Store assignments and the inter-store dependency relation.
#[derive(Debug, Default)]
pub struct StoreRefs {
    type_store: HashMap<TypeId, usize>,
    string_store: HashMap<StringId, usize>,
    /// `deps[s]` holds the stores that code in store `s` may reference.
    deps: HashMap<usize, Vec<usize>>,
}

impl StoreRefs {
    /// A single-store layout: nothing is ever illegal.
    #[must_use]
    pub fn single_store() -> Self {
        Self::default()
    }

    /// Assigns `ty` to `store`.
    pub fn assign_type(&mut self, ty: TypeId, store: usize) {
        self.type_store.insert(ty, store);
    }

    /// Assigns `string` to `store`.
    pub fn assign_string(&mut self, string: StringId, store: usize) {
        self.string_store.insert(string, store);
    }

    /// Declares that code in `store` may reference entities in `dep`.
    pub fn add_dependency(&mut self, store: usize, dep: usize) {
        self.deps.entry(store).or_default().push(dep);
    }

    /// The store holding `ty` (root if unassigned).
    #[must_use]
    pub fn store_of_type(&self, ty: TypeId) -> usize {
        self.type_store.get(&ty).copied().unwrap_or(ROOT_STORE)
    }

    fn reachable(&self, from: usize, to: usize) -> bool {
        to == ROOT_STORE
            || to == from
            || self
                .deps
                .get(&from)
                .is_some_and(|deps| deps.contains(&to))
    }

    /// Returns `true` if code declared in `declaring` must not reference
    /// `referenced`.
    #[must_use]
    pub fn illegal_ref(&self, declaring: TypeId, referenced: TypeId) -> bool {
        let from = self.store_of_type(declaring);
        let to = self.store_of_type(referenced);
        !self.reachable(from, to)
    }

    /// Returns `true` if code declared in `declaring` must not reference
    /// `string`.
    #[must_use]
    pub fn illegal_string_ref(&self, declaring: TypeId, string: StringId) -> bool {
        let from = self.store_of_type(declaring);
        let to = self.string_store.get(&string).copied().unwrap_or(ROOT_STORE);
        !self.reachable(from, to)
    }
}
