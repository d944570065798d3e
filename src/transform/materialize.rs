//! Turning proven abstract values back into instructions.
//!
//! [`materialize`] is pure and side-effect free: rules call it speculatively
//! to ask "could this instruction be replaced by a constant load?", and a
//! `None` simply means the rule abstains. It never queues or applies
//! anything itself.

use crate::analysis::domain::ConstantValue;
use crate::ir::instruction::Instruction;
use crate::ir::pool::{DexPool, TypeId};
use crate::partition::StoreRefs;

/// Builds the instruction sequence that loads `value` into the destination
/// of `original`, or `None` when no legal materialization exists.
///
/// - Numbers become a `const` sized to the destination width; a value that
///   does not fit a narrow destination abstains.
/// - Strings and class objects become the two-instruction
///   `const-string`/`const-class` + `move-result-pseudo` pair, but only when
///   the new reference is legal from `declaring`'s store.
/// - `Top`, `Bottom` and bare `NonNull` carry no materializable value.
#[must_use]
pub fn materialize(
    pool: &DexPool,
    value: ConstantValue,
    original: &Instruction,
    stores: &StoreRefs,
    declaring: TypeId,
) -> Option<Vec<Instruction>> {
    let dest = original.dest()?;
    match value {
        ConstantValue::Signed(v) => {
            if original.dest_is_wide(pool) {
                Some(vec![Instruction::ConstWide { dest, value: v }])
            } else {
                let narrow = i32::try_from(v).ok()?;
                Some(vec![Instruction::Const {
                    dest,
                    value: narrow,
                }])
            }
        }
        ConstantValue::String(string) => {
            if stores.illegal_string_ref(declaring, string) {
                return None;
            }
            Some(vec![
                Instruction::ConstString { string },
                Instruction::MoveResultPseudo { dest },
            ])
        }
        ConstantValue::Class(class) => {
            if stores.illegal_ref(declaring, class) {
                return None;
            }
            Some(vec![
                Instruction::ConstClass { class },
                Instruction::MoveResultPseudo { dest },
            ])
        }
        ConstantValue::Top | ConstantValue::NonNull | ConstantValue::Bottom => None,
    }
}
