//! Transform configuration.

use crate::ir::pool::TypeId;

/// Tuning knobs for one [`Transform`](crate::transform::Transform) instance.
///
/// Immutable once the transform is constructed; one config may be shared by
/// every method of a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Replace `move` instructions whose source is a proven constant with a
    /// const load of that value.
    pub replace_moves_with_consts: bool,
    /// Replace `move-result` instructions with const loads when the invoked
    /// method's return value is a proven constant. Off by default: dropping
    /// the binding changes what a debugger observes, and the invoke itself
    /// stays behind either way.
    pub replace_move_result_with_consts: bool,
    /// Rewrite switches with exactly one feasible successor into gotos.
    pub remove_dead_switch: bool,
    /// The class whose static initializer is being transformed, if any.
    /// While set, facts about that class's own static fields come from the
    /// environment rather than the whole-program state, so the first write
    /// in the initializer is never treated as redundant.
    pub class_under_init: Option<TypeId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replace_moves_with_consts: true,
            replace_move_result_with_consts: false,
            remove_dead_switch: true,
            class_under_init: None,
        }
    }
}
