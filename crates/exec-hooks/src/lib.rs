//! Pre/post hook pipeline wrapping each execution (spec §4.4).

mod context;
mod pipeline;
mod template;

pub use context::{HookContext, MarkerToken};
pub use pipeline::{HookSpec, PostHookOutcome, run_post_hooks, run_pre_hooks};
pub use template::{shell_escape, substitute_variables};
