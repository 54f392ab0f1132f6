//! Terminal output for the CLI
//!
//! Uses `cliclack` for styled output in interactive terminals, with plain
//! `[OK]`/`[WARN]` lines when stdout is piped or running under CI.

mod context;
mod output;
mod progress;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, outro_warn, remark, step_error_detail, step_info, step_ok,
    step_ok_detail, step_warn_hint,
};
pub use progress::TaskSpinner;
pub use theme::{init_theme, SwcacheTheme};
