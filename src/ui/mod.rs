//! UI module for consistent CLI output
//!
//! Uses `cliclack` for spinners and log lines in interactive terminals with
//! automatic fallback to plain output in CI. Under GitHub Actions, cache steps
//! are wrapped in collapsible `::group::` blocks and warnings are raised as
//! workflow annotations.
//!
//! # Example
//!
//! ```rust,ignore
//! use condaprov::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! ui::intro(&ctx, "condaprov");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Restoring conda cache...");
//! spinner.stop("Cache hit");
//!
//! ui::step_skipped(&ctx, "Install conda", "already installed");
//! ui::outro_success(&ctx, "Environment ready");
//! ```

mod context;
mod output;
mod progress;
mod theme;

pub use context::UiContext;
pub use output::{
    group_end, group_start, intro, key_value, key_value_status, outro_error, outro_success,
    remark, section, step_error_detail, step_ok_detail, step_skipped, step_warn,
    step_warn_hint,
};
pub use progress::TaskSpinner;
pub use theme::{init_theme, ProvisionTheme};
