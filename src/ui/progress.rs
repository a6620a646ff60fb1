//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    ctx: UiContext,
}

impl TaskSpinner {
    /// Create a new spinner (shows nothing until started)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            ctx: ctx.clone(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.ctx.use_fancy_output() {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            // Plain output for CI
            self.ctx.print(format_args!("{} {}", style("...").dim(), message));
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.ctx.use_fancy_output() {
            // Fallback if spinner wasn't started
            self.ctx.print(format_args!("{} {}", style("✓").green(), message));
        } else {
            self.ctx.print(format_args!("{} {}", style("[OK]").green(), message));
        }
    }

    /// Stop with warning message
    pub fn stop_warn(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.ctx.use_fancy_output() {
            self.ctx.print(format_args!("{} {}", style("!").yellow(), message));
        } else {
            self.ctx.print(format_args!("{} {}", style("[WARN]").yellow(), message));
        }
    }
}
