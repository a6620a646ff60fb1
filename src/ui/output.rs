//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::{style, Style};

/// Display intro banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        ctx.print(format_args!("{}", style(title).cyan().bold()));
        ctx.print("");
    }
}

/// Display success outro
pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        ctx.print("");
        ctx.print(format_args!("{} {}", style("[OK]").green(), message));
    }
}

/// Display error outro
pub fn outro_error(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).red().bold()).ok();
    } else {
        ctx.print("");
        ctx.print(format_args!("{} {}", style("[ERROR]").red(), message));
    }
}

/// Display a section header
pub fn section(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        ctx.print("");
        cliclack::log::info(style(title).bold()).ok();
    } else {
        ctx.print("");
        ctx.print(format_args!("{}", style(title).bold()));
    }
}

/// Open a collapsible log group (GitHub Actions) or print a section header
pub fn group_start(ctx: &UiContext, title: &str) {
    if ctx.github_actions() {
        ctx.print(format_args!("::group::{}", title));
    } else {
        section(ctx, title);
    }
}

/// Close the log group opened by `group_start`
pub fn group_end(ctx: &UiContext) {
    if ctx.github_actions() {
        ctx.print("::endgroup::");
    }
}

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        ctx.print(format_args!("  {} {} ({})", style("[OK]").green(), message, detail));
    }
}

/// Display a warning step
///
/// Under GitHub Actions the warning is also raised as a workflow annotation.
pub fn step_warn(ctx: &UiContext, message: &str) {
    if ctx.github_actions() {
        ctx.print(format_args!("::warning::{}", escape_annotation(message)));
    }
    if ctx.use_fancy_output() {
        cliclack::log::warning(message).ok();
    } else {
        ctx.print(format_args!("  {} {}", style("[WARN]").yellow(), message));
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        ctx.print(format_args!("  {} {} - {}", style("[WARN]").yellow(), message, hint));
    }
}

/// Display an error step with detail
pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::error(format!("{}: {}", message, style(detail).red())).ok();
    } else {
        ctx.print(format_args!("  {} {}: {}", style("[FAIL]").red(), message, detail));
    }
}

/// Display a step that was skipped because its target already exists
pub fn step_skipped(ctx: &UiContext, name: &str, reason: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(format!(
            "{} - {}",
            style(name).dim(),
            style(format!("skipped ({})", reason)).dim()
        ))
        .ok();
    } else {
        ctx.print(format_args!("  {} {} ({})", style("[-]").dim(), name, reason));
    }
}

/// Display a remark/hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        ctx.print(format_args!("  {}", style(message).dim()));
    }
}

/// Print styled key-value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        ctx.print(format_args!("  {}: {}", style(key).dim(), value));
    } else {
        ctx.print(format_args!("  {}: {}", key, value));
    }
}

/// Print styled key-value with status color
pub fn key_value_status(ctx: &UiContext, key: &str, value: &str, ok: bool) {
    let value_style = if ok {
        Style::new().green()
    } else {
        Style::new().yellow()
    };

    if ctx.use_fancy_output() {
        ctx.print(format_args!("  {}: {}", style(key).dim(), value_style.apply_to(value)));
    } else {
        let prefix = if ok { "[OK]" } else { "[WARN]" };
        ctx.print(format_args!("  {} {}: {}", prefix, key, value));
    }
}

/// Escape a message for a single-line workflow annotation
fn escape_annotation(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
