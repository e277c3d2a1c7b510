use std::{fmt::Display, time::Duration};

use console::{style, Emoji};
use indicatif::ProgressBar;

/// Completed stage marker.
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[ok] ");

/// Failed stage marker.
static FAILURE: Emoji<'_, '_> = Emoji("‼️ ", "[!!] ");

/// Non-fatal problem marker.
static WARNING: Emoji<'_, '_> = Emoji("⚠️ ", "[warn] ");

/// Disabled stage marker.
static SKIPPED: Emoji<'_, '_> = Emoji("🍺 ", "[skip] ");

/// Print a completed stage message.
pub(crate) fn success(message: impl Display) {
    println!("{SUCCESS}{message}");
}

/// Print a non-fatal warning.
pub(crate) fn warning(message: impl Display) {
    println!("{WARNING}{message}");
}

/// Print a message for a stage that was not requested.
pub(crate) fn skipped(message: impl Display) {
    println!("{SKIPPED}{message}");
}

/// Print a failed stage message, followed by the highlighted cause.
pub(crate) fn failure(message: impl Display, cause: impl Display) {
    println!("{FAILURE}{message}");
    println!("{}", style(format!("Error : {cause}")).red().bold());
}

/// Start a spinner for a long running stage.
///
/// Spinners are drawn to stderr and are hidden when it is not a terminal.
pub(crate) fn spinner(message: &'static str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.enable_steady_tick(Duration::from_millis(150));
    progress.set_message(message);
    progress
}
