//! Terminal user interface: logging and progress reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Log to stderr, at the level specified by RUST_LOG (default: warnings)
///
/// Per-chunk messages are emitted at the info level.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

/// Set up a progress bar over a number of work items
pub fn init_progress_reporting(message: impl Into<String>, len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64).with_message(message.into());
    progress.set_style(
        ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len} ({elapsed})")
            .expect("Progress template is valid"),
    );
    progress
}
