//! Spinner shown while the server compiles the module at startup.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    /// Create and start a spinner. Hidden in CI and when stderr is not a terminal.
    pub fn new(message: &str) -> Self {
        if super::is_ci() || !console::user_attended_stderr() {
            return Self {
                pb: ProgressBar::hidden(),
            };
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_strings(&["◐", "◓", "◑", "◒"]));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Stop with a green checkmark. Printed even when the spinner is hidden.
    pub fn finish(&self, message: &str) {
        self.pb.finish_and_clear();
        super::success(message);
    }

    /// Stop with a red cross. Printed even when the spinner is hidden.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        super::error(message);
    }
}
