// ctx-assist-cli/src/host.rs
use ctx_assist_core::ResponseStream;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

const TICK_STRINGS: &[&str] = &[
    "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-",
];

/// Response stream for the terminal.
///
/// Progress drives a spinner; markdown is collected and handed back by
/// [`TerminalStream::finish`] so it can be rendered in one pass. Chunks that
/// would run together are separated by a blank line.
pub struct TerminalStream {
    spinner: Option<ProgressBar>,
    markdown: Mutex<String>,
}

impl TerminalStream {
    pub fn new(show_spinner: bool) -> Self {
        let spinner = show_spinner.then(|| {
            let pb = ProgressBar::new_spinner();
            match ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                Ok(style) => pb.set_style(style.tick_strings(TICK_STRINGS)),
                Err(e) => warn!("Invalid spinner template: {}", e),
            }
            pb
        });
        Self {
            spinner,
            markdown: Mutex::new(String::new()),
        }
    }

    /// Stops the spinner and returns everything written so far.
    pub fn finish(self) -> String {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
        self.markdown
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResponseStream for TerminalStream {
    fn progress(&self, message: &str) {
        if let Some(pb) = &self.spinner {
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
        }
    }

    fn markdown(&self, text: &str) {
        let mut buffer = match self.markdown.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !buffer.is_empty() && !buffer.ends_with('\n') && !text.starts_with('\n') {
            buffer.push_str("\n\n");
        }
        buffer.push_str(text);
    }
}
