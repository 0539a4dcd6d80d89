//! Fleet progress bar.

use colored::Colorize;
use fleet::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

/// Feeds dispatcher progress into an indicatif bar. The bar appears only
/// for runs touching more than one host.
pub struct BarProgress {
    label: String,
    bar: Option<ProgressBar>,
    failed: usize,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            bar: None,
            failed: 0,
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_start(&mut self, total: usize) {
        if total < 2 {
            return;
        }
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(self.label.clone());
        self.bar = Some(bar);
    }

    fn on_host_done(&mut self, host: &str, ok: bool) {
        if !ok {
            self.failed += 1;
        }
        if let Some(bar) = &self.bar {
            if !ok {
                bar.suspend(|| println!("  {} {host}", "✗".red()));
            }
            bar.inc(1);
        }
    }

    fn on_finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            if self.failed == 0 {
                bar.finish_and_clear();
            } else {
                bar.abandon_with_message(format!("{}: {} failed", self.label, self.failed));
            }
        }
    }
}
