use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::processor::batch::BatchReport;

/// Account-level progress bar. Hidden while log output is on, since both write to stderr.
pub struct ProgressTracker {
    pb: ProgressBar,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(accounts: usize, visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::new(accounts as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner} [{bar:30}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            start_time: Instant::now(),
        }
    }

    pub fn hidden() -> Self {
        Self::new(0, false)
    }

    pub fn account(&self, identity: &str) {
        self.pb.set_message(identity.to_string());
    }

    pub fn advance(&self) {
        self.pb.inc(1);
    }

    pub fn finish(&self, report: &BatchReport) {
        self.pb.finish_with_message(format!(
            "{} exported, {} skipped, {} failed in {:.1}s",
            report.processed.len(),
            report.skipped.len(),
            report.failed.len(),
            self.start_time.elapsed().as_secs_f32()
        ));
    }
}
