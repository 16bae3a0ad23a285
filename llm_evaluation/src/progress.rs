use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

/// Progress bar over streamed documents with a documents-per-second rate.
pub struct ProgressTracker {
    bar: ProgressBar,
    start_time: Instant,
    completed: usize,
    failed: usize,
}

impl ProgressTracker {
    pub fn new(total: usize, stage: &str) -> Self {
        let bar = ProgressBar::new(total as u64);
        match ProgressStyle::default_bar()
            .template("{prefix} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) - {msg}")
        {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => warn!("Invalid progress template: {}", e),
        }
        bar.set_prefix(stage.to_string());

        Self {
            bar,
            start_time: Instant::now(),
            completed: 0,
            failed: 0,
        }
    }

    pub fn update(&mut self, doc_id: &str) {
        self.completed += 1;
        self.bar.inc(1);
        self.bar
            .set_message(format!("{} - {:.2} docs/sec", doc_id, self.rate(self.completed)));
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    fn rate(&self, count: usize) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn finish(&self) {
        self.bar.finish();
        debug!(
            "Processed {} documents ({} failed to persist) in {:.2}s ({:.2} docs/sec)",
            self.completed,
            self.failed,
            self.start_time.elapsed().as_secs_f64(),
            self.rate(self.completed)
        );
    }
}
