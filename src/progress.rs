//! Adaptive progress telemetry for long-running scrapes.
//!
//! Verbosity scales with expected work size so a 10-dog site logs two lines
//! while a 400-dog site gets a progress bar, throughput and an ETA. The
//! tracker is scrape-local and mutated only by the framework task.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Adaptive logging levels based on processing scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// <= 25 items: start/end only.
    Minimal,
    /// 26-75 items: periodic batch updates.
    Standard,
    /// 76-150 items: progress plus throughput.
    Detailed,
    /// > 150 items: progress bar, ETA, per-operation breakdown.
    Comprehensive,
}

impl Verbosity {
    /// Pick a level from the total item count.
    pub fn for_total(total_items: usize) -> Self {
        match total_items {
            0..=25 => Verbosity::Minimal,
            26..=75 => Verbosity::Standard,
            76..=150 => Verbosity::Detailed,
            _ => Verbosity::Comprehensive,
        }
    }
}

/// Named operation counters surfaced in the scrape log.
pub mod ops {
    pub const ANIMALS_ADDED: &str = "animals_added";
    pub const ANIMALS_UPDATED: &str = "animals_updated";
    pub const ANIMALS_UNCHANGED: &str = "animals_unchanged";
    pub const IMAGES_UPLOADED: &str = "images_uploaded";
    pub const IMAGES_FAILED: &str = "images_failed";
    pub const VALIDATION_FAILURES: &str = "validation_failures";
}

const PROGRESS_BAR_WIDTH: usize = 40;

/// Tracks processing progress with adaptive verbosity.
pub struct ProgressTracker {
    total_items: usize,
    processed_items: usize,
    verbosity: Verbosity,
    batch_size: usize,
    started: Instant,
    last_progress_logged: usize,
    operation_counts: BTreeMap<&'static str, usize>,
    phase_durations: BTreeMap<&'static str, Duration>,
}

impl ProgressTracker {
    pub fn new(total_items: usize, batch_size: usize) -> Self {
        Self {
            total_items,
            processed_items: 0,
            verbosity: Verbosity::for_total(total_items),
            batch_size: batch_size.max(1),
            started: Instant::now(),
            last_progress_logged: 0,
            operation_counts: BTreeMap::new(),
            phase_durations: BTreeMap::new(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn processed(&self) -> usize {
        self.processed_items
    }

    /// Advance the progress count and the matching operation counter.
    pub fn update(&mut self, items: usize, operation: &'static str) {
        self.processed_items += items;
        *self.operation_counts.entry(operation).or_insert(0) += items;
    }

    /// Count an operation without advancing progress (image uploads and the
    /// like, which shadow per-animal progress).
    pub fn track_operation(&mut self, operation: &'static str, count: usize) {
        *self.operation_counts.entry(operation).or_insert(0) += count;
    }

    pub fn operation_count(&self, operation: &str) -> usize {
        self.operation_counts.get(operation).copied().unwrap_or(0)
    }

    /// Record how long a named phase took.
    pub fn record_phase(&mut self, phase: &'static str, elapsed: Duration) {
        self.phase_durations.insert(phase, elapsed);
    }

    pub fn phase_duration(&self, phase: &str) -> Option<Duration> {
        self.phase_durations.get(phase).copied()
    }

    /// True at most once per `batch_size` processed items; always false at
    /// minimal verbosity.
    pub fn should_log_progress(&self) -> bool {
        if self.verbosity == Verbosity::Minimal {
            return false;
        }
        self.processed_items - self.last_progress_logged >= self.batch_size
    }

    /// Mark that progress was just logged.
    pub fn mark_progress_logged(&mut self) {
        self.last_progress_logged = self.processed_items;
    }

    /// Items per second since the tracker started.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.processed_items as f64 / elapsed
    }

    /// Estimated time remaining; None when throughput is zero.
    pub fn eta(&self) -> Option<Duration> {
        let throughput = self.throughput();
        if throughput <= 0.0 {
            return None;
        }
        let remaining = self.total_items.saturating_sub(self.processed_items);
        Some(Duration::from_secs_f64(remaining as f64 / throughput))
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_items == 0 {
            return 100.0;
        }
        self.processed_items as f64 / self.total_items as f64 * 100.0
    }

    /// Render the progress message appropriate for the current verbosity.
    pub fn progress_message(&self) -> String {
        let percentage = self.completion_percentage();
        match self.verbosity {
            Verbosity::Comprehensive => self.comprehensive_message(percentage),
            Verbosity::Detailed => self.detailed_message(percentage),
            Verbosity::Standard => format!(
                "processed {}/{} ({percentage:.0}%)",
                self.processed_items, self.total_items
            ),
            Verbosity::Minimal => format!("processing {} items", self.total_items),
        }
    }

    fn detailed_message(&self, percentage: f64) -> String {
        let mut message = format!(
            "progress {percentage:.0}% ({}/{})",
            self.processed_items, self.total_items
        );
        let throughput = self.throughput();
        if throughput > 0.0 {
            message.push_str(&format!(" | {throughput:.1} items/sec"));
        }
        message
    }

    fn comprehensive_message(&self, percentage: f64) -> String {
        let mut message = format!(
            "{} {percentage:.0}% ({}/{})",
            progress_bar(percentage, PROGRESS_BAR_WIDTH),
            self.processed_items,
            self.total_items
        );
        let throughput = self.throughput();
        if throughput > 0.0 {
            message.push_str(&format!(" | {throughput:.1} items/sec"));
        }
        if let Some(eta) = self.eta() {
            message.push_str(&format!(" | eta {}s", eta.as_secs()));
        }
        if self.operation_counts.len() > 1 {
            let breakdown = self
                .operation_counts
                .iter()
                .map(|(op, count)| format!("{count} {op}"))
                .collect::<Vec<_>>()
                .join(", ");
            message.push_str(&format!(" | {breakdown}"));
        }
        message
    }
}

fn progress_bar(percentage: f64, width: usize) -> String {
    let filled = (width as f64 * percentage / 100.0) as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
