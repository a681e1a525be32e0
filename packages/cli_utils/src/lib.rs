#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the ladder ingestion CLI.
//!
//! [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, so log lines print above the progress bars
//! instead of tearing them. [`IndicatifProgress`] renders the fetch stage,
//! annotating the page counter with the retry round in flight and the
//! number of pages given up on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use ladder_source::progress::ProgressCallback;

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const PAGES_TEMPLATE: &str =
    "  {msg} {wide_bar:.cyan/dim} {pos}/{len} pages {prefix:.yellow} [{eta}]";

/// Fetch-stage page counter with a retry and failure annotation.
pub struct IndicatifProgress {
    bar: ProgressBar,
    pages_style: ProgressStyle,
    failed: AtomicU64,
    attempt: AtomicU32,
    max_attempts: AtomicU32,
}

/// Retry and failure annotation shown after the page counter.
fn fetch_status(attempt: u32, max_attempts: u32, failed: u64) -> String {
    let mut parts = Vec::new();
    if attempt > 1 {
        parts.push(format!("retry {attempt}/{max_attempts}"));
    }
    if failed > 0 {
        parts.push(format!("{failed} failed"));
    }
    parts.join(", ")
}

impl IndicatifProgress {
    fn new(bar: ProgressBar) -> Self {
        Self {
            bar,
            pages_style: ProgressStyle::with_template(PAGES_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
            failed: AtomicU64::new(0),
            attempt: AtomicU32::new(1),
            max_attempts: AtomicU32::new(1),
        }
    }

    /// Page counter for a run's fetch rounds, added to `multi`. Spins
    /// until the page count is known.
    #[must_use]
    pub fn pages_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Arc::new(Self::new(bar))
    }

    fn refresh_status(&self) {
        self.bar.set_prefix(fetch_status(
            self.attempt.load(Ordering::Relaxed),
            self.max_attempts.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        ));
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.pages_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn retry_round(&self, _pending: u64, attempt: u32, max_attempts: u32) {
        self.attempt.store(attempt, Ordering::Relaxed);
        self.max_attempts.store(max_attempts, Ordering::Relaxed);
        self.refresh_status();
    }

    fn page_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.refresh_status();
    }
}

/// Installs the global logger (filter from `RUST_LOG`) wrapped in
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Fails only if a logger is already installed.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
