//! Progress reporting for page fetching and persistence.
//!
//! The pipeline only talks to [`ProgressCallback`]. The CLI renders it as
//! `indicatif` bars; tests use [`NullProgress`].

/// Receives progress updates from a long-running stage.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the stage complete.
    fn finish(&self, msg: String);

    /// A retry round of `pending` pages is starting as 1-based attempt
    /// `attempt` of `max_attempts`.
    fn retry_round(&self, _pending: u64, _attempt: u32, _max_attempts: u32) {}

    /// A page was given up on. Called before the matching [`Self::inc`].
    fn page_failed(&self) {}
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
