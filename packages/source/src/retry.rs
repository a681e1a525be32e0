//! Round-based retry of failed page fetches.
//!
//! [`fetch_with_retries`] runs every pending task once, collects the
//! retryable failures, waits a single backoff delay and runs the next
//! round. Each retried task moves to the next attempt number and is
//! re-routed (see [`ProviderRouter::reroute`]), so a page blocked by one
//! vendor usually lands on another.
//!
//! Retryable failures are the ones that tend to clear up on their own:
//!
//! * status `0` (timeout, connection reset, DNS)
//! * `403` and `429` (vendor-side blocking and rate limiting)
//! * any `5xx`
//! * `200` without a table body (captcha or soft block)
//!
//! Anything else (`404`, other `4xx`) is permanent and the page is given
//! up immediately.

use std::time::Duration;

use ladder_models::Region;
use rand::Rng as _;

use crate::fetch::{FetchResult, FetchSettings, PageFetcher, fetch_chunked};
use crate::plan::FetchTask;
use crate::progress::ProgressCallback;
use crate::router::ProviderRouter;

/// Attempt cap and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per page, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry round.
    pub backoff_base: Duration,
    /// Delay cap (jitter is added on top).
    pub backoff_max: Duration,
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Whether a task that just ran as 0-based `attempt` may run again.
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }

    /// Exponential delay before running attempt `attempt` (1-based retry
    /// number), without jitter: `base * 2^(attempt - 1)`, capped.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << shift)
            .min(self.backoff_max)
    }

    /// [`Self::base_delay`] plus uniform jitter in `[0, delay / 2]`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        if half == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=half);
        delay + Duration::from_millis(jitter)
    }
}

/// Whether a failed fetch is worth another attempt.
#[must_use]
pub fn is_retryable(result: &FetchResult) -> bool {
    if result.success {
        return false;
    }
    // A failed 200 is a page without a table body.
    matches!(result.status, 0 | 200 | 403 | 429 | 500..=599)
}

/// A page that was fetched successfully.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Leaderboard region.
    pub region: Region,
    /// 1-based page number.
    pub page: u32,
    /// Provider that served the successful attempt.
    pub provider: String,
    /// Attempts used, counting the successful one.
    pub attempts: u32,
    /// Page HTML.
    pub body: String,
}

/// A page that was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPage {
    /// Leaderboard region.
    pub region: Region,
    /// 1-based page number.
    pub page: u32,
    /// Provider used for the last attempt.
    pub provider: String,
    /// Attempts used.
    pub attempts: u32,
    /// Status of the last attempt (`0` for network failures).
    pub last_status: u16,
}

/// Everything a batch of fetch tasks produced.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Successful pages, in completion order.
    pub pages: Vec<FetchedPage>,
    /// Exhausted or permanently failed pages.
    pub failed: Vec<FailedPage>,
    /// Total requests issued across all rounds.
    pub attempts: u32,
    /// Rounds run.
    pub rounds: u32,
}

impl FetchOutcome {
    /// Folds another outcome into this one.
    pub fn merge(&mut self, other: Self) {
        self.pages.extend(other.pages);
        self.failed.extend(other.failed);
        self.attempts += other.attempts;
        self.rounds += other.rounds;
    }
}

/// Fetches `tasks`, retrying failures in rounds until nothing is left to
/// retry.
///
/// `progress` advances by one for every page that is settled (fetched or
/// given up).
pub async fn fetch_with_retries(
    fetcher: &dyn PageFetcher,
    router: &ProviderRouter,
    tasks: Vec<FetchTask>,
    chunk_size: usize,
    policy: &RetryPolicy,
    progress: &dyn ProgressCallback,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();
    let mut pending = tasks;

    while !pending.is_empty() {
        if outcome.rounds > 0 {
            let attempt = pending.iter().map(|t| t.attempt).max().unwrap_or(1);
            let delay = policy.backoff_delay(attempt);
            progress.retry_round(pending.len() as u64, attempt + 1, policy.max_attempts);
            log::info!(
                "Retrying {} page(s) (attempt {}/{}) in {delay:?}",
                pending.len(),
                attempt + 1,
                policy.max_attempts
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        outcome.rounds += 1;

        let results = fetch_chunked(fetcher, &pending, chunk_size).await;
        outcome.attempts += u32::try_from(results.len()).unwrap_or(u32::MAX);

        let mut retries = Vec::new();
        for result in results {
            if result.success {
                progress.inc(1);
                outcome.pages.push(FetchedPage {
                    region: result.task.region,
                    page: result.task.page,
                    provider: result.task.provider,
                    attempts: result.task.attempt + 1,
                    body: result.body,
                });
                continue;
            }

            if is_retryable(&result) && policy.allows_retry(result.task.attempt) {
                let mut task = result.task;
                task.attempt += 1;
                let next = router.reroute(&task).to_string();
                log::debug!(
                    "{} page {}: status {} via {}, next attempt via {next}",
                    task.region,
                    task.page,
                    result.status,
                    task.provider
                );
                task.provider = next;
                retries.push(task);
            } else {
                log::warn!(
                    "{} page {}: giving up after {} attempt(s) (last status {})",
                    result.task.region,
                    result.task.page,
                    result.task.attempt + 1,
                    result.status
                );
                progress.page_failed();
                progress.inc(1);
                outcome.failed.push(FailedPage {
                    region: result.task.region,
                    page: result.task.page,
                    provider: result.task.provider,
                    attempts: result.task.attempt + 1,
                    last_status: result.status,
                });
            }
        }

        pending = retries;
    }

    outcome
}
