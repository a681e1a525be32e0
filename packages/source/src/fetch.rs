//! Page fetching through scraping providers.
//!
//! [`HttpFetcher`] wraps the leaderboard URL for a task into its assigned
//! provider's request template and classifies the answer. A fetch only
//! counts as successful when the status is `200` *and* the body carries a
//! table body: several vendors answer `200` with a captcha page when the
//! origin blocks them.
//!
//! Fetches never return errors. Timeouts and connection failures come back
//! as status `0` so the retry scheduler can treat every failure the same
//! way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ladder_models::{Platform, Region, Timeframe};
use ladder_scraper::has_table_body;
use serde::Deserialize;

use crate::plan::FetchTask;
use crate::router::ProviderRouter;

/// Fetch concurrency, retry and timeout limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchSettings {
    /// Fetches issued concurrently per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum attempts per page, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Backoff before the first retry round, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff cap, in milliseconds (before jitter).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

const fn default_chunk_size() -> usize {
    8
}

const fn default_max_attempts() -> u32 {
    4
}

const fn default_timeout_secs() -> u64 {
    70
}

const fn default_backoff_base_ms() -> u64 {
    2_000
}

const fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Leaderboard URL template.
///
/// `{region}`, `{page}`, `{platform}` and `{timeframe}` are substituted.
#[derive(Debug, Clone)]
pub struct TargetTemplate {
    /// URL with placeholders.
    pub base_url: String,
    /// Platform filter.
    pub platform: Platform,
    /// Timeframe filter.
    pub timeframe: Timeframe,
}

impl TargetTemplate {
    /// Renders the leaderboard URL for one page.
    #[must_use]
    pub fn render(&self, region: Region, page: u32) -> String {
        self.base_url
            .replace("{region}", region.as_ref())
            .replace("{page}", &page.to_string())
            .replace("{platform}", self.platform.as_ref())
            .replace("{timeframe}", self.timeframe.as_ref())
    }
}

/// Outcome of one fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The task as it was when executed.
    pub task: FetchTask,
    /// HTTP status, `0` for timeouts and network failures.
    pub status: u16,
    /// Page HTML (already unwrapped from any JSON envelope).
    pub body: String,
    /// `true` only for status 200 with a table body.
    pub success: bool,
}

impl FetchResult {
    /// Classifies a response.
    #[must_use]
    pub fn classify(task: FetchTask, status: u16, body: String) -> Self {
        let success = status == 200 && has_table_body(&body);
        Self {
            task,
            status,
            body,
            success,
        }
    }

    /// A network-level failure.
    #[must_use]
    pub const fn network_failure(task: FetchTask) -> Self {
        Self {
            task,
            status: 0,
            body: String::new(),
            success: false,
        }
    }

    /// Status 200 without a table body.
    #[must_use]
    pub fn missing_marker(&self) -> bool {
        self.status == 200 && !self.success
    }
}

/// Executes one fetch attempt.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the page for `task`. Never fails; failures are encoded in
    /// the result.
    async fn fetch(&self, task: &FetchTask) -> FetchResult;
}

/// [`PageFetcher`] that goes through the configured scraping providers.
pub struct HttpFetcher {
    client: reqwest::Client,
    router: Arc<ProviderRouter>,
    target: TargetTemplate,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SourceError::Http`] if the HTTP client cannot be
    /// built.
    pub fn new(
        router: Arc<ProviderRouter>,
        target: TargetTemplate,
        settings: &FetchSettings,
    ) -> Result<Self, crate::SourceError> {
        let client = reqwest::Client::builder()
            .user_agent("ladder-ingest/0.1")
            .build()?;
        Ok(Self {
            client,
            router,
            target,
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, task: &FetchTask) -> FetchResult {
        let Some(slot) = self.router.slot(&task.provider) else {
            log::warn!("{} page {}: unknown provider {}", task.region, task.page, task.provider);
            return FetchResult::network_failure(task.clone());
        };
        let Some(api_key) = self.router.credential(task) else {
            log::warn!("{}: no credential available", task.provider);
            return FetchResult::network_failure(task.clone());
        };

        let target = self.target.render(task.region, task.page);
        let url = match slot.definition.request_url(api_key, &target) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("{e}");
                return FetchResult::network_failure(task.clone());
            }
        };

        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                log::debug!(
                    "{} page {} via {} (attempt {}): {e}",
                    task.region,
                    task.page,
                    task.provider,
                    task.attempt + 1
                );
                return FetchResult::network_failure(task.clone());
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => slot.definition.unwrap_content(text),
            Err(e) => {
                log::debug!("{} page {}: body read failed: {e}", task.region, task.page);
                return FetchResult::network_failure(task.clone());
            }
        };

        let result = FetchResult::classify(task.clone(), status, body);
        if result.missing_marker() {
            log::debug!(
                "{} page {} via {}: 200 without table body ({} bytes)",
                task.region,
                task.page,
                task.provider,
                result.body.len()
            );
        }
        result
    }
}

/// Runs `tasks` in sequential chunks of `chunk_size`; fetches within a
/// chunk run concurrently and are awaited together. Results keep task
/// order.
pub async fn fetch_chunked(
    fetcher: &dyn PageFetcher,
    tasks: &[FetchTask],
    chunk_size: usize,
) -> Vec<FetchResult> {
    let mut results = Vec::with_capacity(tasks.len());
    for chunk in tasks.chunks(chunk_size.max(1)) {
        let batch = futures::future::join_all(chunk.iter().map(|task| fetcher.fetch(task))).await;
        results.extend(batch);
    }
    results
}
