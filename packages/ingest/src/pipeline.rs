//! One ingestion run, end to end.
//!
//! Plan, fetch region by region, parse, normalize, build the payload,
//! persist. The run is bracketed by an `ingestion_runs` row: inserted as
//! `RUNNING` before the first fetch and patched to its terminal status
//! afterwards, including when a stage fails.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use ladder_database::queries;
use ladder_database::store::TableStore;
use ladder_database_models::{NewRun, RunStatus, RunUpdate};
use ladder_ingest_models::IngestSummary;
use ladder_models::RawRow;
use ladder_scraper::leaderboard::{LeaderboardParser, PageContext};
use ladder_source::fetch::PageFetcher;
use ladder_source::plan::{group_by_region, plan_tasks};
use ladder_source::progress::ProgressCallback;
use ladder_source::retry::{FetchOutcome, RetryPolicy, fetch_with_retries};
use ladder_source::router::ProviderRouter;

use crate::IngestError;
use crate::config::IngestConfig;
use crate::normalize::{NormalizeOptions, normalize_and_dedupe};
use crate::payload::build_payload;
use crate::persist::{PersistOptions, persist};

/// Everything a run needs, passed explicitly through every stage.
pub struct PipelineContext {
    /// Effective configuration, overrides applied.
    pub config: IngestConfig,
    /// Provider routing for first attempts and retries.
    pub router: Arc<ProviderRouter>,
    /// Executes fetch attempts.
    pub fetcher: Arc<dyn PageFetcher>,
    /// Destination of every write, the run record included.
    pub store: Arc<dyn TableStore>,
    /// Page parser.
    pub parser: LeaderboardParser,
    /// Set when `store` is an in-memory stand-in.
    pub dry_run: bool,
}

impl PipelineContext {
    /// Bundles the run dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Scrape`] if the page parser cannot be built.
    pub fn new(
        config: IngestConfig,
        router: Arc<ProviderRouter>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn TableStore>,
        dry_run: bool,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            config,
            router,
            fetcher,
            store,
            parser: LeaderboardParser::new()?,
            dry_run,
        })
    }
}

/// Runs one ingestion.
///
/// # Errors
///
/// Returns [`IngestError`] if the run record cannot be created or a
/// persistence write fails. In the latter case the run record is marked
/// `FAILED` with the error message before returning.
pub async fn run(
    ctx: &PipelineContext,
    progress: &dyn ProgressCallback,
) -> Result<IngestSummary, IngestError> {
    let started_at = Utc::now();
    let start = Instant::now();

    let record = queries::insert_run(
        ctx.store.as_ref(),
        &NewRun {
            source: ctx.config.source_name.clone(),
            status: RunStatus::Running,
            started_at,
        },
    )
    .await?;
    log::info!("Started ingestion run {} ({})", record.id, record.source);

    match execute(ctx, record.id, started_at, progress).await {
        Ok(mut summary) => {
            summary.duration = start.elapsed();
            let status = summary.completed_status();
            queries::finish_run(
                ctx.store.as_ref(),
                record.id,
                &RunUpdate {
                    status,
                    finished_at: Utc::now(),
                    rows_written: summary.rows_written(),
                    error_message: None,
                },
            )
            .await?;
            log::info!(
                "Run {} finished {status} in {:.1}s",
                record.id,
                summary.duration.as_secs_f64()
            );
            Ok(summary)
        }
        Err(e) => {
            log::error!("Run {} failed: {e}", record.id);
            let update = RunUpdate {
                status: RunStatus::Failed,
                finished_at: Utc::now(),
                rows_written: 0,
                error_message: Some(e.to_string()),
            };
            if let Err(mark_err) =
                queries::finish_run(ctx.store.as_ref(), record.id, &update).await
            {
                log::warn!("Could not mark run {} as failed: {mark_err}", record.id);
            }
            Err(e)
        }
    }
}

async fn execute(
    ctx: &PipelineContext,
    run_id: i64,
    started_at: chrono::DateTime<Utc>,
    progress: &dyn ProgressCallback,
) -> Result<IngestSummary, IngestError> {
    let config = &ctx.config;
    let mut summary = IngestSummary {
        run_id: Some(run_id),
        dry_run: ctx.dry_run,
        ..IngestSummary::default()
    };

    let tasks = plan_tasks(&config.plan_options(), &ctx.router);
    summary.pages_planned = tasks.len() as u64;
    if tasks.is_empty() {
        log::warn!("Nothing to fetch: no configured region is admitted");
    }
    progress.set_total(summary.pages_planned);

    let policy = RetryPolicy::from(&config.fetch);
    let mut outcome = FetchOutcome::default();
    for (region, region_tasks) in group_by_region(tasks) {
        progress.set_message(region.to_string());
        let region_outcome = fetch_with_retries(
            ctx.fetcher.as_ref(),
            &ctx.router,
            region_tasks,
            config.fetch.chunk_size,
            &policy,
            progress,
        )
        .await;
        log::info!(
            "{region}: {} page(s) fetched, {} failed, {} request(s)",
            region_outcome.pages.len(),
            region_outcome.failed.len(),
            region_outcome.attempts
        );
        outcome.merge(region_outcome);
    }
    summary.requests = u64::from(outcome.attempts);
    summary.pages_failed = outcome.failed.len() as u64;

    let mut raw_rows: Vec<RawRow> = Vec::new();
    for page in outcome.pages {
        let page_ctx = PageContext {
            region: page.region,
            page: page.page,
            page_size: config.page_size,
            platform: config.platform,
            timeframe: config.timeframe,
            provider: page.provider,
        };
        match ctx.parser.parse(&page.body, &page_ctx) {
            Ok(parsed) => {
                summary.pages_fetched += 1;
                summary.rows_unparsable += parsed.skipped as u64;
                raw_rows.extend(parsed.rows);
            }
            Err(e) => {
                log::warn!("{} page {}: {e}", page.region, page.page);
                summary.pages_failed += 1;
            }
        }
    }
    summary.rows_parsed = raw_rows.len() as u64;

    let (rows, stats) = normalize_and_dedupe(
        raw_rows,
        &NormalizeOptions {
            allowed: config.allowed_regions.as_deref(),
            include_global: config.include_global,
        },
    );
    summary.rows_rejected = stats.rejected();
    summary.rows_deduplicated = stats.duplicates;
    summary.rows_normalized = stats.output;

    let payload = build_payload(
        &rows,
        &config.season,
        config.score_strategy,
        config.global_creates_players,
    );

    progress.set_message("persisting".to_string());
    let persisted = persist(
        ctx.store.as_ref(),
        &payload,
        &PersistOptions {
            batch_size: config.write_batch_size,
            snapshot_date: started_at.date_naive(),
            collected_at: Utc::now(),
            run_id: Some(run_id),
        },
    )
    .await?;

    summary.players_written = persisted.players_written;
    summary.snapshots_written = persisted.snapshots_written;
    summary.scores_written = persisted.scores_written;
    summary.snapshots_skipped = persisted.snapshots_skipped;
    summary.snapshots_ignored = persisted.snapshots_ignored;
    summary.scores_skipped = persisted.scores_skipped;

    progress.finish(format!(
        "{} page(s), {} row(s) written",
        summary.pages_fetched,
        summary.rows_written()
    ));

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use ladder_database::DbError;
    use ladder_database::dry_run::DryRunStore;
    use ladder_database::memory::MemoryStore;
    use ladder_database::queries::{PLAYERS, RUNS, SCORES, SNAPSHOTS};
    use ladder_database::store::{Page, Select};
    use ladder_models::Region;
    use ladder_source::fetch::FetchResult;
    use ladder_source::plan::{FetchTask, RegionPages};
    use ladder_source::progress::NullProgress;
    use ladder_source::provider::{ProviderPool, ProviderSlot};
    use serde_json::Value;

    use super::*;

    fn board(rows: &[(u32, &str, u32)]) -> String {
        let body: String = rows
            .iter()
            .map(|(rank, name, points)| {
                format!(
                    "<tr><td class=\"rank\">{rank}</td><td class=\"player-name\">{name}</td>\
                     <td class=\"points\">{points}</td></tr>"
                )
            })
            .collect();
        format!("<html><table><tbody>{body}</tbody></table></html>")
    }

    /// Serves fixed pages; anything unscripted answers 503.
    struct BoardFetcher {
        pages: BTreeMap<(Region, u32), String>,
        calls: AtomicUsize,
    }

    impl BoardFetcher {
        fn new(pages: Vec<((Region, u32), String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for BoardFetcher {
        async fn fetch(&self, task: &FetchTask) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(&(task.region, task.page)) {
                Some(body) => FetchResult::classify(task.clone(), 200, body.clone()),
                None => FetchResult::classify(task.clone(), 503, String::new()),
            }
        }
    }

    /// Delegates to a [`MemoryStore`] but refuses snapshot writes.
    struct SnapshotRejectingStore(MemoryStore);

    #[async_trait]
    impl TableStore for SnapshotRejectingStore {
        async fn upsert(
            &self,
            table: &str,
            on_conflict: &[&str],
            rows: &[Value],
        ) -> Result<Vec<Value>, DbError> {
            if table == SNAPSHOTS {
                return Err(DbError::Status {
                    table: table.to_string(),
                    status: 500,
                    body: "disk full".to_string(),
                });
            }
            self.0.upsert(table, on_conflict, rows).await
        }

        async fn insert(&self, table: &str, row: &Value) -> Result<Value, DbError> {
            self.0.insert(table, row).await
        }

        async fn select(&self, table: &str, query: &Select) -> Result<Page, DbError> {
            self.0.select(table, query).await
        }

        async fn delete_in(
            &self,
            table: &str,
            column: &str,
            values: &[Value],
        ) -> Result<u64, DbError> {
            self.0.delete_in(table, column, values).await
        }

        async fn patch(&self, table: &str, id: i64, fields: &Value) -> Result<(), DbError> {
            self.0.patch(table, id, fields).await
        }
    }

    fn router() -> Arc<ProviderRouter> {
        let slots = crate::all_providers()
            .into_iter()
            .map(|def| ProviderSlot::new(def, 1, vec!["test-key".to_string()]))
            .collect();
        Arc::new(ProviderRouter::new(&ProviderPool::new(slots)).unwrap())
    }

    fn config(regions: &[(Region, u32)]) -> IngestConfig {
        let mut config = IngestConfig::load(None).unwrap();
        config.regions = regions
            .iter()
            .map(|&(region, last_page)| RegionPages {
                region,
                first_page: 1,
                last_page,
            })
            .collect();
        config.include_global = true;
        config.season = "S1".to_string();
        config.fetch.max_attempts = 2;
        config.fetch.backoff_base_ms = 0;
        config.fetch.backoff_max_ms = 0;
        config
    }

    fn context(
        config: IngestConfig,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn TableStore>,
    ) -> PipelineContext {
        PipelineContext::new(config, router(), fetcher, store, false).unwrap()
    }

    fn zed_pages() -> Vec<((Region, u32), String)> {
        vec![
            (
                (Region::Eu, 1),
                board(&[(1, "Zed", 15_000), (2, "Mongraal", 14_000)]),
            ),
            (
                (Region::Global, 1),
                board(&[(1, "Zed", 20_000), (2, "Ghost", 19_000)]),
            ),
        ]
    }

    #[tokio::test]
    async fn zed_scenario_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(
            config(&[(Region::Eu, 1), (Region::Global, 1)]),
            Arc::new(BoardFetcher::new(zed_pages())),
            store.clone(),
        );

        let summary = run(&ctx, &NullProgress).await.unwrap();

        assert_eq!(summary.pages_planned, 2);
        assert_eq!(summary.pages_fetched, 2);
        assert_eq!(summary.pages_failed, 0);
        assert_eq!(summary.rows_parsed, 4);
        assert_eq!(summary.players_written, 2);
        assert_eq!(summary.snapshots_written, 3);
        assert_eq!(summary.snapshots_ignored, 1);

        let players = store.rows(PLAYERS);
        let zed = players.iter().find(|p| p["nickname"] == "Zed").unwrap();
        assert_eq!(zed["region"], "EU");
        let score = store
            .rows(SCORES)
            .into_iter()
            .find(|s| s["player_id"] == zed["id"])
            .unwrap();
        assert_eq!(score["points"], 20_000);

        // Ghost appears only on the aggregate board.
        assert_eq!(summary.completed_status(), RunStatus::Partial);
        let record = queries::get_run(store.as_ref(), summary.run_id.unwrap())
            .await
            .unwrap();
        assert_eq!(record.status, RunStatus::Partial);
        assert_eq!(record.rows_written, summary.rows_written());
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn clean_run_is_success_and_rerun_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let pages = vec![(
            (Region::Eu, 1),
            board(&[(1, "Zed", 15_000), (2, "Mongraal", 14_000)]),
        )];
        let ctx = context(
            config(&[(Region::Eu, 1)]),
            Arc::new(BoardFetcher::new(pages)),
            store.clone(),
        );

        let first = run(&ctx, &NullProgress).await.unwrap();
        assert_eq!(first.completed_status(), RunStatus::Success);
        let players = store.rows(PLAYERS);
        let scores = store.rows(SCORES);
        let snapshots = store.count(SNAPSHOTS);

        let second = run(&ctx, &NullProgress).await.unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(store.rows(PLAYERS), players);
        assert_eq!(store.rows(SCORES), scores);
        assert_eq!(store.count(SNAPSHOTS), snapshots);
        assert_eq!(store.count(RUNS), 2);
    }

    #[tokio::test]
    async fn exhausted_pages_make_run_partial() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(BoardFetcher::new(vec![(
            (Region::Eu, 1),
            board(&[(1, "Zed", 15_000)]),
        )]));
        let ctx = context(config(&[(Region::Eu, 2)]), fetcher.clone(), store.clone());

        let summary = run(&ctx, &NullProgress).await.unwrap();

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.pages_failed, 1);
        // Page 2 was tried twice; page 1 once.
        assert_eq!(summary.requests, 3);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.completed_status(), RunStatus::Partial);
        assert_eq!(store.count(SNAPSHOTS), 1);
    }

    #[tokio::test]
    async fn persistence_failure_marks_run_failed() {
        let store = Arc::new(SnapshotRejectingStore(MemoryStore::new()));
        let ctx = context(
            config(&[(Region::Eu, 1)]),
            Arc::new(BoardFetcher::new(zed_pages())),
            store.clone(),
        );

        let err = run(&ctx, &NullProgress).await.unwrap_err();
        assert!(matches!(err, IngestError::Db(DbError::Status { .. })));

        let runs = store.0.rows(RUNS);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["status"], "FAILED");
        assert!(
            runs[0]["error_message"]
                .as_str()
                .unwrap()
                .contains("disk full")
        );
    }

    #[tokio::test]
    async fn allow_list_limits_fetching() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(BoardFetcher::new(zed_pages()));
        let mut config = config(&[(Region::Eu, 1), (Region::Global, 1)]);
        config.allowed_regions = Some(vec![Region::Eu]);
        let ctx = context(config, fetcher.clone(), store.clone());

        let summary = run(&ctx, &NullProgress).await.unwrap();

        assert_eq!(summary.pages_planned, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.completed_status(), RunStatus::Success);
    }

    #[tokio::test]
    async fn dry_run_resolves_existing_players_without_writing() {
        let base = Arc::new(MemoryStore::new());
        let seeded = context(
            config(&[(Region::Eu, 1)]),
            Arc::new(BoardFetcher::new(zed_pages())),
            base.clone(),
        );
        run(&seeded, &NullProgress).await.unwrap();
        let before = (base.rows(PLAYERS), base.rows(SNAPSHOTS), base.count(RUNS));

        let store = Arc::new(DryRunStore::new(base.clone()));
        let pages = vec![((Region::Global, 1), board(&[(1, "ZED", 20_000)]))];
        let ctx = PipelineContext::new(
            config(&[(Region::Global, 1)]),
            router(),
            Arc::new(BoardFetcher::new(pages)),
            store.clone(),
            true,
        )
        .unwrap();

        let summary = run(&ctx, &NullProgress).await.unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.players_written, 0);
        assert_eq!(summary.snapshots_written, 1);
        assert_eq!(summary.snapshots_ignored, 0);
        assert_eq!(summary.completed_status(), RunStatus::Success);
        assert_eq!(
            (base.rows(PLAYERS), base.rows(SNAPSHOTS), base.count(RUNS)),
            before
        );
        assert_eq!(store.staged().rows(RUNS)[0]["status"], "SUCCESS");
    }
}
