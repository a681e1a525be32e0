#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the leaderboard ingestion tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use ladder_cli_utils::{IndicatifProgress, init_logger};
use ladder_database::dry_run::DryRunStore;
use ladder_database::memory::MemoryStore;
use ladder_database::rest::RestStore;
use ladder_database::store::TableStore;
use ladder_ingest::cleanup::{CleanupOptions, cleanup_aggregate_only};
use ladder_ingest::config::{
    IngestConfig, Overrides, REGIONS_ENV, parse_region_list, parse_strategy,
};
use ladder_ingest::pipeline::{self, PipelineContext};
use ladder_ingest::{IngestError, provider_pool};
use ladder_ingest_models::{CleanupSummary, IngestSummary};
use ladder_source::fetch::HttpFetcher;
use ladder_source::plan::plan_tasks;
use ladder_source::router::ProviderRouter;

/// Snapshots read per cleanup scan request.
const CLEANUP_SCAN_PAGE_SIZE: u64 = 1000;

#[derive(Parser)]
#[command(
    name = "ladder_ingest",
    about = "Leaderboard ingestion tool",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Pipeline config file (replaces the built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Comma-separated region allow-list (overrides `LADDER_REGIONS`)
    #[arg(long)]
    regions: Option<String>,
    /// Fetch the GLOBAL leaderboard even if the config disables it
    #[arg(long)]
    include_global: bool,
    /// Season score strategy: MAX, GLOBAL or REGION
    #[arg(long)]
    strategy: Option<String>,
    /// Maximum pages fetched per region
    #[arg(long)]
    max_pages: Option<u32>,
    /// Read the datastore but keep every write in memory
    #[arg(long)]
    dry_run: bool,
    /// Remove GLOBAL-only players before ingesting
    #[arg(long)]
    cleanup_first: bool,
}

impl RunArgs {
    fn overrides(&self) -> Result<Overrides, IngestError> {
        Ok(Overrides {
            regions: self
                .regions
                .as_deref()
                .map(parse_region_list)
                .transpose()?,
            include_global: self.include_global,
            strategy: self.strategy.as_deref().map(parse_strategy).transpose()?,
            max_pages: self.max_pages,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and persist leaderboards (the default)
    Run(RunArgs),
    /// Remove players that only appear on the GLOBAL leaderboard
    Cleanup {
        /// Report what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the planned fetch tasks without fetching
    Plan(RunArgs),
    /// List scraping providers and their configuration state
    Providers,
    /// Print the reference table DDL
    Schema,
}

fn effective_config(
    path: Option<&std::path::Path>,
    args: &RunArgs,
) -> Result<IngestConfig, IngestError> {
    let mut config = IngestConfig::load(path)?;
    let env_regions = std::env::var(REGIONS_ENV).ok();
    config.apply(&args.overrides()?, env_regions.as_deref())?;
    Ok(config)
}

fn print_ingest_summary(summary: &IngestSummary) {
    println!();
    println!(
        "Run {}{}",
        summary
            .run_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        if summary.dry_run { " (dry run)" } else { "" }
    );
    println!("{}", "-".repeat(40));
    println!("{:<24} {}", "Status", summary.completed_status());
    println!(
        "{:<24} {}/{} ({} failed)",
        "Pages fetched", summary.pages_fetched, summary.pages_planned, summary.pages_failed
    );
    println!("{:<24} {}", "Requests", summary.requests);
    println!(
        "{:<24} {} ({} unparsable, {} rejected, {} duplicate)",
        "Rows parsed",
        summary.rows_parsed,
        summary.rows_unparsable,
        summary.rows_rejected,
        summary.rows_deduplicated
    );
    println!("{:<24} {}", "Players written", summary.players_written);
    println!(
        "{:<24} {} ({} skipped, {} ignored)",
        "Snapshots written",
        summary.snapshots_written,
        summary.snapshots_skipped,
        summary.snapshots_ignored
    );
    println!(
        "{:<24} {} ({} skipped)",
        "Scores written", summary.scores_written, summary.scores_skipped
    );
    println!(
        "{:<24} {:.1}s",
        "Duration",
        summary.duration.as_secs_f64()
    );
}

fn print_cleanup_summary(summary: &CleanupSummary) {
    println!(
        "Cleanup{}: scanned {} snapshot(s), {} regional player(s), {} GLOBAL-only",
        if summary.dry_run { " (dry run)" } else { "" },
        summary.scanned_snapshots,
        summary.regional_players,
        summary.aggregate_only_players
    );
    if !summary.dry_run {
        println!(
            "Deleted {} player(s), {} snapshot(s), {} score(s)",
            summary.players_deleted, summary.snapshots_deleted, summary.scores_deleted
        );
    }
}

async fn run_cleanup(
    store: &dyn TableStore,
    config: &IngestConfig,
    dry_run: bool,
) -> Result<CleanupSummary, IngestError> {
    let start = Instant::now();
    let summary = cleanup_aggregate_only(
        store,
        &CleanupOptions {
            batch_size: config.write_batch_size,
            scan_page_size: CLEANUP_SCAN_PAGE_SIZE,
            dry_run,
        },
    )
    .await?;
    log::info!("Cleanup finished in {:.1}s", start.elapsed().as_secs_f64());
    Ok(summary)
}

/// Store for `run --dry-run`: reads go to the datastore when it is
/// configured, writes stay in memory.
fn dry_run_store() -> Arc<dyn TableStore> {
    match RestStore::from_env() {
        Ok(rest) => {
            log::info!("Dry run: reading the datastore, writes stay in memory");
            Arc::new(DryRunStore::new(Arc::new(rest)))
        }
        Err(e) => {
            log::warn!("Dry run without a datastore ({e}); counts start from an empty store");
            Arc::new(MemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or_else(|| Commands::Run(cli.run.clone())) {
        Commands::Run(args) => {
            let config = effective_config(config_path, &args)?;

            let router = Arc::new(ProviderRouter::new(&provider_pool())?);
            let fetcher = Arc::new(HttpFetcher::new(
                router.clone(),
                config.target(),
                &config.fetch,
            )?);
            let store: Arc<dyn TableStore> = if args.dry_run {
                dry_run_store()
            } else {
                Arc::new(RestStore::from_env()?)
            };

            if args.cleanup_first {
                let summary = run_cleanup(store.as_ref(), &config, args.dry_run).await?;
                print_cleanup_summary(&summary);
            }

            let ctx = PipelineContext::new(config, router, fetcher, store, args.dry_run)?;
            let progress = IndicatifProgress::pages_bar(&multi, "Fetching leaderboard pages");
            let summary = pipeline::run(&ctx, progress.as_ref()).await?;
            print_ingest_summary(&summary);
        }
        Commands::Cleanup { dry_run } => {
            let config = IngestConfig::load(config_path)?;
            let store = RestStore::from_env()?;
            let summary = run_cleanup(&store, &config, dry_run).await?;
            print_cleanup_summary(&summary);
        }
        Commands::Plan(args) => {
            let config = effective_config(config_path, &args)?;
            let router = ProviderRouter::new(&provider_pool())?;
            let target = config.target();
            let tasks = plan_tasks(&config.plan_options(), &router);

            println!("{:<8} {:>5} {:<14} URL", "REGION", "PAGE", "PROVIDER");
            println!("{}", "-".repeat(80));
            for task in &tasks {
                println!(
                    "{:<8} {:>5} {:<14} {}",
                    task.region.as_ref(),
                    task.page,
                    task.provider,
                    target.render(task.region, task.page)
                );
            }
            println!("{} task(s)", tasks.len());
        }
        Commands::Providers => {
            let pool = provider_pool();
            println!(
                "{:<14} {:<24} {:<8} {:>6} {:>5}",
                "ID", "NAME", "ENABLED", "WEIGHT", "KEYS"
            );
            println!("{}", "-".repeat(62));
            for slot in pool.slots() {
                println!(
                    "{:<14} {:<24} {:<8} {:>6} {:>5}",
                    slot.id(),
                    slot.definition.name,
                    if slot.is_enabled() { "yes" } else { "no" },
                    slot.weight,
                    slot.credentials.len()
                );
            }
        }
        Commands::Schema => {
            print!("{}", ladder_database::SCHEMA_SQL);
        }
    }

    Ok(())
}
