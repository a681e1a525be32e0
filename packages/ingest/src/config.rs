//! Pipeline configuration.
//!
//! The defaults ship embedded in the binary (`config/default.toml`). A
//! `--config <path>` file replaces them wholesale; CLI flags and
//! [`REGIONS_ENV`] then adjust individual settings through
//! [`Overrides`].

use std::path::Path;

use ladder_ingest_models::ScoreStrategy;
use ladder_models::{Platform, Region, Timeframe};
use ladder_source::fetch::{FetchSettings, TargetTemplate};
use ladder_source::plan::{PlanOptions, RegionPages};
use serde::Deserialize;

use crate::IngestError;

/// The embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Environment variable holding a comma-separated region allow-list.
/// Used when `--regions` is not given.
pub const REGIONS_ENV: &str = "LADDER_REGIONS";

/// Everything one ingestion run needs besides credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Label recorded on the run audit row.
    pub source_name: String,
    /// Leaderboard URL template (`{region}`, `{page}`, `{platform}`,
    /// `{timeframe}`).
    pub base_url: String,
    /// Platform filter.
    #[serde(default)]
    pub platform: Platform,
    /// Timeframe filter.
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Season label written on players and scores.
    pub season: String,
    /// Rows per leaderboard page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Whether the aggregate region is fetched.
    #[serde(default)]
    pub include_global: bool,
    /// Whether players seen only in the aggregate region get player rows.
    #[serde(default)]
    pub global_creates_players: bool,
    /// Page ranges, in fetch order.
    pub regions: Vec<RegionPages>,
    /// Optional allow-list.
    #[serde(default)]
    pub allowed_regions: Option<Vec<Region>>,
    /// Fetch concurrency, retries and timeouts.
    #[serde(default)]
    pub fetch: FetchSettings,
    /// Rows per datastore write.
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    /// Season score selection.
    #[serde(default)]
    pub score_strategy: ScoreStrategy,
}

const fn default_page_size() -> u32 {
    100
}

const fn default_write_batch_size() -> usize {
    500
}

/// Adjustments from the command line and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Region allow-list (`--regions`).
    pub regions: Option<Vec<Region>>,
    /// Forces the aggregate region on (`--include-global`).
    pub include_global: bool,
    /// Score strategy (`--strategy`).
    pub strategy: Option<ScoreStrategy>,
    /// Caps pages per region (`--max-pages`).
    pub max_pages: Option<u32>,
}

impl IngestConfig {
    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Toml`] for malformed TOML and
    /// [`IngestError::Config`] if validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, IngestError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`, or the embedded default.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, IngestError> {
        match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::from_toml(&std::fs::read_to_string(path)?)
            }
            None => Self::from_toml(DEFAULT_CONFIG),
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), IngestError> {
        let fail = |message: &str| {
            Err(IngestError::Config {
                message: message.to_string(),
            })
        };
        if !self.base_url.contains("{region}") || !self.base_url.contains("{page}") {
            return fail("base_url must contain {region} and {page}");
        }
        if self.season.trim().is_empty() {
            return fail("season must not be empty");
        }
        if self.page_size == 0 {
            return fail("page_size must be positive");
        }
        if self.write_batch_size == 0 {
            return fail("write_batch_size must be positive");
        }
        if self.fetch.chunk_size == 0 {
            return fail("fetch.chunk_size must be positive");
        }
        if self.fetch.max_attempts == 0 {
            return fail("fetch.max_attempts must be positive");
        }
        if self.regions.is_empty() {
            return fail("at least one region must be configured");
        }
        if self.allowed_regions.as_ref().is_some_and(Vec::is_empty) {
            return fail("allowed_regions must not be empty");
        }
        Ok(())
    }

    /// Applies CLI and environment overrides.
    ///
    /// The allow-list comes from `overrides.regions`, then `env_regions`
    /// (the raw value of [`REGIONS_ENV`]), then the config file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] if the allow-list is empty or names
    /// an unknown region, or if `max_pages` is zero.
    pub fn apply(
        &mut self,
        overrides: &Overrides,
        env_regions: Option<&str>,
    ) -> Result<(), IngestError> {
        if let Some(regions) = &overrides.regions {
            self.allowed_regions = Some(regions.clone());
        } else if let Some(raw) = env_regions.filter(|s| !s.trim().is_empty()) {
            self.allowed_regions = Some(parse_region_list(raw)?);
        }
        if self.allowed_regions.as_ref().is_some_and(Vec::is_empty) {
            return Err(IngestError::Config {
                message: "region allow-list is empty".to_string(),
            });
        }

        if overrides.include_global {
            self.include_global = true;
        }
        if let Some(strategy) = overrides.strategy {
            self.score_strategy = strategy;
        }
        if let Some(max_pages) = overrides.max_pages {
            if max_pages == 0 {
                return Err(IngestError::Config {
                    message: "--max-pages must be positive".to_string(),
                });
            }
            for pages in &mut self.regions {
                let cap = pages.first_page.saturating_add(max_pages - 1);
                pages.last_page = pages.last_page.min(cap);
            }
        }

        if let Some(allowed) = &self.allowed_regions
            && allowed.contains(&Region::Global)
            && !self.include_global
        {
            log::warn!("GLOBAL is allow-listed but include_global is off; it will not be fetched");
        }

        Ok(())
    }

    /// Planner inputs.
    #[must_use]
    pub fn plan_options(&self) -> PlanOptions<'_> {
        PlanOptions {
            regions: &self.regions,
            include_global: self.include_global,
            allow_list: self.allowed_regions.as_deref(),
        }
    }

    /// Leaderboard URL template.
    #[must_use]
    pub fn target(&self) -> TargetTemplate {
        TargetTemplate {
            base_url: self.base_url.clone(),
            platform: self.platform,
            timeframe: self.timeframe,
        }
    }
}

/// Parses a comma-separated region list such as `"eu, nac"`.
///
/// # Errors
///
/// Returns [`IngestError::Config`] naming the first unknown region, or if
/// the list names no region at all.
pub fn parse_region_list(raw: &str) -> Result<Vec<Region>, IngestError> {
    let regions = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Region>().map_err(|_| IngestError::Config {
                message: format!("unknown region '{s}'"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if regions.is_empty() {
        return Err(IngestError::Config {
            message: format!("region allow-list '{raw}' names no region"),
        });
    }
    Ok(regions)
}

/// Parses a score strategy name.
///
/// # Errors
///
/// Returns [`IngestError::Config`] if the name is not a known strategy.
pub fn parse_strategy(raw: &str) -> Result<ScoreStrategy, IngestError> {
    raw.trim().parse().map_err(|_| IngestError::Config {
        message: format!("unknown score strategy '{raw}' (expected MAX, GLOBAL or REGION)"),
    })
}
