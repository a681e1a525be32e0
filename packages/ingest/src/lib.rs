#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Leaderboard ingestion: fetched pages in, players, ranking snapshots and
//! season scores out.
//!
//! [`pipeline::run`] drives one ingestion run end to end. The stages it
//! strings together live in their own modules so they can be exercised
//! without a network or a datastore.

pub mod cleanup;
pub mod config;
pub mod normalize;
pub mod payload;
pub mod persist;
pub mod pipeline;

use ladder_database::DbError;
use ladder_scraper::ScrapeError;
use ladder_source::SourceError;
use ladder_source::provider::{ProviderDefinition, ProviderPool};

/// Errors that abort an ingestion run or a CLI command.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Provider setup failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Parser setup failed.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// A datastore read or write failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Reading a config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file is not valid TOML for [`config::IngestConfig`].
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

/// Returns every registered scraping provider.
#[must_use]
pub fn all_providers() -> Vec<ProviderDefinition> {
    ladder_source::registry::all_providers()
}

/// Returns the provider pool configured from the environment.
#[must_use]
pub fn provider_pool() -> ProviderPool {
    ProviderPool::from_env(all_providers())
}
