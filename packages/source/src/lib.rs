#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Fetching leaderboard pages through rotating scraping providers.
//!
//! The stages, in order:
//!
//! 1. [`plan`] expands region page ranges into [`plan::FetchTask`]s.
//! 2. [`router`] assigns each task a provider and API key.
//! 3. [`fetch`] runs tasks in bounded concurrent chunks.
//! 4. [`retry`] re-runs retryable failures in backoff rounds.
//!
//! Provider request templates are embedded TOML files ([`registry`]).

pub mod fetch;
pub mod plan;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod router;

/// Errors that can occur while setting up or running fetches.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP client setup failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider or fetch configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// No provider has both a weight and a credential.
    #[error("no scraping provider is enabled (set at least one provider's *_KEYS variable)")]
    NoProviders,
}
