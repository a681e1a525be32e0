#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Datastore access for leaderboard ingestion.
//!
//! The datastore is a REST table store that supports upsert with conflict
//! resolution, filtered select with range pagination, filtered delete and
//! patch by id. [`store::TableStore`] is that surface; [`rest::RestStore`]
//! talks to a real deployment and [`memory::MemoryStore`] keeps everything
//! in process for tests. [`dry_run::DryRunStore`] reads through to a real
//! store while keeping writes in memory. [`queries`] layers the typed table
//! operations on top.

pub mod dry_run;
pub mod memory;
pub mod queries;
pub mod rest;
pub mod store;

/// Reference DDL for the tables the pipeline writes.
pub const SCHEMA_SQL: &str = include_str!("../schema.sql");

/// Errors that can occur during datastore operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// HTTP transport error.
    #[error("Datastore request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload encoding or row decoding failed.
    #[error("Datastore JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store answered with a non-success status.
    #[error("Datastore returned HTTP {status} for {table}: {body}")]
    Status {
        /// Table the request targeted.
        table: String,
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// A required environment variable is not set.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Variable name.
        name: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
