#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Leaderboard markup parsing.
//!
//! Turns the HTML returned for one leaderboard page into [`RawRow`]
//! values ([`leaderboard`]). This crate does no network access; it only
//! understands markup that a scraping provider has already fetched.
//!
//! [`RawRow`]: ladder_models::RawRow

pub mod leaderboard;

/// Literal that marks a page as carrying leaderboard data.
///
/// Providers sometimes answer `200 OK` with a captcha or soft-block page.
/// Those pages never contain a table body, so its presence is the
/// success criterion for a fetch.
pub const TABLE_BODY_MARKER: &str = "<tbody";

/// Errors that can occur while parsing a leaderboard page.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The page contained no table body at all.
    #[error("no table body found in page")]
    MissingTableBody,

    /// Parsing the markup failed.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Returns `true` if `body` contains a table body marker (case-insensitive).
#[must_use]
pub fn has_table_body(body: &str) -> bool {
    body.as_bytes()
        .windows(TABLE_BODY_MARKER.len())
        .any(|w| w.eq_ignore_ascii_case(TABLE_BODY_MARKER.as_bytes()))
}
