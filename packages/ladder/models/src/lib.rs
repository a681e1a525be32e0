#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Leaderboard row types shared across the ladder ingestion pipeline.
//!
//! Every fetched leaderboard page is parsed into [`RawRow`] values, which
//! the normalizer validates and upgrades into [`NormalizedRow`] values
//! carrying a canonical player key (see [`key`]).

pub mod key;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A leaderboard region.
///
/// [`Region::Global`] is the cross-regional aggregate board. It is treated
/// as lower priority than any real region when resolving player identity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Region {
    /// Europe
    Eu,
    /// North America Central
    Nac,
    /// North America West
    Naw,
    /// Brazil
    Br,
    /// Asia
    Asia,
    /// Oceania
    Oce,
    /// Middle East
    Me,
    /// Cross-regional aggregate leaderboard
    Global,
}

impl Region {
    /// Every region, aggregate last.
    pub const ALL: [Self; 8] = [
        Self::Eu,
        Self::Nac,
        Self::Naw,
        Self::Br,
        Self::Asia,
        Self::Oce,
        Self::Me,
        Self::Global,
    ];

    /// Whether this is the aggregate (`GLOBAL`) region.
    #[must_use]
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Global)
    }
}

/// Platform filter applied to the leaderboard query.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    /// PC leaderboards
    #[default]
    Pc,
    /// Console leaderboards
    Console,
    /// Mobile leaderboards
    Mobile,
}

/// Timeframe filter applied to the leaderboard query.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Timeframe {
    /// The current competitive season
    #[default]
    Current,
    /// The trailing year
    Year,
    /// All time
    All,
}

/// A discrete bucket derived from a player's best rank.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Tranche {
    /// Rank 1-5
    #[strum(serialize = "TOP_5")]
    #[serde(rename = "TOP_5")]
    Top5,
    /// Rank 6-10
    #[strum(serialize = "TOP_10")]
    #[serde(rename = "TOP_10")]
    Top10,
    /// Rank 11-15
    #[strum(serialize = "TOP_15")]
    #[serde(rename = "TOP_15")]
    Top15,
    /// Rank 16-20
    #[strum(serialize = "TOP_20")]
    #[serde(rename = "TOP_20")]
    Top20,
    /// Rank 21-25
    #[strum(serialize = "TOP_25")]
    #[serde(rename = "TOP_25")]
    Top25,
    /// Rank 26-30
    #[strum(serialize = "TOP_30")]
    #[serde(rename = "TOP_30")]
    Top30,
    /// Anything past rank 30
    Open,
}

impl Tranche {
    /// Buckets a 1-based rank.
    #[must_use]
    pub const fn from_rank(rank: u32) -> Self {
        match rank {
            0..=5 => Self::Top5,
            6..=10 => Self::Top10,
            11..=15 => Self::Top15,
            16..=20 => Self::Top20,
            21..=25 => Self::Top25,
            26..=30 => Self::Top30,
            _ => Self::Open,
        }
    }
}

/// One leaderboard row as extracted from page markup. Unvalidated.
///
/// `rank` and `points` are `0` when the markup carried nothing usable;
/// the normalizer rejects such rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Region the page was fetched for.
    pub region: Region,
    /// 1-based page number.
    pub page: u32,
    /// Rank on the leaderboard.
    pub rank: u32,
    /// Player name as displayed.
    pub player_name: String,
    /// Team or organisation name, empty when absent.
    pub team_name: String,
    /// Points figure.
    pub points: u32,
    /// Platform filter the page was fetched with.
    pub platform: Platform,
    /// Timeframe filter the page was fetched with.
    pub timeframe: Timeframe,
    /// Scraping provider that served the page.
    pub provider: String,
}

/// A validated leaderboard row with its canonical player key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// Region the row was observed in.
    pub region: Region,
    /// 1-based page number.
    pub page: u32,
    /// Rank, always positive.
    pub rank: u32,
    /// Display name with whitespace collapsed.
    pub player_name: String,
    /// Team name with whitespace collapsed.
    pub team_name: String,
    /// Points, always positive.
    pub points: u32,
    /// Platform filter.
    pub platform: Platform,
    /// Timeframe filter.
    pub timeframe: Timeframe,
    /// Provider that served the page.
    pub provider: String,
    /// Canonical player key (never empty).
    pub player_key: String,
}

impl NormalizedRow {
    /// Returns `true` if `self` should win over `other` for the same player:
    /// higher points, then lower rank.
    #[must_use]
    pub const fn outranks(&self, other: &Self) -> bool {
        self.points > other.points || (self.points == other.points && self.rank < other.rank)
    }
}
