#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion score strategies and result types.

use std::time::Duration;

use ladder_database_models::RunStatus;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How the season score for a player is chosen from their rows.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ScoreStrategy {
    /// Highest points across every region.
    #[default]
    Max,
    /// The aggregate-region row, falling back to [`Self::Max`].
    Global,
    /// The canonical-region row, falling back to [`Self::Max`].
    Region,
}

/// Counters from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Run record id, when a run record was written.
    pub run_id: Option<i64>,
    /// Pages planned.
    pub pages_planned: u64,
    /// Pages fetched successfully.
    pub pages_fetched: u64,
    /// Pages given up on.
    pub pages_failed: u64,
    /// HTTP requests issued, retries included.
    pub requests: u64,
    /// Rows extracted from page markup.
    pub rows_parsed: u64,
    /// Table rows skipped by the parser as incomplete.
    pub rows_unparsable: u64,
    /// Rows rejected by validation.
    pub rows_rejected: u64,
    /// Rows collapsed into a better row for the same region and player.
    pub rows_deduplicated: u64,
    /// Rows that survived normalization.
    pub rows_normalized: u64,
    /// Player rows written.
    pub players_written: u64,
    /// Snapshot rows written.
    pub snapshots_written: u64,
    /// Score rows written.
    pub scores_written: u64,
    /// Regional snapshots whose player could not be resolved.
    pub snapshots_skipped: u64,
    /// Aggregate-region snapshots whose player could not be resolved.
    pub snapshots_ignored: u64,
    /// Scores whose player could not be resolved.
    pub scores_skipped: u64,
    /// Whether writes went to an in-memory store.
    pub dry_run: bool,
    /// Wall-clock time.
    pub duration: Duration,
}

impl IngestSummary {
    /// Players, snapshots and scores written.
    #[must_use]
    pub const fn rows_written(&self) -> u64 {
        self.players_written + self.snapshots_written + self.scores_written
    }

    /// Terminal status for a run that completed without a fatal error.
    #[must_use]
    pub const fn completed_status(&self) -> RunStatus {
        if self.pages_failed > 0 || self.snapshots_skipped > 0 || self.snapshots_ignored > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        }
    }
}

/// Counters from one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    /// Snapshot rows scanned.
    pub scanned_snapshots: u64,
    /// Players with at least one regional snapshot.
    pub regional_players: u64,
    /// Players seen only in the aggregate region.
    pub aggregate_only_players: u64,
    /// Score rows deleted.
    pub scores_deleted: u64,
    /// Snapshot rows deleted.
    pub snapshots_deleted: u64,
    /// Player rows deleted.
    pub players_deleted: u64,
    /// Whether deletes were skipped.
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("max".parse::<ScoreStrategy>().unwrap(), ScoreStrategy::Max);
        assert_eq!("GLOBAL".parse::<ScoreStrategy>().unwrap(), ScoreStrategy::Global);
        assert_eq!("Region".parse::<ScoreStrategy>().unwrap(), ScoreStrategy::Region);
        assert!("best".parse::<ScoreStrategy>().is_err());
        assert_eq!(
            serde_json::from_str::<ScoreStrategy>("\"REGION\"").unwrap(),
            ScoreStrategy::Region
        );
    }

    #[test]
    fn clean_run_is_success() {
        let summary = IngestSummary {
            pages_planned: 3,
            pages_fetched: 3,
            ..IngestSummary::default()
        };
        assert_eq!(summary.completed_status(), RunStatus::Success);
    }

    #[test]
    fn failed_pages_or_dropped_snapshots_make_run_partial() {
        let failed_page = IngestSummary {
            pages_failed: 1,
            ..IngestSummary::default()
        };
        let ignored = IngestSummary {
            snapshots_ignored: 2,
            ..IngestSummary::default()
        };
        let skipped = IngestSummary {
            snapshots_skipped: 1,
            ..IngestSummary::default()
        };
        assert_eq!(failed_page.completed_status(), RunStatus::Partial);
        assert_eq!(ignored.completed_status(), RunStatus::Partial);
        assert_eq!(skipped.completed_status(), RunStatus::Partial);
    }

    #[test]
    fn rows_written_sums_tables() {
        let summary = IngestSummary {
            players_written: 2,
            snapshots_written: 3,
            scores_written: 2,
            ..IngestSummary::default()
        };
        assert_eq!(summary.rows_written(), 7);
    }
}
