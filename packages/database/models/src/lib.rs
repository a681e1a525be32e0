#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Datastore record shapes.
//!
//! `New*` types are what the pipeline writes; `*Record` types are rows as
//! returned by the store, with their generated `id`. Field names match the
//! column names in the reference schema.

use chrono::{DateTime, NaiveDate, Utc};
use ladder_models::{Region, Tranche};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle state of an ingestion run.
#[derive(
    Debug,
    Clone,
    Copy,
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
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Started, not yet finalized.
    Running,
    /// Every page fetched and every row written.
    Success,
    /// Finished, but some pages failed or some snapshots were dropped.
    Partial,
    /// Aborted by a fatal error.
    Failed,
}

/// Player upsert payload. Conflicts on `nickname`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlayer {
    /// Display name.
    pub nickname: String,
    /// Canonical matching key of the nickname.
    pub player_key: String,
    /// Derived lowercase alphanumeric handle.
    pub username: String,
    /// Canonical region.
    pub region: Region,
    /// Rank bucket from the canonical row.
    pub tranche: Tranche,
    /// Season label.
    pub season: String,
}

/// A persisted player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub nickname: String,
    /// Canonical matching key. Empty for rows written before the column
    /// existed.
    #[serde(default)]
    pub player_key: String,
    /// Derived handle.
    pub username: String,
    /// Canonical region.
    pub region: Region,
    /// Rank bucket.
    pub tranche: Tranche,
    /// Season label.
    pub season: String,
}

/// Ranking snapshot payload. Conflicts on
/// `(player_id, region, snapshot_date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSnapshot {
    /// Player foreign key.
    pub player_id: i64,
    /// Region the rank was observed in.
    pub region: Region,
    /// Calendar date of the observation.
    pub snapshot_date: NaiveDate,
    /// Points.
    pub points: u32,
    /// Rank.
    pub rank: u32,
    /// When the page was collected.
    pub collected_at: DateTime<Utc>,
    /// Ingestion run that wrote the row, if any.
    pub run_id: Option<i64>,
}

/// Season score payload. Conflicts on `(player_id, season)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScore {
    /// Player foreign key.
    pub player_id: i64,
    /// Season label.
    pub season: String,
    /// Points chosen by the score strategy.
    pub points: u32,
    /// Rank from the same row as `points`.
    pub rank: u32,
    /// Date the score was recorded.
    pub score_date: NaiveDate,
}

/// Ingestion-run insert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRun {
    /// Source label (e.g., `"tracker-leaderboard"`).
    pub source: String,
    /// Always [`RunStatus::Running`] on insert.
    pub status: RunStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
}

/// Final state written to a run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUpdate {
    /// Terminal status.
    pub status: RunStatus,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Players, snapshots and scores written.
    pub rows_written: u64,
    /// Error text for failed runs.
    pub error_message: Option<String>,
}

/// A persisted ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Primary key.
    pub id: i64,
    /// Source label.
    pub source: String,
    /// Current status.
    pub status: RunStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time, once finalized.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Rows written, once finalized.
    #[serde(default)]
    pub rows_written: u64,
    /// Error text for failed runs.
    #[serde(default)]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_labels() {
        assert_eq!(RunStatus::Running.as_ref(), "RUNNING");
        assert_eq!(RunStatus::Partial.to_string(), "PARTIAL");
        assert_eq!(
            serde_json::to_string(&RunStatus::Failed).unwrap(),
            "\"FAILED\""
        );
        assert_eq!("SUCCESS".parse::<RunStatus>().unwrap(), RunStatus::Success);
    }

    #[test]
    fn player_serializes_with_column_names() {
        let player = NewPlayer {
            nickname: "Zed".to_string(),
            player_key: "zed".to_string(),
            username: "zed".to_string(),
            region: Region::Eu,
            tranche: Tranche::Top5,
            season: "2026-S4".to_string(),
        };
        let value = serde_json::to_value(&player).unwrap();
        assert_eq!(value["region"], "EU");
        assert_eq!(value["tranche"], "TOP_5");
        assert_eq!(value["nickname"], "Zed");
        assert_eq!(value["player_key"], "zed");
    }

    #[test]
    fn run_record_tolerates_unfinished_columns() {
        let record: RunRecord = serde_json::from_value(serde_json::json!({
            "id": 3,
            "source": "tracker",
            "status": "RUNNING",
            "started_at": "2026-10-16T12:00:00Z",
            "finished_at": null,
        }))
        .unwrap();
        assert_eq!(record.status, RunStatus::Running);
        assert!(record.finished_at.is_none());
        assert_eq!(record.rows_written, 0);
    }
}
