//! Removes players that exist only through the aggregate region.
//!
//! Such players typically come from runs with `global_creates_players`
//! on. A player with at least one regional snapshot is never touched.

use std::collections::BTreeSet;

use ladder_database::DbError;
use ladder_database::queries::{self, PLAYERS, SCORES, SNAPSHOTS};
use ladder_database::store::TableStore;
use ladder_ingest_models::CleanupSummary;

/// Cleanup settings.
#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    /// Ids per delete request.
    pub batch_size: usize,
    /// Snapshots per scan page.
    pub scan_page_size: u64,
    /// Count only; delete nothing.
    pub dry_run: bool,
}

/// Deletes scores, then snapshots, then player rows of every
/// aggregate-only player.
///
/// # Errors
///
/// Returns [`DbError`] if the scan or any delete fails.
pub async fn cleanup_aggregate_only(
    store: &dyn TableStore,
    options: &CleanupOptions,
) -> Result<CleanupSummary, DbError> {
    let snapshots = queries::scan_snapshot_regions(store, options.scan_page_size).await?;

    let mut regional = BTreeSet::new();
    let mut aggregate = BTreeSet::new();
    for snapshot in &snapshots {
        if snapshot.region.is_aggregate() {
            aggregate.insert(snapshot.player_id);
        } else {
            regional.insert(snapshot.player_id);
        }
    }
    let doomed: Vec<i64> = aggregate.difference(&regional).copied().collect();

    let mut summary = CleanupSummary {
        scanned_snapshots: snapshots.len() as u64,
        regional_players: regional.len() as u64,
        aggregate_only_players: doomed.len() as u64,
        dry_run: options.dry_run,
        ..CleanupSummary::default()
    };

    log::info!(
        "Scanned {} snapshot(s): {} regional player(s), {} aggregate-only",
        summary.scanned_snapshots,
        summary.regional_players,
        summary.aggregate_only_players
    );

    if options.dry_run || doomed.is_empty() {
        return Ok(summary);
    }

    summary.scores_deleted =
        queries::delete_where_in(store, SCORES, "player_id", &doomed, options.batch_size).await?;
    summary.snapshots_deleted =
        queries::delete_where_in(store, SNAPSHOTS, "player_id", &doomed, options.batch_size)
            .await?;
    summary.players_deleted =
        queries::delete_where_in(store, PLAYERS, "id", &doomed, options.batch_size).await?;

    log::info!(
        "Removed {} player(s), {} snapshot(s), {} score(s)",
        summary.players_deleted,
        summary.snapshots_deleted,
        summary.scores_deleted
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone as _, Utc};
    use ladder_database::memory::MemoryStore;
    use ladder_database_models::{NewPlayer, NewScore, NewSnapshot};
    use ladder_models::{Region, Tranche};

    use super::*;

    async fn seed(store: &MemoryStore, nickname: &str, regions: &[Region]) -> i64 {
        let player = queries::upsert_players(
            store,
            &[NewPlayer {
                nickname: nickname.to_string(),
                player_key: nickname.to_lowercase(),
                username: nickname.to_lowercase(),
                region: regions[0],
                tranche: Tranche::Open,
                season: "S1".to_string(),
            }],
            10,
        )
        .await
        .unwrap()
        .remove(0);

        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let snapshots: Vec<NewSnapshot> = regions
            .iter()
            .map(|&region| NewSnapshot {
                player_id: player.id,
                region,
                snapshot_date: date,
                points: 10,
                rank: 40,
                collected_at: Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap(),
                run_id: None,
            })
            .collect();
        queries::upsert_snapshots(store, &snapshots, 10).await.unwrap();
        queries::upsert_scores(
            store,
            &[NewScore {
                player_id: player.id,
                season: "S1".to_string(),
                points: 10,
                rank: 40,
                score_date: date,
            }],
            10,
        )
        .await
        .unwrap();
        player.id
    }

    fn options(dry_run: bool) -> CleanupOptions {
        CleanupOptions {
            batch_size: 1,
            scan_page_size: 2,
            dry_run,
        }
    }

    #[tokio::test]
    async fn removes_global_only_player_and_keeps_regional_one() {
        let store = MemoryStore::new();
        let ghost = seed(&store, "Ghost", &[Region::Global]).await;
        let zed = seed(&store, "Zed", &[Region::Global, Region::Eu]).await;

        let summary = cleanup_aggregate_only(&store, &options(false)).await.unwrap();

        assert_eq!(summary.scanned_snapshots, 3);
        assert_eq!(summary.aggregate_only_players, 1);
        assert_eq!(summary.players_deleted, 1);
        assert_eq!(summary.snapshots_deleted, 1);
        assert_eq!(summary.scores_deleted, 1);

        let players = store.rows(PLAYERS);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["id"], zed);
        assert!(
            store
                .rows(SNAPSHOTS)
                .iter()
                .all(|s| s["player_id"] != ghost)
        );
        assert_eq!(store.count(SNAPSHOTS), 2);
        assert_eq!(store.count(SCORES), 1);
    }

    #[tokio::test]
    async fn dry_run_only_counts() {
        let store = MemoryStore::new();
        seed(&store, "Ghost", &[Region::Global]).await;

        let summary = cleanup_aggregate_only(&store, &options(true)).await.unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.aggregate_only_players, 1);
        assert_eq!(summary.players_deleted, 0);
        assert_eq!(store.count(PLAYERS), 1);
        assert_eq!(store.count(SNAPSHOTS), 1);
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let store = MemoryStore::new();
        let summary = cleanup_aggregate_only(&store, &options(false)).await.unwrap();
        assert_eq!(summary, CleanupSummary::default());
    }
}
