//! Typed table operations.
//!
//! Every bulk write is split into batches of `batch_size` rows so a single
//! request never grows past what the store accepts.

use ladder_database_models::{
    NewPlayer, NewRun, NewScore, NewSnapshot, PlayerRecord, RunRecord, RunUpdate,
};
use ladder_models::Region;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::DbError;
use crate::store::{Filter, Select, TableStore};

/// Player table.
pub const PLAYERS: &str = "players";
/// Ranking snapshot table.
pub const SNAPSHOTS: &str = "ranking_snapshots";
/// Season score table.
pub const SCORES: &str = "season_scores";
/// Ingestion run audit table.
pub const RUNS: &str = "ingestion_runs";

/// Conflict target for [`PLAYERS`].
pub const PLAYER_CONFLICT: &[&str] = &["nickname"];
/// Conflict target for [`SNAPSHOTS`].
pub const SNAPSHOT_CONFLICT: &[&str] = &["player_id", "region", "snapshot_date"];
/// Conflict target for [`SCORES`].
pub const SCORE_CONFLICT: &[&str] = &["player_id", "season"];

fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Value>, DbError> {
    items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()
        .map_err(DbError::from)
}

fn from_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, DbError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(DbError::from)
}

/// Upserts `items` in batches and returns every row the store wrote back.
async fn upsert_batched<T: Serialize + Sync>(
    store: &dyn TableStore,
    table: &str,
    on_conflict: &[&str],
    items: &[T],
    batch_size: usize,
) -> Result<Vec<Value>, DbError> {
    let mut written = Vec::with_capacity(items.len());
    for (i, batch) in items.chunks(batch_size.max(1)).enumerate() {
        let rows = to_rows(batch)?;
        let returned = store.upsert(table, on_conflict, &rows).await?;
        log::debug!(
            "{table}: batch {} wrote {} row(s)",
            i + 1,
            returned.len()
        );
        written.extend(returned);
    }
    Ok(written)
}

/// Upserts players on `nickname` and returns the persisted records.
///
/// # Errors
///
/// Returns [`DbError`] if any batch fails or a returned row cannot be
/// decoded.
pub async fn upsert_players(
    store: &dyn TableStore,
    players: &[NewPlayer],
    batch_size: usize,
) -> Result<Vec<PlayerRecord>, DbError> {
    let rows = upsert_batched(store, PLAYERS, PLAYER_CONFLICT, players, batch_size).await?;
    from_rows(rows)
}

/// Looks up persisted players by canonical player key, so `ZED` and
/// `Zéd` both find the player stored as `Zed`.
///
/// # Errors
///
/// Returns [`DbError`] if a lookup fails or a row cannot be decoded.
pub async fn find_players_by_key(
    store: &dyn TableStore,
    keys: &[String],
    batch_size: usize,
) -> Result<Vec<PlayerRecord>, DbError> {
    let mut found = Vec::new();
    for batch in keys.chunks(batch_size.max(1)) {
        let values = batch.iter().cloned().map(Value::String).collect();
        // Several nicknames may share a key; the limit is only a page cap.
        let query = Select::new((batch.len() as u64).saturating_mul(4))
            .filter(Filter::In("player_key".to_string(), values));
        let page = store.select(PLAYERS, &query).await?;
        found.extend(from_rows::<PlayerRecord>(page.rows)?);
    }
    Ok(found)
}

/// Upserts ranking snapshots. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if any batch fails.
pub async fn upsert_snapshots(
    store: &dyn TableStore,
    snapshots: &[NewSnapshot],
    batch_size: usize,
) -> Result<u64, DbError> {
    let rows = upsert_batched(store, SNAPSHOTS, SNAPSHOT_CONFLICT, snapshots, batch_size).await?;
    Ok(rows.len() as u64)
}

/// Upserts season scores. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if any batch fails.
pub async fn upsert_scores(
    store: &dyn TableStore,
    scores: &[NewScore],
    batch_size: usize,
) -> Result<u64, DbError> {
    let rows = upsert_batched(store, SCORES, SCORE_CONFLICT, scores, batch_size).await?;
    Ok(rows.len() as u64)
}

/// Opens an ingestion run record.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub async fn insert_run(store: &dyn TableStore, run: &NewRun) -> Result<RunRecord, DbError> {
    let row = store.insert(RUNS, &serde_json::to_value(run)?).await?;
    Ok(serde_json::from_value(row)?)
}

/// Writes the terminal state of a run.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub async fn finish_run(
    store: &dyn TableStore,
    run_id: i64,
    update: &RunUpdate,
) -> Result<(), DbError> {
    store
        .patch(RUNS, run_id, &serde_json::to_value(update)?)
        .await
}

/// Fetches a run record by id.
///
/// # Errors
///
/// Returns [`DbError`] if the lookup fails or the run does not exist.
pub async fn get_run(store: &dyn TableStore, run_id: i64) -> Result<RunRecord, DbError> {
    let query = Select::new(1).filter(Filter::Eq("id".to_string(), Value::from(run_id)));
    let page = store.select(RUNS, &query).await?;
    let row = page
        .rows
        .into_iter()
        .next()
        .ok_or_else(|| DbError::Conversion {
            message: format!("no ingestion run with id {run_id}"),
        })?;
    Ok(serde_json::from_value(row)?)
}

/// `(player_id, region)` of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct SnapshotRegion {
    /// Player foreign key.
    pub player_id: i64,
    /// Snapshot region.
    pub region: Region,
}

/// Reads `(player_id, region)` for every snapshot, `page_size` rows at a
/// time.
///
/// # Errors
///
/// Returns [`DbError`] if a page fails to load or decode.
pub async fn scan_snapshot_regions(
    store: &dyn TableStore,
    page_size: u64,
) -> Result<Vec<SnapshotRegion>, DbError> {
    let page_size = page_size.max(1);
    let mut scanned = Vec::new();
    let mut offset = 0u64;

    loop {
        let query = Select::new(page_size)
            .columns(&["player_id", "region"])
            .offset(offset);
        let page = store.select(SNAPSHOTS, &query).await?;
        let fetched = page.rows.len() as u64;
        scanned.extend(from_rows::<SnapshotRegion>(page.rows)?);
        offset += fetched;

        log::debug!(
            "Scanned {offset}/{} snapshot(s)",
            page.total.map_or_else(|| "?".to_string(), |t| t.to_string())
        );

        let reached_total = page.total.is_some_and(|total| offset >= total);
        if fetched < page_size || reached_total {
            break;
        }
    }

    Ok(scanned)
}

/// Deletes every row of `table` whose `column` is one of `ids`, in
/// batches. Returns the number of rows deleted.
///
/// # Errors
///
/// Returns [`DbError`] if any batch fails.
pub async fn delete_where_in(
    store: &dyn TableStore,
    table: &str,
    column: &str,
    ids: &[i64],
    batch_size: usize,
) -> Result<u64, DbError> {
    let mut deleted = 0;
    for batch in ids.chunks(batch_size.max(1)) {
        let values: Vec<Value> = batch.iter().copied().map(Value::from).collect();
        deleted += store.delete_in(table, column, &values).await?;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone as _, Utc};
    use ladder_database_models::RunStatus;
    use ladder_models::Tranche;
    use ladder_models::key::player_key;

    use super::*;
    use crate::memory::MemoryStore;

    fn player(nickname: &str, region: Region) -> NewPlayer {
        NewPlayer {
            nickname: nickname.to_string(),
            player_key: player_key(nickname),
            username: nickname.to_lowercase(),
            region,
            tranche: Tranche::Open,
            season: "2026-S4".to_string(),
        }
    }

    fn snapshot(player_id: i64, region: Region) -> NewSnapshot {
        NewSnapshot {
            player_id,
            region,
            snapshot_date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            points: 100,
            rank: 50,
            collected_at: Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap(),
            run_id: None,
        }
    }

    #[tokio::test]
    async fn players_round_trip_through_batches() {
        let store = MemoryStore::new();
        let players: Vec<NewPlayer> = (0..7)
            .map(|i| player(&format!("P{i}"), Region::Eu))
            .collect();
        let records = upsert_players(&store, &players, 3).await.unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(store.count(PLAYERS), 7);

        let found = find_players_by_key(&store, &["p2".to_string(), "nope".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].nickname, "P2");
    }

    #[tokio::test]
    async fn scan_walks_every_page() {
        let store = MemoryStore::new();
        let snapshots: Vec<NewSnapshot> = (1..=11)
            .map(|id| snapshot(id, if id % 3 == 0 { Region::Global } else { Region::Eu }))
            .collect();
        assert_eq!(upsert_snapshots(&store, &snapshots, 4).await.unwrap(), 11);

        let scanned = scan_snapshot_regions(&store, 4).await.unwrap();
        assert_eq!(scanned.len(), 11);
        assert_eq!(
            scanned.iter().filter(|s| s.region == Region::Global).count(),
            3
        );
    }

    #[tokio::test]
    async fn snapshots_are_idempotent_per_day() {
        let store = MemoryStore::new();
        let batch = vec![snapshot(1, Region::Eu), snapshot(1, Region::Global)];
        upsert_snapshots(&store, &batch, 10).await.unwrap();
        upsert_snapshots(&store, &batch, 10).await.unwrap();
        assert_eq!(store.count(SNAPSHOTS), 2);
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let store = MemoryStore::new();
        let started_at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let run = insert_run(
            &store,
            &NewRun {
                source: "tracker".to_string(),
                status: RunStatus::Running,
                started_at,
            },
        )
        .await
        .unwrap();
        assert_eq!(run.status, RunStatus::Running);

        finish_run(
            &store,
            run.id,
            &RunUpdate {
                status: RunStatus::Partial,
                finished_at: started_at,
                rows_written: 12,
                error_message: None,
            },
        )
        .await
        .unwrap();

        let run = get_run(&store, run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.rows_written, 12);
    }

    #[tokio::test]
    async fn deletes_in_batches() {
        let store = MemoryStore::new();
        let snapshots: Vec<NewSnapshot> = (1..=5).map(|id| snapshot(id, Region::Eu)).collect();
        upsert_snapshots(&store, &snapshots, 10).await.unwrap();
        let deleted = delete_where_in(&store, SNAPSHOTS, "player_id", &[1, 2, 3, 42], 2)
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count(SNAPSHOTS), 2);
    }
}
