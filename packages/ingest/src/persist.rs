//! Writes a [`Payload`] to the table store.
//!
//! Players go first so their generated ids can be mapped back to player
//! keys. Aggregate-region rows whose player was not upserted this run get
//! a second chance through a player-key lookup against existing players.
//! Rows that still cannot be tied to a player are counted and dropped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use ladder_database::DbError;
use ladder_database::queries;
use ladder_database::store::TableStore;
use ladder_database_models::{NewPlayer, NewScore, NewSnapshot, PlayerRecord};
use ladder_models::key::player_key;

use crate::payload::Payload;

/// Write settings.
#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    /// Rows per write request.
    pub batch_size: usize,
    /// Date stamped on snapshots and scores.
    pub snapshot_date: NaiveDate,
    /// Collection timestamp stamped on snapshots.
    pub collected_at: DateTime<Utc>,
    /// Run the rows belong to.
    pub run_id: Option<i64>,
}

/// Counters from one persistence pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Player rows written.
    pub players_written: u64,
    /// Snapshot rows written.
    pub snapshots_written: u64,
    /// Score rows written.
    pub scores_written: u64,
    /// Regional snapshots without a resolvable player.
    pub snapshots_skipped: u64,
    /// Aggregate-region snapshots without a resolvable player.
    pub snapshots_ignored: u64,
    /// Scores without a resolvable player.
    pub scores_skipped: u64,
    /// Players found through the player-key lookup.
    pub players_looked_up: u64,
}

/// Maps returned player rows to their canonical keys.
fn index_by_key(records: Vec<PlayerRecord>, ids: &mut BTreeMap<String, i64>) {
    for record in records {
        let key = if record.player_key.is_empty() {
            player_key(&record.nickname)
        } else {
            record.player_key
        };
        ids.entry(key).or_insert(record.id);
    }
}

/// Keeps the first occurrence of each conflict key.
fn unique_by<T, K: Ord>(items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Collapses rows sharing a conflict key to the best one (higher points,
/// then lower rank), keeping first-appearance order.
fn collapse_best<T, K: Ord + Clone>(
    items: Vec<T>,
    key: impl Fn(&T) -> K,
    points_rank: impl Fn(&T) -> (u32, u32),
) -> Vec<T> {
    let mut order: Vec<K> = Vec::new();
    let mut best: BTreeMap<K, T> = BTreeMap::new();
    for item in items {
        let k = key(&item);
        match best.get_mut(&k) {
            Some(current) => {
                let (points, rank) = points_rank(&item);
                let (cur_points, cur_rank) = points_rank(current);
                if points > cur_points || (points == cur_points && rank < cur_rank) {
                    *current = item;
                }
            }
            None => {
                order.push(k.clone());
                best.insert(k, item);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|k| best.remove(&k))
        .collect()
}

/// Persists `payload`.
///
/// # Errors
///
/// Returns [`DbError`] if any write or lookup fails. Writes already made
/// are not rolled back; every write is an idempotent upsert.
pub async fn persist(
    store: &dyn TableStore,
    payload: &Payload,
    options: &PersistOptions,
) -> Result<PersistStats, DbError> {
    let mut stats = PersistStats::default();
    let batch_size = options.batch_size.max(1);

    // 1. Players.
    let players = unique_by(
        payload
            .candidates
            .iter()
            .map(|c| NewPlayer {
                nickname: c.nickname.clone(),
                player_key: c.key.clone(),
                username: c.username.clone(),
                region: c.region,
                tranche: c.tranche,
                season: c.season.clone(),
            })
            .collect(),
        |p| p.nickname.clone(),
    );
    let records = queries::upsert_players(store, &players, batch_size).await?;
    stats.players_written = records.len() as u64;
    let mut ids = BTreeMap::new();
    index_by_key(records, &mut ids);
    log::info!("Upserted {} player(s)", stats.players_written);

    // 2. Aggregate-region rows for players not upserted this run.
    let lookup: Vec<String> = payload
        .snapshots
        .iter()
        .filter(|r| r.region.is_aggregate() && !ids.contains_key(&r.player_key))
        .map(|r| r.player_key.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !lookup.is_empty() {
        let found = queries::find_players_by_key(store, &lookup, batch_size).await?;
        let before = ids.len();
        index_by_key(found, &mut ids);
        stats.players_looked_up = (ids.len() - before) as u64;
        log::info!(
            "Resolved {}/{} aggregate-only player(s) by player key",
            stats.players_looked_up,
            lookup.len()
        );
    }

    // 3. Snapshots.
    let mut snapshots = Vec::with_capacity(payload.snapshots.len());
    for row in &payload.snapshots {
        let Some(&player_id) = ids.get(&row.player_key) else {
            if row.region.is_aggregate() {
                stats.snapshots_ignored += 1;
            } else {
                log::debug!("{}: no player id for '{}'", row.region, row.player_name);
                stats.snapshots_skipped += 1;
            }
            continue;
        };
        snapshots.push(NewSnapshot {
            player_id,
            region: row.region,
            snapshot_date: options.snapshot_date,
            points: row.points,
            rank: row.rank,
            collected_at: options.collected_at,
            run_id: options.run_id,
        });
    }
    let snapshots = collapse_best(
        snapshots,
        |s| (s.player_id, s.region, s.snapshot_date),
        |s| (s.points, s.rank),
    );
    stats.snapshots_written = queries::upsert_snapshots(store, &snapshots, batch_size).await?;

    // 4. Scores.
    let mut scores = Vec::with_capacity(payload.scores.len());
    for choice in &payload.scores {
        let Some(&player_id) = ids.get(&choice.key) else {
            stats.scores_skipped += 1;
            continue;
        };
        scores.push(NewScore {
            player_id,
            season: choice.season.clone(),
            points: choice.points,
            rank: choice.rank,
            score_date: options.snapshot_date,
        });
    }
    let scores = collapse_best(
        scores,
        |s| (s.player_id, s.season.clone()),
        |s| (s.points, s.rank),
    );
    stats.scores_written = queries::upsert_scores(store, &scores, batch_size).await?;

    log::info!(
        "Wrote {} snapshot(s) ({} skipped, {} ignored) and {} score(s) ({} skipped)",
        stats.snapshots_written,
        stats.snapshots_skipped,
        stats.snapshots_ignored,
        stats.scores_written,
        stats.scores_skipped
    );

    Ok(stats)
}
