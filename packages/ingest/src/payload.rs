//! Derives player, snapshot and score payloads from normalized rows.
//!
//! A player can appear on several regional boards and on the aggregate
//! board. One row per player is picked as canonical: regional rows always
//! beat aggregate rows, then higher points, then lower rank. The
//! canonical row decides the player's region, tranche and nickname.

use std::collections::BTreeMap;

use ladder_ingest_models::ScoreStrategy;
use ladder_models::key::strip_marks;
use ladder_models::{NormalizedRow, Region, Tranche};
use sha2::{Digest as _, Sha256};

/// A player row to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCandidate {
    /// Canonical player key.
    pub key: String,
    /// Display name from the canonical row.
    pub nickname: String,
    /// Derived handle.
    pub username: String,
    /// Region of the canonical row.
    pub region: Region,
    /// Bucket of the canonical row's rank.
    pub tranche: Tranche,
    /// Season label.
    pub season: String,
}

/// The row chosen as a player's season score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreChoice {
    /// Canonical player key.
    pub key: String,
    /// Season label.
    pub season: String,
    /// Points of the chosen row.
    pub points: u32,
    /// Rank of the chosen row.
    pub rank: u32,
    /// Region of the chosen row.
    pub region: Region,
}

/// Everything the persistence layer writes for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Players, sorted by key.
    pub candidates: Vec<PlayerCandidate>,
    /// One snapshot per surviving row.
    pub snapshots: Vec<NormalizedRow>,
    /// One score per player key, sorted by key.
    pub scores: Vec<ScoreChoice>,
}

/// Derives a lowercase ASCII-alphanumeric handle from a nickname.
///
/// Falls back to `player_` plus 8 hex digits of the nickname's SHA-256
/// when nothing alphanumeric is left.
#[must_use]
pub fn derive_username(nickname: &str) -> String {
    let username: String = strip_marks(nickname)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if !username.is_empty() {
        return username;
    }
    let digest = Sha256::digest(nickname.as_bytes());
    format!("player_{}", &hex::encode(digest)[..8])
}

/// Whether `a` is a better canonical row than `b`.
fn preferred(a: &NormalizedRow, b: &NormalizedRow) -> bool {
    match (a.region.is_aggregate(), b.region.is_aggregate()) {
        (false, true) => true,
        (true, false) => false,
        _ => a.outranks(b),
    }
}

fn best_by<'a>(
    rows: &[&'a NormalizedRow],
    better: impl Fn(&NormalizedRow, &NormalizedRow) -> bool,
) -> Option<&'a NormalizedRow> {
    let mut best: Option<&NormalizedRow> = None;
    for &row in rows {
        if best.is_none_or(|current| better(row, current)) {
            best = Some(row);
        }
    }
    best
}

/// Canonical row among one player's rows.
#[must_use]
pub fn canonical_row<'a>(rows: &[&'a NormalizedRow]) -> Option<&'a NormalizedRow> {
    best_by(rows, preferred)
}

/// Picks the season-score row for one player.
#[must_use]
pub fn choose_score<'a>(
    rows: &[&'a NormalizedRow],
    canonical: &NormalizedRow,
    strategy: ScoreStrategy,
) -> Option<&'a NormalizedRow> {
    let max = best_by(rows, NormalizedRow::outranks);
    match strategy {
        ScoreStrategy::Max => max,
        ScoreStrategy::Global => rows
            .iter()
            .copied()
            .find(|r| r.region.is_aggregate())
            .or(max),
        ScoreStrategy::Region => rows
            .iter()
            .copied()
            .find(|r| r.region == canonical.region)
            .or(max),
    }
}

/// Builds the run's payload from deduplicated rows.
///
/// When `global_creates_players` is off, players seen only in the
/// aggregate region get no candidate; their snapshots and score are
/// written only if the player already exists.
#[must_use]
pub fn build_payload(
    rows: &[NormalizedRow],
    season: &str,
    strategy: ScoreStrategy,
    global_creates_players: bool,
) -> Payload {
    let mut by_key: BTreeMap<&str, Vec<&NormalizedRow>> = BTreeMap::new();
    for row in rows {
        by_key.entry(row.player_key.as_str()).or_default().push(row);
    }

    let mut payload = Payload {
        snapshots: rows.to_vec(),
        ..Payload::default()
    };

    for (key, player_rows) in &by_key {
        let Some(canonical) = canonical_row(player_rows) else {
            continue;
        };

        if !canonical.region.is_aggregate() || global_creates_players {
            payload.candidates.push(PlayerCandidate {
                key: (*key).to_string(),
                nickname: canonical.player_name.clone(),
                username: derive_username(&canonical.player_name),
                region: canonical.region,
                tranche: Tranche::from_rank(canonical.rank),
                season: season.to_string(),
            });
        }

        if let Some(score) = choose_score(player_rows, canonical, strategy) {
            payload.scores.push(ScoreChoice {
                key: (*key).to_string(),
                season: season.to_string(),
                points: score.points,
                rank: score.rank,
                region: score.region,
            });
        }
    }

    log::debug!(
        "Payload: {} player(s), {} snapshot(s), {} score(s) ({strategy})",
        payload.candidates.len(),
        payload.snapshots.len(),
        payload.scores.len()
    );

    payload
}

#[cfg(test)]
mod tests {
    use ladder_models::key::player_key;
    use ladder_models::{Platform, Timeframe};

    use super::*;

    fn row(region: Region, name: &str, points: u32, rank: u32) -> NormalizedRow {
        NormalizedRow {
            region,
            page: 1,
            rank,
            player_name: name.to_string(),
            team_name: String::new(),
            points,
            platform: Platform::Pc,
            timeframe: Timeframe::Current,
            provider: "scrapingbee".to_string(),
            player_key: player_key(name),
        }
    }

    fn zed_rows() -> Vec<NormalizedRow> {
        vec![
            row(Region::Eu, "Zed", 15_000, 1),
            row(Region::Global, "Zed", 20_000, 1),
        ]
    }

    #[test]
    fn max_strategy_prefers_regional_identity_but_best_score() {
        let payload = build_payload(&zed_rows(), "S1", ScoreStrategy::Max, false);
        assert_eq!(payload.candidates.len(), 1);
        assert_eq!(payload.candidates[0].region, Region::Eu);
        assert_eq!(payload.candidates[0].tranche, Tranche::Top5);
        assert_eq!(payload.scores.len(), 1);
        assert_eq!(payload.scores[0].points, 20_000);
        assert_eq!(payload.snapshots.len(), 2);
    }

    #[test]
    fn region_strategy_uses_canonical_region_row() {
        let payload = build_payload(&zed_rows(), "S1", ScoreStrategy::Region, false);
        assert_eq!(payload.scores[0].points, 15_000);
        assert_eq!(payload.scores[0].region, Region::Eu);
    }

    #[test]
    fn global_strategy_falls_back_to_max() {
        let payload = build_payload(&zed_rows(), "S1", ScoreStrategy::Global, false);
        assert_eq!(payload.scores[0].points, 20_000);
        assert_eq!(payload.scores[0].region, Region::Global);

        let regional_only = vec![
            row(Region::Eu, "Bugha", 300, 10),
            row(Region::Nac, "Bugha", 900, 2),
        ];
        let payload = build_payload(&regional_only, "S1", ScoreStrategy::Global, false);
        assert_eq!(payload.scores[0].points, 900);
        assert_eq!(payload.candidates[0].region, Region::Nac);
        assert_eq!(payload.candidates[0].tranche, Tranche::Top5);
    }

    #[test]
    fn canonical_region_ignores_higher_aggregate_points() {
        let rows = [
            row(Region::Global, "Zed", 99_000, 1),
            row(Region::Oce, "Zed", 10, 300),
        ];
        let refs: Vec<&NormalizedRow> = rows.iter().collect();
        assert_eq!(canonical_row(&refs).unwrap().region, Region::Oce);
    }

    #[test]
    fn aggregate_only_players_need_opt_in() {
        let rows = vec![row(Region::Global, "Ghost", 500, 12)];
        let payload = build_payload(&rows, "S1", ScoreStrategy::Max, false);
        assert!(payload.candidates.is_empty());
        assert_eq!(payload.scores.len(), 1);

        let payload = build_payload(&rows, "S1", ScoreStrategy::Max, true);
        assert_eq!(payload.candidates.len(), 1);
        assert_eq!(payload.candidates[0].region, Region::Global);
        assert_eq!(payload.candidates[0].tranche, Tranche::Top15);
    }

    #[test]
    fn usernames_are_alphanumeric_lowercase() {
        assert_eq!(derive_username("Zéd_Prø 99!"), "zedpr99");
        assert_eq!(derive_username("Mr. Savage"), "mrsavage");
    }

    #[test]
    fn username_falls_back_to_stable_hash() {
        let first = derive_username("ツバサ");
        assert!(first.starts_with("player_"));
        assert_eq!(first.len(), "player_".len() + 8);
        assert_eq!(first, derive_username("ツバサ"));
        assert_ne!(first, derive_username("サクラ"));
    }

    #[test]
    fn candidates_are_sorted_by_key() {
        let rows = vec![
            row(Region::Eu, "Zed", 1, 3),
            row(Region::Eu, "Alpha", 2, 2),
            row(Region::Eu, "Mid", 3, 1),
        ];
        let payload = build_payload(&rows, "S1", ScoreStrategy::Max, false);
        let keys: Vec<&str> = payload.candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zed"]);
    }
}
