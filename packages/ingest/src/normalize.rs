//! Row validation and per-region deduplication.

use std::collections::BTreeMap;

use ladder_models::key::{collapse_whitespace, player_key};
use ladder_models::{NormalizedRow, RawRow, Region};

/// Which rows are admissible.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions<'a> {
    /// Regions allowed through; `None` allows every region.
    pub allowed: Option<&'a [Region]>,
    /// Whether aggregate-region rows are kept.
    pub include_global: bool,
}

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Region outside the allow-list.
    Region,
    /// Aggregate-region row while the aggregate region is disabled.
    GlobalDisabled,
    /// Nothing left of the player name after canonicalization.
    EmptyKey,
    /// Zero points or zero rank.
    NonPositive,
}

/// Counters from one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Rows examined.
    pub input: u64,
    /// Dropped for [`Rejection::Region`].
    pub rejected_region: u64,
    /// Dropped for [`Rejection::GlobalDisabled`].
    pub rejected_global_disabled: u64,
    /// Dropped for [`Rejection::EmptyKey`].
    pub rejected_empty_key: u64,
    /// Dropped for [`Rejection::NonPositive`].
    pub rejected_non_positive: u64,
    /// Valid rows that lost to a better row for the same region and player.
    pub duplicates: u64,
    /// Rows that survived.
    pub output: u64,
}

impl NormalizeStats {
    /// All validation rejections.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected_region
            + self.rejected_global_disabled
            + self.rejected_empty_key
            + self.rejected_non_positive
    }

    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Region => self.rejected_region += 1,
            Rejection::GlobalDisabled => self.rejected_global_disabled += 1,
            Rejection::EmptyKey => self.rejected_empty_key += 1,
            Rejection::NonPositive => self.rejected_non_positive += 1,
        }
    }
}

/// Validates one row and attaches its canonical player key.
///
/// # Errors
///
/// Returns the [`Rejection`] reason for rows that must be dropped.
pub fn normalize_row(raw: RawRow, options: &NormalizeOptions<'_>) -> Result<NormalizedRow, Rejection> {
    if options
        .allowed
        .is_some_and(|allowed| !allowed.contains(&raw.region))
    {
        return Err(Rejection::Region);
    }
    if raw.region.is_aggregate() && !options.include_global {
        return Err(Rejection::GlobalDisabled);
    }
    let player_key = player_key(&raw.player_name);
    if player_key.is_empty() {
        return Err(Rejection::EmptyKey);
    }
    if raw.points == 0 || raw.rank == 0 {
        return Err(Rejection::NonPositive);
    }

    Ok(NormalizedRow {
        region: raw.region,
        page: raw.page,
        rank: raw.rank,
        player_name: collapse_whitespace(&raw.player_name),
        team_name: collapse_whitespace(&raw.team_name),
        points: raw.points,
        platform: raw.platform,
        timeframe: raw.timeframe,
        provider: raw.provider,
        player_key,
    })
}

/// Validates `rows` and keeps the best row per `(region, player key)`:
/// higher points wins, equal points go to the lower rank.
///
/// Output is ordered by region, then player key.
#[must_use]
pub fn normalize_and_dedupe(
    rows: Vec<RawRow>,
    options: &NormalizeOptions<'_>,
) -> (Vec<NormalizedRow>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut best: BTreeMap<(Region, String), NormalizedRow> = BTreeMap::new();

    for raw in rows {
        stats.input += 1;
        let row = match normalize_row(raw, options) {
            Ok(row) => row,
            Err(rejection) => {
                stats.record(rejection);
                continue;
            }
        };

        let key = (row.region, row.player_key.clone());
        match best.get_mut(&key) {
            Some(current) => {
                stats.duplicates += 1;
                if row.outranks(current) {
                    *current = row;
                }
            }
            None => {
                best.insert(key, row);
            }
        }
    }

    let rows: Vec<NormalizedRow> = best.into_values().collect();
    stats.output = rows.len() as u64;

    log::debug!(
        "Normalized {} row(s): {} kept, {} duplicate(s), rejected {} (region {}, global disabled {}, empty key {}, non-positive {})",
        stats.input,
        stats.output,
        stats.duplicates,
        stats.rejected(),
        stats.rejected_region,
        stats.rejected_global_disabled,
        stats.rejected_empty_key,
        stats.rejected_non_positive,
    );

    (rows, stats)
}

#[cfg(test)]
mod tests {
    use ladder_models::{Platform, Timeframe};

    use super::*;

    fn raw(region: Region, name: &str, points: u32, rank: u32) -> RawRow {
        RawRow {
            region,
            page: 1,
            rank,
            player_name: name.to_string(),
            team_name: String::new(),
            points,
            platform: Platform::Pc,
            timeframe: Timeframe::Current,
            provider: "scraperapi".to_string(),
        }
    }

    const ALL: NormalizeOptions<'static> = NormalizeOptions {
        allowed: None,
        include_global: true,
    };

    #[test]
    fn keeps_highest_points_per_region_and_player() {
        let (rows, stats) = normalize_and_dedupe(
            vec![
                raw(Region::Eu, "Zed", 100, 9),
                raw(Region::Eu, "ZED", 300, 4),
                raw(Region::Eu, "zéd", 200, 2),
                raw(Region::Nac, "Zed", 50, 40),
            ],
            &ALL,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(stats.duplicates, 2);
        let eu = rows.iter().find(|r| r.region == Region::Eu).unwrap();
        assert_eq!(eu.points, 300);
        assert_eq!(eu.rank, 4);
        assert_eq!(eu.player_name, "ZED");
    }

    #[test]
    fn equal_points_go_to_lower_rank() {
        let (rows, _) = normalize_and_dedupe(
            vec![
                raw(Region::Eu, "Zed", 100, 7),
                raw(Region::Eu, "Zed", 100, 3),
                raw(Region::Eu, "Zed", 100, 5),
            ],
            &ALL,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank, 3);
    }

    #[test]
    fn invalid_rows_never_survive() {
        let (rows, stats) = normalize_and_dedupe(
            vec![
                raw(Region::Eu, "Zed", 0, 1),
                raw(Region::Eu, "Bugha", 10, 0),
                raw(Region::Eu, "\u{200B} ", 10, 1),
                raw(Region::Eu, "Clix", 10, 2),
            ],
            &ALL,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player_key, "clix");
        assert_eq!(stats.rejected_non_positive, 2);
        assert_eq!(stats.rejected_empty_key, 1);
        assert_eq!(stats.rejected(), 3);
    }

    #[test]
    fn region_filters_apply() {
        let allowed = [Region::Eu, Region::Global];
        let options = NormalizeOptions {
            allowed: Some(&allowed),
            include_global: false,
        };
        let (rows, stats) = normalize_and_dedupe(
            vec![
                raw(Region::Eu, "Zed", 10, 1),
                raw(Region::Br, "Zed", 10, 1),
                raw(Region::Global, "Zed", 10, 1),
            ],
            &options,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(stats.rejected_region, 1);
        assert_eq!(stats.rejected_global_disabled, 1);
    }

    #[test]
    fn display_name_is_trimmed_but_keeps_case() {
        let row = normalize_row(raw(Region::Eu, "  Big   Zed ", 10, 1), &ALL).unwrap();
        assert_eq!(row.player_name, "Big Zed");
        assert_eq!(row.player_key, "big zed");
    }
}
