//! Leaderboard table parser.
//!
//! Locates the first `<tbody>` in a page and turns every `<tr>` inside it
//! into a [`RawRow`]. The source site is not consistent about how it marks
//! up the points column, so points are looked up through a fixed list of
//! patterns ([`POINTS_PATTERNS`]) and the first one that yields a number
//! wins.
//!
//! Rows missing a rank, player name, or points figure are skipped without
//! error. Retrying the fetch would not change the markup.

use std::sync::LazyLock;

use ladder_models::{Platform, RawRow, Region, Timeframe};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::ScrapeError;

/// Points patterns in priority order.
///
/// `@data-points` reads the attribute from the row or any descendant.
/// `last:` takes the last element matching the selector. Everything else
/// takes the text of the first match. After these, each cell's text is
/// searched for `<number> pts`.
pub const POINTS_PATTERNS: &[&str] = &[
    "@data-points",
    "td.points, .points",
    ".trn-lb-entry__stat--points",
    "last:td.trn-text--right",
];

const RANK_SELECTOR: &str = ".trn-lb-entry__rank, td.rank";
const PLAYER_SELECTOR: &str = ".trn-lb-entry__name, .player-name, a[href*=\"/profile/\"]";
const TEAM_SELECTOR: &str = ".trn-lb-entry__team, .team-name";

/// Trailing `pts` / `points` figure in free text.
static POINTS_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,.\s]*?)\s*(?:pts|points)\b").expect("valid regex")
});

/// Where a page came from. Copied onto every row parsed from it.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// Region the page belongs to.
    pub region: Region,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page, used for position-based ranks.
    pub page_size: u32,
    /// Platform filter.
    pub platform: Platform,
    /// Timeframe filter.
    pub timeframe: Timeframe,
    /// Provider that served the page.
    pub provider: String,
}

impl PageContext {
    /// Rank implied by a 0-based row position on this page.
    #[must_use]
    pub fn positional_rank(&self, index: usize) -> u32 {
        let index = u32::try_from(index).unwrap_or(u32::MAX - 1);
        self.page
            .saturating_sub(1)
            .saturating_mul(self.page_size)
            .saturating_add(index + 1)
    }
}

/// Result of parsing one page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Rows in source order.
    pub rows: Vec<RawRow>,
    /// Number of `<tr>` fragments that were skipped as incomplete.
    pub skipped: usize,
}

enum PointsPattern {
    Attribute(&'static str),
    First(Selector),
    Last(Selector),
}

/// Compiled selectors for leaderboard pages.
pub struct LeaderboardParser {
    tbody: Selector,
    row: Selector,
    cell: Selector,
    rank: Selector,
    rank_attr: Selector,
    player: Selector,
    team: Selector,
    points: Vec<(PointsPattern, Option<Selector>)>,
}

impl std::fmt::Debug for LeaderboardParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardParser")
            .field("points_patterns", &POINTS_PATTERNS)
            .finish_non_exhaustive()
    }
}

/// Parses a CSS selector string, returning a [`ScrapeError`] on failure.
fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Parse(format!("invalid CSS selector '{selector}': {e}")))
}

impl LeaderboardParser {
    /// Compiles the selectors.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Parse`] if a selector fails to compile.
    pub fn new() -> Result<Self, ScrapeError> {
        let points = POINTS_PATTERNS
            .iter()
            .copied()
            .map(|pattern| {
                if let Some(attr) = pattern.strip_prefix('@') {
                    let sel = parse_selector(&format!("[{attr}]"))?;
                    Ok((PointsPattern::Attribute(attr), Some(sel)))
                } else if let Some(sel) = pattern.strip_prefix("last:") {
                    Ok((PointsPattern::Last(parse_selector(sel)?), None))
                } else {
                    Ok((PointsPattern::First(parse_selector(pattern)?), None))
                }
            })
            .collect::<Result<Vec<_>, ScrapeError>>()?;

        Ok(Self {
            tbody: parse_selector("tbody")?,
            row: parse_selector("tr")?,
            cell: parse_selector("td")?,
            rank: parse_selector(RANK_SELECTOR)?,
            rank_attr: parse_selector("[data-rank]")?,
            player: parse_selector(PLAYER_SELECTOR)?,
            team: parse_selector(TEAM_SELECTOR)?,
            points,
        })
    }

    /// Parses one page of markup.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::MissingTableBody`] if the page has no
    /// `<tbody>`.
    pub fn parse(&self, body: &str, ctx: &PageContext) -> Result<ParsedPage, ScrapeError> {
        let document = Html::parse_document(body);
        let tbody = document
            .select(&self.tbody)
            .next()
            .ok_or(ScrapeError::MissingTableBody)?;

        let mut parsed = ParsedPage::default();
        let mut position = 0;

        for row in tbody.select(&self.row) {
            // Header rows occasionally leak into the body; they hold no
            // position on the board.
            if row.select(&self.cell).next().is_none() {
                parsed.skipped += 1;
                continue;
            }
            if let Some(raw) = self.parse_row(row, position, ctx) {
                parsed.rows.push(raw);
            } else {
                parsed.skipped += 1;
            }
            position += 1;
        }

        log::debug!(
            "{} page {}: parsed {} rows, skipped {}",
            ctx.region,
            ctx.page,
            parsed.rows.len(),
            parsed.skipped
        );

        Ok(parsed)
    }

    fn parse_row(&self, row: ElementRef<'_>, index: usize, ctx: &PageContext) -> Option<RawRow> {
        let rank = self.extract_rank(row, index, ctx)?;
        let player_name = row
            .select(&self.player)
            .map(element_text)
            .find(|s| !s.is_empty())?;
        let team_name = row
            .select(&self.team)
            .map(element_text)
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        let points = self.extract_points(row)?;

        Some(RawRow {
            region: ctx.region,
            page: ctx.page,
            rank,
            player_name,
            team_name,
            points,
            platform: ctx.platform,
            timeframe: ctx.timeframe,
            provider: ctx.provider.clone(),
        })
    }

    fn extract_rank(&self, row: ElementRef<'_>, index: usize, ctx: &PageContext) -> Option<u32> {
        if let Some(el) = row.select(&self.rank).next() {
            return parse_number(&element_text(el));
        }
        if let Some(value) = row.value().attr("data-rank") {
            return parse_number(value);
        }
        if let Some(el) = row.select(&self.rank_attr).next() {
            return el.value().attr("data-rank").and_then(parse_number);
        }
        Some(ctx.positional_rank(index))
    }

    fn extract_points(&self, row: ElementRef<'_>) -> Option<u32> {
        for (pattern, attr_sel) in &self.points {
            let found = match pattern {
                PointsPattern::Attribute(attr) => row
                    .value()
                    .attr(attr)
                    .and_then(parse_number)
                    .or_else(|| {
                        attr_sel.as_ref().and_then(|sel| {
                            row.select(sel)
                                .find_map(|el| el.value().attr(attr).and_then(parse_number))
                        })
                    }),
                PointsPattern::First(sel) => row
                    .select(sel)
                    .next()
                    .and_then(|el| parse_number(&element_text(el))),
                PointsPattern::Last(sel) => row
                    .select(sel)
                    .last()
                    .and_then(|el| parse_number(&element_text(el))),
            };
            if found.is_some() {
                return found;
            }
        }

        // Per cell; an adjacent numeric cell must not merge into the figure.
        row.select(&self.cell).find_map(|cell| {
            POINTS_TEXT_RE
                .captures(&element_text(cell))
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_number(m.as_str()))
        })
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a displayed integer such as `#12`, `15,000`, `1.234` or
/// `20 000`. Returns `None` if no digits remain or anything else is left
/// over.
#[must_use]
pub fn parse_number(text: &str) -> Option<u32> {
    let trimmed = text.trim().trim_start_matches('#');
    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | ' ' | '\u{a0}' | '\u{202f}' | '\''))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
