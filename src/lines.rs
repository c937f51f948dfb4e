use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::games::{format_timestamp, parse_timestamp};
use crate::normalize::{
    FieldSource, GAME_ID_KEYS, PROVIDER_KEYS, SPREAD_KEYS, TOTAL_KEYS, UPDATED_KEYS,
    field_i64, field_str, field_value, normalize_line,
};
use crate::table::{Cell, Table};

pub const CONSENSUS_PROVIDER: &str = "consensus";

pub const CONSENSUS_COLUMNS: [&str; 7] = [
    "game_id",
    "spread",
    "total",
    "provider_count",
    "providers_list",
    "last_updated",
    "provider",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LineObservation {
    pub game_id: i64,
    pub provider: Option<String>,
    pub spread: Option<f64>,
    pub total: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LineObservation {
    pub fn new(game_id: i64, provider: Option<&str>) -> Self {
        Self {
            game_id,
            provider: provider.map(str::to_string),
            spread: None,
            total: None,
            last_updated: None,
        }
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = Some(spread);
        self
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_updated(mut self, ts: DateTime<Utc>) -> Self {
        self.last_updated = Some(ts);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineConsensus {
    pub game_id: i64,
    pub spread: Option<f64>,
    pub total: Option<f64>,
    pub provider_count: usize,
    pub providers_list: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LineConsensus {
    pub fn provider(&self) -> &'static str {
        CONSENSUS_PROVIDER
    }
}

/// Pulls per-bookmaker observations out of provider line records.
///
/// A record carries an outer `lines` list of bookmaker entries; each entry is
/// either the line itself or wraps an inner `lines` list. Without an outer
/// list the record is read as a single bookmaker entry; an empty outer list
/// yields nothing. Records whose game id is missing, or absent from
/// `known_games` when given, are dropped.
pub fn extract_observations<R: FieldSource>(
    records: &[R],
    known_games: Option<&HashSet<i64>>,
) -> Vec<LineObservation> {
    let mut out = Vec::new();
    for record in records {
        let Some(game_id) = field_i64(record, GAME_ID_KEYS) else {
            continue;
        };
        if known_games.is_some_and(|ids| !ids.contains(&game_id)) {
            continue;
        }

        match field_value(record, &["lines"]) {
            Some(Value::Array(books)) => {
                for book in &books {
                    push_book(&mut out, game_id, book);
                }
            }
            _ => push_book(&mut out, game_id, record),
        }
    }
    out
}

/// An entry with a `lines` array contributes one observation per non-null
/// element, so an empty array contributes nothing.
fn push_book<B: FieldSource + ?Sized>(out: &mut Vec<LineObservation>, game_id: i64, book: &B) {
    let provider = field_str(book, PROVIDER_KEYS);
    let Some(Value::Array(inner)) = field_value(book, &["lines"]) else {
        out.push(observation(game_id, provider, book));
        return;
    };
    for line in &inner {
        if line.is_null() {
            continue;
        }
        out.push(observation(game_id, provider.clone(), line));
    }
}

fn observation<L: FieldSource + ?Sized>(
    game_id: i64,
    provider: Option<String>,
    line: &L,
) -> LineObservation {
    LineObservation {
        game_id,
        provider,
        spread: normalize_line(line, SPREAD_KEYS),
        total: normalize_line(line, TOTAL_KEYS),
        last_updated: field_str(line, UPDATED_KEYS)
            .as_deref()
            .and_then(parse_timestamp),
    }
}

/// Reduces observations to one consensus row per game, ordered by game id.
///
/// Spread and total medians are computed independently over non-null values.
/// Only providers with a spread or total are counted. A game appears only if
/// it has at least one observation.
pub fn consensus(observations: &[LineObservation]) -> Vec<LineConsensus> {
    let mut groups: BTreeMap<i64, Vec<&LineObservation>> = BTreeMap::new();
    for obs in observations {
        groups.entry(obs.game_id).or_default().push(obs);
    }

    groups
        .into_iter()
        .map(|(game_id, group)| {
            let spreads: Vec<f64> = group.iter().filter_map(|o| o.spread).collect();
            let totals: Vec<f64> = group.iter().filter_map(|o| o.total).collect();
            let providers: BTreeSet<&str> = group
                .iter()
                .filter(|o| o.spread.is_some() || o.total.is_some())
                .filter_map(|o| o.provider.as_deref())
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            let providers_list = (!providers.is_empty())
                .then(|| providers.iter().copied().collect::<Vec<_>>().join(","));
            LineConsensus {
                game_id,
                spread: median_f64(&spreads),
                total: median_f64(&totals),
                provider_count: providers.len(),
                providers_list,
                last_updated: group.iter().filter_map(|o| o.last_updated).max(),
            }
        })
        .collect()
}

pub fn consensus_table(rows: &[LineConsensus]) -> Table {
    let mut table = Table::new(CONSENSUS_COLUMNS);
    for row in rows {
        table.push_row(vec![
            Cell::Int(row.game_id),
            row.spread.into(),
            row.total.into(),
            Cell::Int(row.provider_count as i64),
            row.providers_list.clone().into(),
            row.last_updated.map(format_timestamp).into(),
            Cell::from(row.provider()),
        ]);
    }
    table
}

/// Convenience for callers holding raw provider records.
pub fn consensus_from_records(records: &[Value], known_games: Option<&HashSet<i64>>) -> Table {
    consensus_table(&consensus(&extract_observations(records, known_games)))
}

fn median_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
