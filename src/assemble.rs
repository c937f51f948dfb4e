use std::collections::HashSet;
use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::flatten_advanced::{advanced_game_id, flatten_advanced};
use crate::flatten_basic::{LONG_COLUMNS, flatten_basic, pivot_basic};
use crate::games::{SeasonType, flatten_games, game_ids, week_game_ids, weeks};
use crate::join::{SpreadConvention, Sources, TEAM_GAME_KEYS, join_game_level, join_team_level};
use crate::lines::consensus_from_records;
use crate::normalize::{GAME_ID_KEYS, field_i64};
use crate::pairs::{BASIC_SEED_COLUMNS, ensure_pairs, prune_orphans, restrict_to_ids};
use crate::provider::{FBS, Provider};
use crate::run_log::UnitRecord;
use crate::table::{Keep, Table};
use crate::table_store::{RawKind, TableName, TableStore};

pub const DEFAULT_FETCH_PAUSE: Duration = Duration::from_millis(200);

/// Result of a build stage for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built {
        name: TableName,
        rows: usize,
        columns: usize,
    },
    NothingToBuild {
        reason: String,
    },
}

impl BuildOutcome {
    pub fn into_unit(self, unit: impl Into<String>) -> UnitRecord {
        match self {
            BuildOutcome::Built { rows, .. } => UnitRecord::done(unit, rows),
            BuildOutcome::NothingToBuild { reason } => UnitRecord::skipped(unit, reason),
        }
    }

    fn nothing(reason: impl Into<String>) -> Self {
        BuildOutcome::NothingToBuild {
            reason: reason.into(),
        }
    }
}

/// Rows added by the normalize-pairs stage, per stat kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairsReport {
    pub basic_added: usize,
    pub advanced_added: usize,
}

/// Tables written by one weekly fetch. `None` marks a kind that failed or
/// came back empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekFetch {
    pub basic_rows: Option<usize>,
    pub advanced_rows: Option<usize>,
    pub lines_rows: Option<usize>,
}

impl WeekFetch {
    pub fn total_rows(&self) -> usize {
        [self.basic_rows, self.advanced_rows, self.lines_rows]
            .into_iter()
            .flatten()
            .sum()
    }
}

#[derive(Debug, Default)]
struct SourceTables {
    games: Option<Table>,
    basic: Option<Table>,
    advanced: Option<Table>,
    lines: Option<Table>,
}

impl SourceTables {
    fn as_sources(&self) -> Sources<'_> {
        Sources {
            games: self.games.as_ref(),
            basic: self.basic.as_ref(),
            advanced: self.advanced.as_ref(),
            lines: self.lines.as_ref(),
        }
    }
}

/// One key of a batch run: a season, or a single week of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub year: u32,
    pub week: Option<u32>,
    pub season: SeasonType,
}

impl Unit {
    /// Season units for `years`, or one unit per week when `weeks` is given.
    pub fn expand(years: &[u32], weeks: Option<(u32, u32)>, season: SeasonType) -> Vec<Unit> {
        let mut out = Vec::new();
        for &year in years {
            match weeks {
                Some((start, end)) => out.extend((start..=end).map(|week| Unit {
                    year,
                    week: Some(week),
                    season,
                })),
                None => out.push(Unit {
                    year,
                    week: None,
                    season,
                }),
            }
        }
        out
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.week {
            Some(week) => write!(f, "{} week {week} {}", self.year, self.season),
            None => write!(f, "{} {}", self.year, self.season),
        }
    }
}

/// Drives fetch and build stages against a provider and a table store.
pub struct Assembler<P> {
    provider: P,
    store: TableStore,
    pause: Duration,
    convention: SpreadConvention,
}

impl Assembler<()> {
    /// Assembler for build-only commands that never call the provider.
    pub fn offline(store: TableStore) -> Self {
        Assembler::new((), store)
    }
}

impl<P> Assembler<P> {
    pub fn new(provider: P, store: TableStore) -> Self {
        Self {
            provider,
            store,
            pause: DEFAULT_FETCH_PAUSE,
            convention: SpreadConvention::default(),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_convention(mut self, convention: SpreadConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    fn sleep_between_calls(&self) {
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
    }

    /// Writes non-empty tables; an empty result is logged and left unwritten
    /// so later builds see the source as missing.
    fn persist(&self, name: &TableName, table: &Table) -> Result<bool> {
        if table.is_empty() {
            warn!(table = %name, "no rows; table not written");
            return Ok(false);
        }
        let path = self.store.write_table(name, table)?;
        info!(
            table = %name,
            rows = table.len(),
            columns = table.width(),
            path = %path.display(),
            "saved"
        );
        Ok(true)
    }

    fn read(&self, name: TableName) -> Result<Option<Table>> {
        let table = self.store.read_table(&name)?;
        if table.is_none() {
            info!(table = %name, "source missing");
        }
        Ok(table)
    }

    fn season_sources(&self, year: u32, season: SeasonType) -> Result<SourceTables> {
        Ok(SourceTables {
            games: self.read(TableName::raw(RawKind::Games, year, season))?,
            basic: self.read(TableName::raw(RawKind::Basic, year, season))?,
            advanced: self.read(TableName::raw(RawKind::Advanced, year, season))?,
            lines: self.read(TableName::raw(RawKind::Lines, year, season))?,
        })
    }

    fn write_output(&self, name: TableName, table: &Table) -> Result<BuildOutcome> {
        self.store.write_table(&name, table)?;
        info!(
            table = %name,
            rows = table.len(),
            columns = table.width(),
            "built"
        );
        Ok(BuildOutcome::Built {
            name,
            rows: table.len(),
            columns: table.width(),
        })
    }

    /// Team-game level dataset for one season.
    pub fn build_team_level(&self, year: u32, season: SeasonType) -> Result<BuildOutcome> {
        let sources = self.season_sources(year, season)?;
        let Some(table) = join_team_level(&sources.as_sources())? else {
            warn!(year, %season, "no sources present; nothing to build");
            return Ok(BuildOutcome::nothing("no source tables"));
        };
        self.write_output(TableName::team_level(year, season), &table)
    }

    /// Game level (home/away wide) dataset for one season. With `complete`
    /// the stat tables are first pruned to the games' home/away slots and
    /// backfilled with placeholder rows for missing slots.
    pub fn build_game_level(
        &self,
        year: u32,
        season: SeasonType,
        complete: bool,
    ) -> Result<BuildOutcome> {
        let mut sources = self.season_sources(year, season)?;
        let Some(games) = sources.games.as_ref() else {
            warn!(year, %season, "games table missing; nothing to build");
            return Ok(BuildOutcome::nothing("games table missing"));
        };

        if complete {
            for (kind, slot, seed) in [
                ("basic", &mut sources.basic, &BASIC_SEED_COLUMNS[..]),
                ("advanced", &mut sources.advanced, &TEAM_GAME_KEYS[..]),
            ] {
                let Some(stats) = slot.take() else {
                    continue;
                };
                let (pruned, removed) = prune_orphans(games, stats);
                let (filled, added) = ensure_pairs(games, &pruned, seed);
                info!(kind, removed, added, "stat table completed");
                *slot = Some(filled);
            }
        }

        let Some(table) = join_game_level(&sources.as_sources(), self.convention)? else {
            return Ok(BuildOutcome::nothing("games table missing"));
        };
        self.write_output(TableName::game_level(year, season), &table)
    }

    /// Weekly team-game summary from the week's basic/advanced (+ lines)
    /// tables.
    pub fn build_weekly(&self, year: u32, week: u32, season: SeasonType) -> Result<BuildOutcome> {
        let sources = SourceTables {
            games: None,
            basic: self.read(TableName::raw_week(RawKind::Basic, year, week, season))?,
            advanced: self.read(TableName::raw_week(RawKind::Advanced, year, week, season))?,
            lines: self.read(TableName::raw_week(RawKind::Lines, year, week, season))?,
        };
        if !sources.as_sources().has_team_stats() {
            warn!(year, week, %season, "no basic or advanced stats; nothing to build");
            return Ok(BuildOutcome::nothing("no basic or advanced stats"));
        }
        let Some(table) = join_team_level(&sources.as_sources())? else {
            return Ok(BuildOutcome::nothing("no source tables"));
        };
        self.write_output(TableName::weekly(year, week, season), &table)
    }

    /// Rewrites the season's raw basic/advanced tables with placeholder rows
    /// for every home/away slot they lack. `None` when the games table is
    /// missing.
    pub fn normalize_pairs(&self, year: u32, season: SeasonType) -> Result<Option<PairsReport>> {
        let Some(games) = self.read(TableName::raw(RawKind::Games, year, season))? else {
            warn!(year, %season, "games table missing; skipping pair normalisation");
            return Ok(None);
        };

        let mut report = PairsReport::default();
        for kind in [RawKind::Basic, RawKind::Advanced] {
            let name = TableName::raw(kind, year, season);
            let stats = self.store.read_table(&name)?.unwrap_or_default();
            let seed: &[&str] = match kind {
                RawKind::Basic => &BASIC_SEED_COLUMNS,
                _ => &TEAM_GAME_KEYS,
            };
            let (filled, added) = ensure_pairs(&games, &stats, seed);
            if added > 0 {
                self.store.write_table(&name, &filled)?;
            }
            info!(year, %season, kind = kind.as_str(), added, "placeholder rows");
            match kind {
                RawKind::Basic => report.basic_added = added,
                _ => report.advanced_added = added,
            }
        }
        Ok(Some(report))
    }
}

impl<P: Provider> Assembler<P> {
    pub fn fetch_games(&self, year: u32, season: SeasonType) -> Result<Table> {
        let records = self
            .provider
            .fetch_games(year, season, FBS)
            .with_context(|| format!("fetch games {year} {season}"))?;
        let games = flatten_games(&records);
        self.persist(&TableName::raw(RawKind::Games, year, season), &games)?;
        Ok(games)
    }

    fn games_for(&self, year: u32, season: SeasonType) -> Result<Table> {
        match self
            .store
            .read_table(&TableName::raw(RawKind::Games, year, season))?
        {
            Some(games) => Ok(games),
            None => self.fetch_games(year, season),
        }
    }

    /// Season basic stats, fetched one week at a time over the weeks present
    /// in the games table. A failing week is logged and skipped.
    pub fn fetch_basic(&self, year: u32, season: SeasonType) -> Result<Table> {
        let games = self.games_for(year, season)?;
        let ids = game_ids(&games);
        let game_weeks: Vec<Option<u32>> = {
            let known: Vec<Option<u32>> = weeks(&games)
                .into_iter()
                .filter_map(|w| u32::try_from(w).ok())
                .map(Some)
                .collect();
            if known.is_empty() { vec![None] } else { known }
        };

        let mut long = Table::new(LONG_COLUMNS);
        for (idx, week) in game_weeks.iter().enumerate() {
            if idx > 0 {
                self.sleep_between_calls();
            }
            match self.provider.fetch_team_stats(year, season, *week) {
                Ok(records) => {
                    let records = known_records(records, &ids, |r| field_i64(r, GAME_ID_KEYS));
                    long = long.concat(&flatten_basic(&records));
                }
                Err(err) => warn!(
                    year,
                    week = ?week,
                    error = %format!("{err:#}"),
                    "basic stats fetch failed; skipping week"
                ),
            }
        }

        let wide = restrict_to_ids(&ids, basic_wide(&long));
        self.persist(&TableName::raw(RawKind::Basic, year, season), &wide)?;
        Ok(wide)
    }

    pub fn fetch_advanced(&self, year: u32, season: SeasonType) -> Result<Table> {
        let games = self.games_for(year, season)?;
        let ids = game_ids(&games);
        let records = self
            .provider
            .fetch_advanced_stats(year, season, None)
            .with_context(|| format!("fetch advanced stats {year} {season}"))?;
        let records = known_records(records, &ids, advanced_game_id::<Value>);
        let table = restrict_to_ids(&ids, flatten_advanced(&records));
        self.persist(&TableName::raw(RawKind::Advanced, year, season), &table)?;
        Ok(table)
    }

    /// Consensus lines for the season's known games.
    pub fn fetch_lines(&self, year: u32, season: SeasonType) -> Result<Table> {
        let games = self.games_for(year, season)?;
        let ids = game_ids(&games);
        let records = self
            .provider
            .fetch_lines(year, season, None)
            .with_context(|| format!("fetch lines {year} {season}"))?;
        let table = consensus_from_records(&records, Some(&ids));
        self.persist(&TableName::raw(RawKind::Lines, year, season), &table)?;
        Ok(table)
    }

    /// Fetches basic, advanced and (optionally) line tables for one week.
    /// Each kind fails independently; lines are limited to that week's games.
    pub fn fetch_week(
        &self,
        year: u32,
        week: u32,
        season: SeasonType,
        with_lines: bool,
    ) -> Result<WeekFetch> {
        let games = self.games_for(year, season)?;
        let ids = game_ids(&games);
        let mut out = WeekFetch::default();

        let basic = self
            .provider
            .fetch_team_stats(year, season, Some(week))
            .map(|records| {
                let records = known_records(records, &ids, |r| field_i64(r, GAME_ID_KEYS));
                restrict_to_ids(&ids, basic_wide(&flatten_basic(&records)))
            });
        out.basic_rows = self.persist_week(RawKind::Basic, year, week, season, basic)?;
        self.sleep_between_calls();

        let advanced = self
            .provider
            .fetch_advanced_stats(year, season, Some(week))
            .map(|records| {
                flatten_advanced(&known_records(records, &ids, advanced_game_id::<Value>))
            });
        out.advanced_rows = self.persist_week(RawKind::Advanced, year, week, season, advanced)?;

        if with_lines {
            self.sleep_between_calls();
            let week_ids = week_game_ids(&games, i64::from(week));
            let lines = self
                .provider
                .fetch_lines(year, season, Some(week))
                .map(|records| consensus_from_records(&records, Some(&week_ids)));
            out.lines_rows = self.persist_week(RawKind::Lines, year, week, season, lines)?;
        }
        Ok(out)
    }

    fn persist_week(
        &self,
        kind: RawKind,
        year: u32,
        week: u32,
        season: SeasonType,
        fetched: Result<Table>,
    ) -> Result<Option<usize>> {
        let table = match fetched {
            Ok(table) => table,
            Err(err) => {
                warn!(
                    kind = kind.as_str(),
                    year,
                    week,
                    error = %format!("{err:#}"),
                    "weekly fetch failed; skipping"
                );
                return Ok(None);
            }
        };
        let written = self.persist(&TableName::raw_week(kind, year, week, season), &table)?;
        Ok(written.then_some(table.len()))
    }

    /// Fetches every source for a season then builds the game-level dataset.
    pub fn backfill_year(
        &self,
        year: u32,
        season: SeasonType,
        with_lines: bool,
    ) -> Result<BuildOutcome> {
        self.fetch_games(year, season)?;
        self.sleep_between_calls();
        self.fetch_basic(year, season)?;
        self.sleep_between_calls();
        self.fetch_advanced(year, season)?;
        if with_lines {
            self.sleep_between_calls();
            self.fetch_lines(year, season)?;
        }
        self.build_game_level(year, season, false)
    }
}

fn basic_wide(long: &Table) -> Table {
    pivot_basic(long).dedup_by(&TEAM_GAME_KEYS, Keep::Last)
}

fn known_records(
    records: Vec<Value>,
    ids: &HashSet<i64>,
    game_id: impl Fn(&Value) -> Option<i64>,
) -> Vec<Value> {
    records
        .into_iter()
        .filter(|r| game_id(r).is_some_and(|id| ids.contains(&id)))
        .collect()
}

/// Runs `step` for every unit, turning errors into failed records so one bad
/// unit never stops the rest.
pub fn run_batch<U, F>(units: impl IntoIterator<Item = U>, mut step: F) -> Vec<UnitRecord>
where
    U: fmt::Display,
    F: FnMut(&U) -> Result<UnitRecord>,
{
    let mut out = Vec::new();
    for unit in units {
        let record = match step(&unit) {
            Ok(record) => record,
            Err(err) => {
                warn!(unit = %unit, error = %format!("{err:#}"), "unit failed; continuing");
                UnitRecord::failed(unit.to_string(), &err)
            }
        };
        out.push(record);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn week_totals_skip_missing_kinds() {
        let fetched = WeekFetch {
            basic_rows: Some(40),
            advanced_rows: None,
            lines_rows: Some(18),
        };
        assert_eq!(fetched.total_rows(), 58);
        assert_eq!(WeekFetch::default().total_rows(), 0);
    }

    #[test]
    fn records_outside_the_games_table_are_dropped() {
        let ids: HashSet<i64> = [1, 2].into_iter().collect();
        let records = vec![json!({"id": 1}), json!({"id": 3}), json!({"team": "no id"})];
        let kept = known_records(records, &ids, |r| field_i64(r, GAME_ID_KEYS));
        assert_eq!(kept, vec![json!({"id": 1})]);
    }

    #[test]
    fn skipped_builds_become_skipped_units() {
        let record = BuildOutcome::nothing("games table missing").into_unit("2020 regular");
        assert_eq!(record.status, crate::run_log::UnitStatus::Skipped);
        assert_eq!(record.message.as_deref(), Some("games table missing"));
    }
}
