use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use anyhow::{Result, anyhow};

use crate::lines::CONSENSUS_COLUMNS;
use crate::pairs::Side;
use crate::table::{Cell, KeyAtom, Keep, Table};

pub const TEAM_GAME_KEYS: [&str; 2] = ["game_id", "team"];
pub const GAME_KEYS: [&str; 1] = ["game_id"];

pub const TEAM_LEVEL_FRONT: [&str; 4] = ["game_id", "team", "home_team", "away_team"];
pub const GAME_LEVEL_FRONT: [&str; 3] = ["game_id", "home_team", "away_team"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Outer,
}

/// Renames applied to non-key columns present on both sides of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suffixes {
    pub left: &'static str,
    pub right: &'static str,
}

pub const ADVANCED_SUFFIXES: Suffixes = Suffixes { left: "", right: "_adv" };
pub const GAME_SUFFIXES: Suffixes = Suffixes { left: "", right: "_game" };
pub const LINE_SUFFIXES: Suffixes = Suffixes { left: "", right: "_line" };
pub const SIDE_STATS_SUFFIXES: Suffixes = Suffixes { left: "", right: "_stats" };

#[derive(Debug, Clone, Copy)]
pub struct JoinSpec<'a> {
    pub left_on: &'a [&'a str],
    pub right_on: &'a [&'a str],
    pub kind: JoinKind,
    pub suffixes: Suffixes,
}

impl<'a> JoinSpec<'a> {
    pub fn on(keys: &'a [&'a str], kind: JoinKind, suffixes: Suffixes) -> Self {
        Self {
            left_on: keys,
            right_on: keys,
            kind,
            suffixes,
        }
    }

    pub fn between(
        left_on: &'a [&'a str],
        right_on: &'a [&'a str],
        kind: JoinKind,
        suffixes: Suffixes,
    ) -> Self {
        Self {
            left_on,
            right_on,
            kind,
            suffixes,
        }
    }
}

/// Keyed merge of two tables.
///
/// Keys named identically on both sides are emitted once; differently named
/// right keys are kept as ordinary columns. Rows with a null key cell never
/// match. Unmatched right rows of an outer join are appended after the left
/// rows with the shared keys taken from the right side.
pub fn merge(left: &Table, right: &Table, spec: &JoinSpec<'_>) -> Result<Table> {
    if spec.left_on.len() != spec.right_on.len() || spec.left_on.is_empty() {
        return Err(anyhow!(
            "join keys mismatch: left {:?} right {:?}",
            spec.left_on,
            spec.right_on
        ));
    }
    if spec.suffixes.left == spec.suffixes.right {
        return Err(anyhow!("join suffixes must differ: {:?}", spec.suffixes));
    }
    let left_keys = left
        .key_indices(spec.left_on)
        .ok_or_else(|| anyhow!("left table lacks join keys {:?}", spec.left_on))?;
    let right_keys = right
        .key_indices(spec.right_on)
        .ok_or_else(|| anyhow!("right table lacks join keys {:?}", spec.right_on))?;

    let shared: Vec<(usize, usize)> = spec
        .left_on
        .iter()
        .zip(spec.right_on)
        .zip(left_keys.iter().zip(&right_keys))
        .filter(|((l, r), _)| l == r)
        .map(|(_, (&li, &ri))| (li, ri))
        .collect();
    let shared_right: HashSet<usize> = shared.iter().map(|(_, ri)| *ri).collect();
    let shared_left: HashSet<usize> = shared.iter().map(|(li, _)| *li).collect();
    let right_emit: Vec<usize> = (0..right.width())
        .filter(|i| !shared_right.contains(i))
        .collect();

    let columns = merged_columns(left, right, &shared_left, &right_emit, spec.suffixes);
    let mut out = Table::new(&columns);
    if out.width() != columns.len() {
        return Err(anyhow!("join produced duplicate column names: {columns:?}"));
    }

    let mut index: HashMap<Vec<KeyAtom>, Vec<usize>> = HashMap::new();
    for (pos, row) in right.rows().iter().enumerate() {
        let key = Table::row_key(row, &right_keys);
        if key.contains(&KeyAtom::Null) {
            continue;
        }
        index.entry(key).or_default().push(pos);
    }

    let mut matched_right = vec![false; right.len()];
    for row in left.rows() {
        let key = Table::row_key(row, &left_keys);
        let hits = if key.contains(&KeyAtom::Null) {
            None
        } else {
            index.get(&key)
        };
        match hits {
            Some(hits) => {
                for &pos in hits {
                    matched_right[pos] = true;
                    let mut joined = row.clone();
                    joined.extend(right_emit.iter().map(|&i| right.rows()[pos][i].clone()));
                    out.push_row(joined);
                }
            }
            None => {
                let mut joined = row.clone();
                joined.resize(columns.len(), Cell::Null);
                out.push_row(joined);
            }
        }
    }

    if spec.kind == JoinKind::Outer {
        for (pos, row) in right.rows().iter().enumerate() {
            if matched_right[pos] {
                continue;
            }
            let mut joined = vec![Cell::Null; left.width()];
            for &(li, ri) in &shared {
                joined[li] = row[ri].clone();
            }
            joined.extend(right_emit.iter().map(|&i| row[i].clone()));
            out.push_row(joined);
        }
    }

    Ok(out)
}

fn merged_columns(
    left: &Table,
    right: &Table,
    shared_left: &HashSet<usize>,
    right_emit: &[usize],
    suffixes: Suffixes,
) -> Vec<String> {
    let right_names: HashSet<&str> = right_emit
        .iter()
        .map(|&i| right.columns()[i].as_str())
        .collect();
    let left_names: HashSet<&str> = left
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| !shared_left.contains(i))
        .map(|(_, c)| c.as_str())
        .collect();

    let mut columns: Vec<String> = left
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if !shared_left.contains(&i) && right_names.contains(c.as_str()) {
                format!("{c}{}", suffixes.left)
            } else {
                c.clone()
            }
        })
        .collect();

    for &i in right_emit {
        let name = &right.columns()[i];
        let mut renamed = if left_names.contains(name.as_str()) {
            format!("{name}{}", suffixes.right)
        } else {
            name.clone()
        };
        while columns.contains(&renamed) {
            renamed.push_str(suffixes.right);
        }
        columns.push(renamed);
    }
    columns
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadConvention {
    /// A negative spread means the home side is favored.
    #[default]
    HomeNegative,
    HomePositive,
}

impl SpreadConvention {
    /// Favored side for a quoted spread; a pick'em (0) has no favorite.
    pub fn favorite(self, spread: f64) -> Option<Side> {
        if !spread.is_finite() || spread == 0.0 {
            return None;
        }
        let home_favored = match self {
            SpreadConvention::HomeNegative => spread < 0.0,
            SpreadConvention::HomePositive => spread > 0.0,
        };
        Some(if home_favored { Side::Home } else { Side::Away })
    }
}

impl FromStr for SpreadConvention {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home_negative" | "negative" => Ok(SpreadConvention::HomeNegative),
            "home_positive" | "positive" => Ok(SpreadConvention::HomePositive),
            other => Err(anyhow!(
                "unknown spread convention {other:?}, expected home_negative or home_positive"
            )),
        }
    }
}

/// Source tables available for one build key. Absent sources are `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sources<'a> {
    pub games: Option<&'a Table>,
    pub basic: Option<&'a Table>,
    pub advanced: Option<&'a Table>,
    pub lines: Option<&'a Table>,
}

impl Sources<'_> {
    pub fn is_empty(&self) -> bool {
        self.games.is_none()
            && self.basic.is_none()
            && self.advanced.is_none()
            && self.lines.is_none()
    }

    pub fn has_team_stats(&self) -> bool {
        self.basic.is_some() || self.advanced.is_some()
    }
}

fn dedup_games(table: &Table) -> Table {
    table.clone().dedup_by(&GAME_KEYS, Keep::Last)
}

fn consensus_columns(lines: &Table) -> Table {
    let picked = lines.select(&CONSENSUS_COLUMNS);
    let lines = if picked.has_column("game_id") {
        picked
    } else {
        lines.clone()
    };
    dedup_games(&lines)
}

/// Outer-joins basic and advanced wide tables on `(game_id, team)`; either may
/// be absent.
pub fn combine_team_stats(
    basic: Option<&Table>,
    advanced: Option<&Table>,
) -> Result<Option<Table>> {
    let basic = basic.map(|t| t.clone().dedup_by(&TEAM_GAME_KEYS, Keep::Last));
    let advanced = advanced.map(|t| t.clone().dedup_by(&TEAM_GAME_KEYS, Keep::Last));
    match (basic, advanced) {
        (Some(b), Some(a)) => merge(
            &b,
            &a,
            &JoinSpec::on(&TEAM_GAME_KEYS, JoinKind::Outer, ADVANCED_SUFFIXES),
        )
        .map(Some),
        (Some(b), None) => Ok(Some(b)),
        (None, Some(a)) => Ok(Some(a)),
        (None, None) => Ok(None),
    }
}

/// One row per team-game: basic + advanced stats with the game's metadata
/// and consensus line attached. Without team stats the result degrades to the
/// games (and/or lines) table. `None` when no source is present.
pub fn join_team_level(sources: &Sources<'_>) -> Result<Option<Table>> {
    let games = sources.games.map(dedup_games);
    let lines = sources.lines.map(consensus_columns);

    let merged = match combine_team_stats(sources.basic, sources.advanced)? {
        Some(team) => {
            let mut merged = team;
            if let Some(games) = &games {
                merged = merge(
                    &merged,
                    games,
                    &JoinSpec::on(&GAME_KEYS, JoinKind::Left, GAME_SUFFIXES),
                )?;
            }
            if let Some(lines) = &lines {
                merged = merge(
                    &merged,
                    lines,
                    &JoinSpec::on(&GAME_KEYS, JoinKind::Left, LINE_SUFFIXES),
                )?;
            }
            merged
        }
        None => match (games, lines) {
            (Some(games), Some(lines)) => merge(
                &games,
                &lines,
                &JoinSpec::on(&GAME_KEYS, JoinKind::Left, LINE_SUFFIXES),
            )?,
            (Some(games), None) => games,
            (None, Some(lines)) => lines,
            (None, None) => return Ok(None),
        },
    };

    Ok(Some(merged.with_front(&TEAM_LEVEL_FRONT)))
}

/// One row per game with `home_`/`away_` prefixed team stats, the consensus
/// line, `point_diff` and `favorite`. `None` when the games table is absent.
pub fn join_game_level(
    sources: &Sources<'_>,
    convention: SpreadConvention,
) -> Result<Option<Table>> {
    let Some(games) = sources.games else {
        return Ok(None);
    };
    let mut merged = dedup_games(games);

    if let Some(team) = combine_team_stats(sources.basic, sources.advanced)?
        && !team.is_empty()
    {
        for side in [Side::Home, Side::Away] {
            let prefix = format!("{}_", side.as_str());
            let side_team = format!("{}_team", side.as_str());
            let side_stats = team.clone().prefixed(&prefix, &TEAM_GAME_KEYS);
            let left_on = ["game_id", side_team.as_str()];
            let spec = JoinSpec::between(
                &left_on,
                &TEAM_GAME_KEYS,
                JoinKind::Left,
                SIDE_STATS_SUFFIXES,
            );
            merged = merge(&merged, &side_stats, &spec)?.drop_column("team");
        }
    }

    if let Some(lines) = sources.lines.map(consensus_columns) {
        merged = merge(
            &merged,
            &lines,
            &JoinSpec::on(&GAME_KEYS, JoinKind::Left, LINE_SUFFIXES),
        )?;
    }

    merged.coerce_numeric_columns(|name| {
        name.starts_with("home_")
            || name.starts_with("away_")
            || name.starts_with("spread")
            || name.starts_with("total")
    });
    derive_outcome_columns(&mut merged, convention);
    Ok(Some(merged.with_front(&GAME_LEVEL_FRONT)))
}

/// Adds `point_diff` (home minus away points) and `favorite` (from `spread`).
pub fn derive_outcome_columns(table: &mut Table, convention: SpreadConvention) {
    let derived: Vec<(Cell, Cell)> = (0..table.len())
        .map(|row| {
            let diff = point_diff(table.get(row, "home_points"), table.get(row, "away_points"));
            let favorite = table
                .get(row, "spread")
                .as_f64()
                .and_then(|s| convention.favorite(s))
                .map(|side| Cell::from(side.as_str()))
                .unwrap_or(Cell::Null);
            (diff, favorite)
        })
        .collect();
    table.add_column("point_diff");
    table.add_column("favorite");
    for (row, (diff, favorite)) in derived.into_iter().enumerate() {
        table.set(row, "point_diff", diff);
        table.set(row, "favorite", favorite);
    }
}

fn point_diff(home: &Cell, away: &Cell) -> Cell {
    match (home, away) {
        (Cell::Int(h), Cell::Int(a)) => Cell::Int(h - a),
        _ => match (home.as_f64(), away.as_f64()) {
            (Some(h), Some(a)) => Cell::Float(h - a),
            _ => Cell::Null,
        },
    }
}
