use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::normalize::{
    CONFERENCE_KEYS, FieldSource, TEAM_KEYS, field_list, field_str, field_value, numeric_from_value,
};
use crate::table::{Cell, KeyAtom, Table};

pub const LONG_COLUMNS: [&str; 5] = ["game_id", "team", "team_conference", "stat_name", "value"];

const RESERVED: [&str; 4] = ["game_id", "team", "stat_name", "value"];

struct StatKeys {
    id: &'static [&'static str],
    name: &'static [&'static str],
    value: &'static [&'static str],
}

// Per-game payloads: {id, teams: [{team, conference, stats: [{category, stat}]}]}
const PER_GAME: StatKeys = StatKeys {
    id: &["id", "game_id", "gameId"],
    name: &["category", "stat_name", "name"],
    value: &["stat", "stat_value", "statValue", "value"],
};

// Team records: {game_id, team, conference, categories: [{types: [{stat, stat_value}]}]}
const CATEGORIES: StatKeys = StatKeys {
    id: &["game_id", "gameId", "id"],
    name: &["stat", "name", "stat_name"],
    value: &["stat_value", "statValue", "value"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadShape {
    PerGame,
    Categories,
}

fn detect_shape<R: FieldSource + ?Sized>(record: &R) -> PayloadShape {
    let has_id = field_value(record, &["id"]).is_some();
    let has_teams = matches!(field_value(record, &["teams"]), Some(Value::Array(_)));
    if has_id && has_teams {
        PayloadShape::PerGame
    } else {
        PayloadShape::Categories
    }
}

struct LongRows {
    table: Table,
    coercion_misses: usize,
}

impl LongRows {
    fn push(&mut self, head: &[Cell; 3], stat: &Value, keys: &StatKeys) {
        let Some(name) = field_str(stat, keys.name) else {
            return;
        };
        let raw = field_value(stat, keys.value);
        let value = raw.as_ref().and_then(numeric_from_value);
        if raw.is_some() && value.is_none() {
            self.coercion_misses += 1;
        }
        let mut row = head.to_vec();
        row.push(Cell::Text(name));
        row.push(Cell::from(value));
        self.table.push_row(row);
    }
}

fn id_cell<R: FieldSource + ?Sized>(record: &R, keys: &[&str]) -> Cell {
    match field_value(record, keys) {
        Some(v) => match Cell::from_json(&v) {
            Cell::Text(s) => s.trim().parse::<i64>().map(Cell::Int).unwrap_or(Cell::Text(s)),
            other => other,
        },
        None => Cell::Null,
    }
}

fn text_cell<R: FieldSource + ?Sized>(record: &R, keys: &[&str]) -> Cell {
    Cell::from(field_str(record, keys))
}

/// Flattens basic team-game stat payloads into the long table
/// `(game_id, team, team_conference, stat_name, value)`.
///
/// Both provider shapes are accepted and may be mixed. Values that fail
/// numeric coercion are kept as nulls; stats without a name are skipped.
pub fn flatten_basic<R: FieldSource>(records: &[R]) -> Table {
    let mut out = LongRows {
        table: Table::new(LONG_COLUMNS),
        coercion_misses: 0,
    };

    for record in records {
        match detect_shape(record) {
            PayloadShape::PerGame => {
                let game_id = id_cell(record, PER_GAME.id);
                for entry in field_list(record, &["teams"]) {
                    let head = [
                        game_id.clone(),
                        text_cell(&entry, TEAM_KEYS),
                        text_cell(&entry, CONFERENCE_KEYS),
                    ];
                    for stat in field_list(&entry, &["stats"]) {
                        out.push(&head, &stat, &PER_GAME);
                    }
                }
            }
            PayloadShape::Categories => {
                let head = [
                    id_cell(record, CATEGORIES.id),
                    text_cell(record, TEAM_KEYS),
                    text_cell(record, CONFERENCE_KEYS),
                ];
                for category in field_list(record, &["categories"]) {
                    for stat in field_list(&category, &["types"]) {
                        out.push(&head, &stat, &CATEGORIES);
                    }
                }
            }
        }
    }

    if out.coercion_misses > 0 {
        debug!(misses = out.coercion_misses, "basic stat values coerced to null");
    }
    out.table
}

/// Pivots the long basic table into one row per `(game_id, team)` with one
/// column per distinct `stat_name` (first-seen order). Every other non-reserved
/// column is carried as row metadata from the first row of each pair.
pub fn pivot_basic(long: &Table) -> Table {
    let (Some(gid_idx), Some(team_idx)) = (long.column_index("game_id"), long.column_index("team"))
    else {
        return Table::new(["game_id", "team"]);
    };
    let name_idx = long.column_index("stat_name");
    let value_idx = long.column_index("value");
    let meta: Vec<(usize, &str)> = long
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !RESERVED.contains(&c.as_str()))
        .map(|(i, c)| (i, c.as_str()))
        .collect();

    let mut pair_pos: HashMap<(KeyAtom, KeyAtom), usize> = HashMap::new();
    let mut pairs: Vec<Vec<Cell>> = Vec::new();
    let mut stat_pos: HashMap<String, usize> = HashMap::new();
    let mut stat_names: Vec<String> = Vec::new();
    let mut cells: Vec<HashMap<usize, Cell>> = Vec::new();

    for row in long.rows() {
        let key = (row[gid_idx].key_atom(), row[team_idx].key_atom());
        let pos = *pair_pos.entry(key).or_insert_with(|| {
            let mut head = vec![row[gid_idx].clone(), row[team_idx].clone()];
            head.extend(meta.iter().map(|(i, _)| row[*i].clone()));
            pairs.push(head);
            cells.push(HashMap::new());
            pairs.len() - 1
        });

        let Some(name) = name_idx.and_then(|i| row[i].as_str().map(str::to_string)) else {
            continue;
        };
        let stat = *stat_pos.entry(name.clone()).or_insert_with(|| {
            stat_names.push(name);
            stat_names.len() - 1
        });
        let value = value_idx.map(|i| row[i].clone()).unwrap_or(Cell::Null);
        let slot = cells[pos].entry(stat).or_insert(Cell::Null);
        if slot.is_null() {
            *slot = value;
        }
    }

    let mut columns: Vec<&str> = vec!["game_id", "team"];
    columns.extend(meta.iter().map(|(_, c)| *c));
    columns.extend(stat_names.iter().map(String::as_str));
    let mut wide = Table::new(columns);

    for (mut head, mut stats) in pairs.into_iter().zip(cells) {
        head.extend((0..stat_names.len()).map(|s| stats.remove(&s).unwrap_or(Cell::Null)));
        wide.push_row(head);
    }
    wide
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn per_game_shape_is_detected() {
        let rec = json!({"id": 9, "teams": [{"team": "X", "conference": "C", "stats": [
            {"category": "totalYards", "stat": "412"},
            {"category": "completionAttempts", "stat": "20-31"}
        ]}]});
        let long = flatten_basic(&[rec]);
        assert_eq!(long.len(), 2);
        assert_eq!(long.get(0, "value"), &Cell::Float(412.0));
        assert_eq!(long.get(1, "value"), &Cell::Null);
    }

    #[test]
    fn pivot_never_drops_pairs_without_stats() {
        let mut long = Table::new(LONG_COLUMNS);
        long.push_row(vec![1.into(), "A".into(), "C".into(), Cell::Null, Cell::Null]);
        let wide = pivot_basic(&long);
        assert_eq!(wide.len(), 1);
        assert_eq!(wide.columns(), &["game_id", "team", "team_conference"]);
    }
}
