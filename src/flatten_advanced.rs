use serde_json::Value;

use crate::normalize::{FieldSource, GAME_ID_KEYS, TEAM_KEYS, field_i64, field_str, field_value};
use crate::table::{Cell, Keep, Table};

const NAMESPACES: [(&str, &[&str]); 3] = [
    ("off", &["offense"]),
    ("def", &["defense"]),
    ("st", &["special_teams", "specialTeams"]),
];

pub fn advanced_game_id<R: FieldSource + ?Sized>(record: &R) -> Option<i64> {
    field_i64(record, GAME_ID_KEYS)
        .or_else(|| field_value(record, &["game"]).and_then(|g| field_i64(&g, &["id"])))
}

fn flatten_namespace(obj: Option<Value>, ns: &str, row: &mut Vec<(String, Cell)>) {
    let Some(Value::Object(map)) = obj else {
        return;
    };
    for (metric, value) in &map {
        match value {
            Value::Object(nested) => {
                for (sub, v) in nested {
                    row.push((format!("{ns}_{metric}_{sub}"), Cell::from_json(v)));
                }
            }
            other => row.push((format!("{ns}_{metric}"), Cell::from_json(other))),
        }
    }
}

/// Flattens advanced team-game records to one row per `(game_id, team)` with
/// `off_*`, `def_*` and `st_*` metric columns. The last record for a pair wins
/// and metric columns become numeric wherever every value allows it.
pub fn flatten_advanced<R: FieldSource>(records: &[R]) -> Table {
    let mut table = Table::new(["game_id", "team"]);
    for record in records {
        let mut row: Vec<(String, Cell)> = vec![
            ("game_id".to_string(), Cell::from(advanced_game_id(record))),
            ("team".to_string(), Cell::from(field_str(record, TEAM_KEYS))),
        ];
        for (ns, keys) in NAMESPACES {
            flatten_namespace(field_value(record, keys), ns, &mut row);
        }
        table.push_named(row);
    }

    let mut table = table.dedup_by(&["game_id", "team"], Keep::Last);
    table.coerce_numeric_columns(|name| name != "game_id" && name != "team");
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_metrics_get_three_part_names() {
        let rec = json!({
            "gameId": 7,
            "team": "X",
            "offense": {"ppa": 0.25, "passingDowns": {"ppa": "0.1", "successRate": 0.3}},
            "defense": {"plays": 61}
        });
        let t = flatten_advanced(&[rec]);
        assert_eq!(t.get(0, "off_ppa"), &Cell::Float(0.25));
        assert_eq!(t.get(0, "off_passingDowns_ppa"), &Cell::Float(0.1));
        assert_eq!(t.get(0, "def_plays"), &Cell::Int(61));
        assert!(!t.columns().iter().any(|c| c.starts_with("st_")));
    }

    #[test]
    fn nested_game_object_supplies_id() {
        let rec = json!({"game": {"id": 55}, "team": "Y"});
        assert_eq!(advanced_game_id(&rec), Some(55));
    }
}
