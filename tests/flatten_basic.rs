use std::collections::HashSet;

use serde_json::{Value, json};

use cfb_spreads::flatten_advanced::flatten_advanced;
use cfb_spreads::flatten_basic::{LONG_COLUMNS, flatten_basic, pivot_basic};
use cfb_spreads::table::{Cell, KeyAtom};

fn read_fixture(name: &str) -> Vec<Value> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let raw = std::fs::read_to_string(path).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be json")
}

fn two_team_records() -> Vec<Value> {
    vec![
        json!({"game_id": 1, "team": "X", "conference": "C1", "categories": [
            {"types": [{"stat": "yards", "stat_value": 120}, {"stat": "turnovers", "stat_value": 1}]}
        ]}),
        json!({"game_id": 1, "team": "Y", "conference": "C2", "categories": [
            {"types": [{"stat": "yards", "stat_value": 95}, {"stat": "turnovers", "stat_value": 2}]}
        ]}),
    ]
}

#[test]
fn category_records_flatten_then_pivot_to_one_row_per_team() {
    let long = flatten_basic(&two_team_records());
    assert_eq!(long.columns(), &LONG_COLUMNS);
    assert_eq!(long.len(), 4);

    let wide = pivot_basic(&long);
    assert_eq!(wide.len(), 2);
    assert_eq!(
        wide.columns(),
        &["game_id", "team", "team_conference", "yards", "turnovers"]
    );
    let x = wide.find_row("team", &Cell::from("X")).expect("row for X");
    assert_eq!(wide.get(x, "yards"), &Cell::Float(120.0));
    assert_eq!(wide.get(x, "turnovers"), &Cell::Float(1.0));
    assert_eq!(wide.get(x, "team_conference"), &Cell::from("C1"));
}

#[test]
fn pivot_is_idempotent_on_its_long_input() {
    let long = flatten_basic(&two_team_records());
    assert_eq!(pivot_basic(&long), pivot_basic(&long));
    let doubled = long.clone().concat(&long);
    assert_eq!(pivot_basic(&doubled), pivot_basic(&long));
}

#[test]
fn per_game_fixture_yields_unique_team_game_keys() {
    let long = flatten_basic(&read_fixture("team_stats_week1.json"));
    let wide = pivot_basic(&long);
    assert_eq!(wide.len(), 3);

    let keys: HashSet<(KeyAtom, KeyAtom)> = (0..wide.len())
        .map(|r| (wide.get(r, "game_id").key_atom(), wide.get(r, "team").key_atom()))
        .collect();
    assert_eq!(keys.len(), wide.len());

    let h = wide.find_row("team", &Cell::from("H")).expect("row for H");
    assert_eq!(wide.get(h, "game_id"), &Cell::Int(10));
    assert_eq!(wide.get(h, "totalYards"), &Cell::Float(412.0));
    assert_eq!(wide.get(h, "completionAttempts"), &Cell::Null);
}

#[test]
fn mixed_shapes_share_one_long_table() {
    let mut records = read_fixture("team_stats_week1.json");
    records.extend(read_fixture("team_stats_week2.json"));
    let wide = pivot_basic(&flatten_basic(&records));

    let c = wide.find_row("team", &Cell::from("C")).expect("row for C");
    assert_eq!(wide.get(c, "game_id"), &Cell::Int(11));
    assert_eq!(wide.get(c, "team_conference"), &Cell::from("C2"));
    assert_eq!(wide.get(c, "turnovers"), &Cell::Float(0.0));
    assert_eq!(wide.get(c, "completionAttempts"), &Cell::Null);
}

#[test]
fn empty_input_gives_empty_tables() {
    let long = flatten_basic::<Value>(&[]);
    assert!(long.is_empty());
    assert_eq!(long.columns(), &LONG_COLUMNS);
    assert!(pivot_basic(&long).is_empty());
    assert!(flatten_advanced::<Value>(&[]).is_empty());
}

#[test]
fn advanced_fixture_keeps_every_team_game() {
    let t = flatten_advanced(&read_fixture("advanced_2023.json"));
    assert_eq!(t.len(), 3);
    let h = t.find_row("team", &Cell::from("H")).expect("row for H");
    assert_eq!(t.get(h, "def_ppa"), &Cell::Float(0.05));
    assert_eq!(t.get(h, "off_passingDowns_successRate"), &Cell::Float(0.35));
    let d = t.find_row("team", &Cell::from("D")).expect("row for D");
    assert_eq!(t.get(d, "game_id"), &Cell::Int(11));
    assert_eq!(t.get(d, "off_passingDowns_ppa"), &Cell::Null);
}

#[test]
fn advanced_duplicates_keep_the_last_record() {
    let records = vec![
        json!({"gameId": 5, "team": "X", "offense": {"ppa": 0.1, "pace": "fast"}, "defense": {"plays": 60}}),
        json!({"gameId": 5, "team": "Y", "offense": {"ppa": 0.2, "pace": "slow"}}),
        json!({"gameId": 5, "team": "X", "offense": {"ppa": "0.4", "pace": "fast"}}),
    ];
    let t = flatten_advanced(&records);
    assert_eq!(t.len(), 2);

    let x = t.find_row("team", &Cell::from("X")).expect("row for X");
    assert_eq!(t.get(x, "off_ppa"), &Cell::Float(0.4));
    assert_eq!(t.get(x, "def_plays"), &Cell::Null);
    assert_eq!(t.get(x, "off_pace"), &Cell::from("fast"));

    let y = t.find_row("team", &Cell::from("Y")).expect("row for Y");
    assert_eq!(t.get(y, "off_pace"), &Cell::from("slow"));
    assert_eq!(t.get(y, "off_ppa"), &Cell::Float(0.2));
}
