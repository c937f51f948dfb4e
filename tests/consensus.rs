use std::collections::HashSet;

use serde_json::{Value, json};

use cfb_spreads::lines::{
    CONSENSUS_COLUMNS, LineObservation, consensus, consensus_from_records, consensus_table,
    extract_observations,
};
use cfb_spreads::normalize::{SPREAD_KEYS, normalize_line, parse_numeric_or_null};
use cfb_spreads::table::Cell;

fn read_fixture(name: &str) -> Vec<Value> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let raw = std::fs::read_to_string(path).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be json")
}

#[test]
fn medians_are_taken_per_field() {
    let obs = vec![
        LineObservation::new(10, Some("A")).with_spread(-7.0),
        LineObservation::new(10, Some("B")).with_spread(-6.0),
        LineObservation::new(10, Some("A")).with_total(50.0),
    ];
    let rows = consensus(&obs);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.game_id, 10);
    assert_eq!(row.spread, Some(-6.5));
    assert_eq!(row.total, Some(50.0));
    assert_eq!(row.provider_count, 2);
    assert_eq!(row.providers_list.as_deref(), Some("A,B"));
    assert_eq!(row.provider(), "consensus");

    let table = consensus_table(&rows);
    assert_eq!(table.columns(), &CONSENSUS_COLUMNS);
    assert_eq!(table.get(0, "provider"), &Cell::from("consensus"));
    assert_eq!(table.get(0, "provider_count"), &Cell::Int(2));
}

#[test]
fn odd_counts_take_the_middle_value() {
    let obs = vec![
        LineObservation::new(3, Some("A")).with_spread(-3.5),
        LineObservation::new(3, Some("B")).with_spread(-3.0),
        LineObservation::new(3, Some("C")).with_spread(-4.0),
    ];
    assert_eq!(consensus(&obs)[0].spread, Some(-3.5));
}

#[test]
fn games_without_numbers_keep_null_medians() {
    let obs = vec![LineObservation::new(4, None)];
    let rows = consensus(&obs);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].spread, None);
    assert_eq!(rows[0].total, None);
    assert_eq!(rows[0].provider_count, 0);
    assert_eq!(rows[0].providers_list, None);
    assert!(consensus(&[]).is_empty());
}

#[test]
fn fixture_lines_reduce_to_one_row_per_known_game() {
    let records = read_fixture("lines_2023.json");
    let known: HashSet<i64> = [10, 11].into_iter().collect();
    let table = consensus_from_records(&records, Some(&known));
    assert_eq!(table.len(), 2);

    assert_eq!(table.get(0, "game_id"), &Cell::Int(10));
    assert_eq!(table.get(0, "spread"), &Cell::Float(-6.5));
    assert_eq!(table.get(0, "total"), &Cell::Float(50.0));
    assert_eq!(table.get(0, "providers_list"), &Cell::from("A,B"));
    assert_eq!(table.get(0, "last_updated"), &Cell::from("2023-09-02T08:00:00Z"));

    assert_eq!(table.get(1, "spread"), &Cell::Float(3.5));
    assert_eq!(table.get(1, "total"), &Cell::Float(47.5));

    let everything = consensus_from_records(&records, None);
    assert_eq!(everything.len(), 3);
}

#[test]
fn flat_records_are_read_as_a_single_book() {
    let records = vec![json!({"gameId": 5, "provider": "Book", "pointSpread": "−2.5"})];
    let obs = extract_observations(&records, None);
    assert_eq!(obs.len(), 1);
    assert_eq!(obs[0].spread, Some(-2.5));
    assert_eq!(obs[0].provider.as_deref(), Some("Book"));
}

#[test]
fn decorated_numbers_normalise_and_junk_is_null() {
    assert_eq!(parse_numeric_or_null("+3.5"), Some(3.5));
    assert_eq!(parse_numeric_or_null("N/A"), None);
    assert_eq!(parse_numeric_or_null(""), None);
    assert_eq!(normalize_line(&json!({"spread": "N/A"}), SPREAD_KEYS), None);
    assert_eq!(normalize_line(&json!({"line": -7}), SPREAD_KEYS), Some(-7.0));
}

#[test]
fn empty_bookmaker_lists_produce_no_rows() {
    let records = vec![
        json!({"id": 10, "homeTeam": "H", "awayTeam": "A", "lines": []}),
        json!({"id": 11, "lines": [{"provider": "A", "lines": []}]}),
    ];
    assert!(extract_observations(&records, None).is_empty());
    assert!(consensus_from_records(&records, None).is_empty());
}

#[test]
fn providers_without_numbers_are_not_counted() {
    let records = vec![json!({"id": 10, "lines": [
        {"provider": "A", "spread": -7},
        {"provider": "B", "spread": null, "overUnder": null},
        {"provider": "C", "spread": "N/A", "overUnder": "47"}
    ]})];
    let table = consensus_from_records(&records, None);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0, "provider_count"), &Cell::Int(2));
    assert_eq!(table.get(0, "providers_list"), &Cell::from("A,C"));
    assert_eq!(table.get(0, "spread"), &Cell::Float(-7.0));
    assert_eq!(table.get(0, "total"), &Cell::Float(47.0));

    let only_b = vec![json!({"id": 12, "lines": [{"provider": "B", "spread": null}]})];
    let table = consensus_from_records(&only_b, None);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0, "provider_count"), &Cell::Int(0));
    assert_eq!(table.get(0, "providers_list"), &Cell::Null);
}
