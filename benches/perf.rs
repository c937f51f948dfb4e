use std::collections::HashSet;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

use cfb_spreads::flatten_basic::{flatten_basic, pivot_basic};
use cfb_spreads::games::flatten_games;
use cfb_spreads::join::{SpreadConvention, Sources, join_game_level};
use cfb_spreads::lines::{consensus, extract_observations};

const GAMES: i64 = 800;

fn synthetic_games() -> Vec<Value> {
    (0..GAMES)
        .map(|id| {
            json!({
                "id": id,
                "week": id % 15 + 1,
                "homeTeam": format!("T{}", id * 2),
                "awayTeam": format!("T{}", id * 2 + 1),
                "homePoints": 21 + id % 14,
                "awayPoints": 17 + id % 10
            })
        })
        .collect()
}

fn synthetic_team_stats() -> Vec<Value> {
    (0..GAMES)
        .map(|id| {
            let team = |n: i64| {
                json!({
                    "team": format!("T{n}"),
                    "conference": "C",
                    "stats": [
                        {"category": "totalYards", "stat": (300 + n % 150).to_string()},
                        {"category": "turnovers", "stat": (n % 4).to_string()},
                        {"category": "thirdDownEff", "stat": "5-12"},
                        {"category": "possessionTime", "stat": "31:12"}
                    ]
                })
            };
            json!({"id": id, "teams": [team(id * 2), team(id * 2 + 1)]})
        })
        .collect()
}

fn synthetic_lines() -> Vec<Value> {
    (0..GAMES)
        .map(|id| {
            json!({
                "id": id,
                "lines": [
                    {"provider": "A", "spread": format!("-{}.5", id % 10), "overUnder": 51.5},
                    {"provider": "B", "spread": -((id % 10) as f64), "overUnder": "52"},
                    {"provider": "C", "spread": "N/A", "overUnder": null}
                ]
            })
        })
        .collect()
}

fn bench_flatten_and_pivot(c: &mut Criterion) {
    let records = synthetic_team_stats();
    c.bench_function("basic_flatten_pivot", |b| {
        b.iter(|| {
            let wide = pivot_basic(&flatten_basic(black_box(&records)));
            black_box(wide.len());
        })
    });
}

fn bench_consensus(c: &mut Criterion) {
    let records = synthetic_lines();
    let known: HashSet<i64> = (0..GAMES).collect();
    c.bench_function("line_consensus", |b| {
        b.iter(|| {
            let rows = consensus(&extract_observations(black_box(&records), Some(&known)));
            black_box(rows.len());
        })
    });
}

fn bench_game_level_join(c: &mut Criterion) {
    let games = flatten_games(&synthetic_games());
    let basic = pivot_basic(&flatten_basic(&synthetic_team_stats()));
    let sources = Sources {
        games: Some(&games),
        basic: Some(&basic),
        ..Sources::default()
    };
    c.bench_function("game_level_join", |b| {
        b.iter(|| {
            let out = join_game_level(black_box(&sources), SpreadConvention::default()).unwrap();
            black_box(out.map(|t| t.len()));
        })
    });
}

criterion_group!(
    perf,
    bench_flatten_and_pivot,
    bench_consensus,
    bench_game_level_join
);
criterion_main!(perf);
