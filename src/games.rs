use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::normalize::{FieldSource, field_bool, field_i64, field_str};
use crate::table::{Cell, Keep, Table};

pub const GAME_COLUMNS: [&str; 14] = [
    "game_id",
    "season",
    "week",
    "season_type",
    "start_date",
    "home_team",
    "away_team",
    "home_points",
    "away_points",
    "home_conference",
    "away_conference",
    "conference_game",
    "neutral_site",
    "venue",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeasonType {
    Regular,
    Postseason,
    Both,
}

impl SeasonType {
    pub fn as_str(self) -> &'static str {
        match self {
            SeasonType::Regular => "regular",
            SeasonType::Postseason => "postseason",
            SeasonType::Both => "both",
        }
    }
}

impl fmt::Display for SeasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(SeasonType::Regular),
            "postseason" => Ok(SeasonType::Postseason),
            "both" => Ok(SeasonType::Both),
            other => Err(anyhow!(
                "unknown season type {other:?}, expected regular, postseason or both"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub game_id: i64,
    pub season: Option<i64>,
    pub week: Option<i64>,
    pub season_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_points: Option<i64>,
    pub away_points: Option<i64>,
    pub home_conference: Option<String>,
    pub away_conference: Option<String>,
    pub conference_game: Option<bool>,
    pub neutral_site: Option<bool>,
    pub venue: Option<String>,
}

impl Game {
    pub fn from_record<R: FieldSource + ?Sized>(record: &R) -> Option<Game> {
        Some(Game {
            game_id: field_i64(record, &["id", "game_id", "gameId"])?,
            season: field_i64(record, &["season", "year"]),
            week: field_i64(record, &["week"]),
            season_type: field_str(record, &["season_type", "seasonType"]),
            start_date: field_str(record, &["start_date", "startDate"])
                .as_deref()
                .and_then(parse_timestamp),
            home_team: field_str(record, &["home_team", "homeTeam"]),
            away_team: field_str(record, &["away_team", "awayTeam"]),
            home_points: field_i64(record, &["home_points", "homePoints"]),
            away_points: field_i64(record, &["away_points", "awayPoints"]),
            home_conference: field_str(record, &["home_conference", "homeConference"]),
            away_conference: field_str(record, &["away_conference", "awayConference"]),
            conference_game: field_bool(record, &["conference_game", "conferenceGame"]),
            neutral_site: field_bool(record, &["neutral_site", "neutralSite"]),
            venue: field_str(record, &["venue"]),
        })
    }

    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.game_id),
            self.season.into(),
            self.week.into(),
            self.season_type.clone().into(),
            self.start_date.map(format_timestamp).into(),
            self.home_team.clone().into(),
            self.away_team.clone().into(),
            self.home_points.into(),
            self.away_points.into(),
            self.home_conference.clone().into(),
            self.away_conference.clone().into(),
            self.conference_game.into(),
            self.neutral_site.into(),
            self.venue.clone().into(),
        ]
    }
}

/// Normalises provider game records into the games table, one row per
/// `game_id` (first record wins). Records without an id are skipped.
pub fn flatten_games<R: FieldSource>(records: &[R]) -> Table {
    games_table(records.iter().filter_map(Game::from_record))
}

pub fn games_table(games: impl IntoIterator<Item = Game>) -> Table {
    let mut table = Table::new(GAME_COLUMNS);
    for game in games {
        table.push_row(game.to_row());
    }
    table.dedup_by(&["game_id"], Keep::First)
}

pub fn game_ids(games: &Table) -> HashSet<i64> {
    games
        .column_values("game_id")
        .filter_map(Cell::as_i64)
        .collect()
}

pub fn weeks(games: &Table) -> BTreeSet<i64> {
    games.column_values("week").filter_map(Cell::as_i64).collect()
}

pub fn week_game_ids(games: &Table, week: i64) -> HashSet<i64> {
    games
        .column_values("game_id")
        .zip(games.column_values("week"))
        .filter(|(_, w)| w.as_i64() == Some(week))
        .filter_map(|(id, _)| id.as_i64())
        .collect()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_game_records_normalise() {
        let recs = vec![
            json!({"id": 401, "season": 2023, "week": 1, "seasonType": "regular",
                   "startDate": "2023-09-02T19:30:00.000Z", "homeTeam": "H", "awayTeam": "A",
                   "homePoints": 30, "awayPoints": 20, "neutralSite": false}),
            json!({"id": 401, "homeTeam": "dup"}),
            json!({"homeTeam": "no id"}),
        ];
        let t = flatten_games(&recs);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(0, "home_team"), &Cell::from("H"));
        assert_eq!(t.get(0, "start_date"), &Cell::from("2023-09-02T19:30:00Z"));
        assert_eq!(t.get(0, "neutral_site"), &Cell::Bool(false));
        assert_eq!(weeks(&t).into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn unparseable_start_date_is_null() {
        let game = Game::from_record(&json!({"id": 1, "start_date": "tbd"})).unwrap();
        assert!(game.start_date.is_none());
    }
}
