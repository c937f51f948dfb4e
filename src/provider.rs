use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::games::SeasonType;
use crate::http_client::get_json;

pub const DEFAULT_BASE_URL: &str = "https://api.collegefootballdata.com";
pub const FBS: &str = "fbs";

/// Source of raw provider records. Records stay loosely typed; the
/// normalizer resolves fields downstream.
pub trait Provider {
    fn fetch_games(
        &self,
        year: u32,
        season: SeasonType,
        classification: &str,
    ) -> Result<Vec<Value>>;

    fn fetch_team_stats(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>>;

    fn fetch_advanced_stats(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>>;

    fn fetch_lines(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>>;
}

impl<P: Provider + ?Sized> Provider for &P {
    fn fetch_games(
        &self,
        year: u32,
        season: SeasonType,
        classification: &str,
    ) -> Result<Vec<Value>> {
        (**self).fetch_games(year, season, classification)
    }

    fn fetch_team_stats(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>> {
        (**self).fetch_team_stats(year, season, week)
    }

    fn fetch_advanced_stats(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>> {
        (**self).fetch_advanced_stats(year, season, week)
    }

    fn fetch_lines(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>> {
        (**self).fetch_lines(year, season, week)
    }
}

/// HTTP client for the college-football data API.
#[derive(Debug, Clone)]
pub struct CfbdClient {
    base_url: String,
    api_key: String,
}

impl CfbdClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn get_list(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, ?query, "provider request");
        match get_json(&url, query, &self.api_key)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(anyhow!(
                "expected a json array from {url}, got {}",
                json_kind(&other)
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn season_query(year: u32, season: SeasonType, week: Option<u32>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("year", year.to_string()),
        ("seasonType", season.to_string()),
    ];
    if let Some(week) = week {
        query.push(("week", week.to_string()));
    }
    query
}

impl Provider for CfbdClient {
    fn fetch_games(
        &self,
        year: u32,
        season: SeasonType,
        classification: &str,
    ) -> Result<Vec<Value>> {
        let mut query = season_query(year, season, None);
        query.push(("classification", classification.to_string()));
        self.get_list("/games", &query)
    }

    fn fetch_team_stats(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>> {
        self.get_list("/games/teams", &season_query(year, season, week))
    }

    fn fetch_advanced_stats(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>> {
        self.get_list("/stats/game/advanced", &season_query(year, season, week))
    }

    fn fetch_lines(
        &self,
        year: u32,
        season: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<Value>> {
        self.get_list("/lines", &season_query(year, season, week))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_is_optional_in_queries() {
        let q = season_query(2023, SeasonType::Postseason, None);
        assert_eq!(
            q,
            vec![
                ("year", "2023".to_string()),
                ("seasonType", "postseason".to_string())
            ]
        );
        let q = season_query(2023, SeasonType::Regular, Some(3));
        assert_eq!(q.last(), Some(&("week", "3".to_string())));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = CfbdClient::new("http://localhost:8080/", "k");
        assert_eq!(c.base_url, "http://localhost:8080");
    }
}
