use serde_json::{Map, Value};

pub const GAME_ID_KEYS: &[&str] = &["game_id", "gameId", "id"];
pub const TEAM_KEYS: &[&str] = &["team", "teamName", "school"];
pub const CONFERENCE_KEYS: &[&str] = &["conference", "teamConference", "team_conference"];
pub const SPREAD_KEYS: &[&str] = &["spread", "point_spread", "pointSpread", "line", "handicap"];
pub const TOTAL_KEYS: &[&str] = &["overUnder", "over_under", "total", "ou"];
pub const PROVIDER_KEYS: &[&str] = &["provider", "book", "source"];
pub const UPDATED_KEYS: &[&str] = &["last_updated", "lastUpdated", "updated"];

/// Capability view over a loosely-typed provider record.
///
/// A record may expose a mapping view (JSON objects, decoded dictionaries),
/// attribute-style access (typed structs), or both. Lookups always try the
/// mapping view first, then attributes, so callers never branch on the
/// concrete record type.
pub trait FieldSource {
    fn mapping_view(&self) -> Option<&Map<String, Value>> {
        None
    }

    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl FieldSource for Value {
    fn mapping_view(&self) -> Option<&Map<String, Value>> {
        self.as_object()
    }
}

impl FieldSource for Map<String, Value> {
    fn mapping_view(&self) -> Option<&Map<String, Value>> {
        Some(self)
    }
}

impl<T: FieldSource + ?Sized> FieldSource for &T {
    fn mapping_view(&self) -> Option<&Map<String, Value>> {
        (**self).mapping_view()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        (**self).attribute(name)
    }
}

/// Returns the first non-null value found for `candidates`, in declared order:
/// every candidate against the mapping view, then every candidate as an
/// attribute. Absence is `None`, never an error.
pub fn field_value<R: FieldSource + ?Sized>(record: &R, candidates: &[&str]) -> Option<Value> {
    if let Some(map) = record.mapping_view() {
        for key in candidates {
            match map.get(*key) {
                Some(Value::Null) | None => continue,
                Some(v) => return Some(v.clone()),
            }
        }
    }
    candidates
        .iter()
        .filter_map(|key| record.attribute(key))
        .find(|v| !v.is_null())
}

pub fn field_str<R: FieldSource + ?Sized>(record: &R, candidates: &[&str]) -> Option<String> {
    match field_value(record, candidates)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn field_i64<R: FieldSource + ?Sized>(record: &R, candidates: &[&str]) -> Option<i64> {
    let value = field_value(record, candidates)?;
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = numeric_from_value(&value)?;
    (f.fract() == 0.0).then_some(f as i64)
}

pub fn field_bool<R: FieldSource + ?Sized>(record: &R, candidates: &[&str]) -> Option<bool> {
    match field_value(record, candidates)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

pub fn field_list<R: FieldSource + ?Sized>(record: &R, candidates: &[&str]) -> Vec<Value> {
    match field_value(record, candidates) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Resolves a line field (spread, total, ...) to a number, or `None` when the
/// field is absent or not numeric.
pub fn normalize_line<R: FieldSource + ?Sized>(record: &R, candidates: &[&str]) -> Option<f64> {
    field_value(record, candidates).and_then(|v| numeric_from_value(&v))
}

pub fn numeric_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric_or_null(s),
        _ => None,
    }
}

/// Parses a decorated numeric string such as `"+3.5"` or `"\u{2212}7"`.
/// Unparseable and non-finite input yields `None`.
pub fn parse_numeric_or_null(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| *ch != '+')
        .map(|ch| if ch == '\u{2212}' { '-' } else { ch })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BookLine {
        spread: Option<f64>,
        point_spread: Option<f64>,
    }

    impl FieldSource for BookLine {
        fn attribute(&self, name: &str) -> Option<Value> {
            match name {
                "spread" => self.spread.map(Value::from),
                "point_spread" => self.point_spread.map(Value::from),
                _ => None,
            }
        }
    }

    #[test]
    fn decorated_numbers_parse() {
        assert_eq!(parse_numeric_or_null("+3.5"), Some(3.5));
        assert_eq!(parse_numeric_or_null("\u{2212}7"), Some(-7.0));
        assert_eq!(parse_numeric_or_null(" 55 "), Some(55.0));
        assert_eq!(parse_numeric_or_null("N/A"), None);
        assert_eq!(parse_numeric_or_null("NaN"), None);
        assert_eq!(parse_numeric_or_null(""), None);
    }

    #[test]
    fn first_declared_candidate_wins() {
        let rec = json!({"handicap": -10, "line": "-4", "spread": null});
        assert_eq!(normalize_line(&rec, SPREAD_KEYS), Some(-4.0));
    }

    #[test]
    fn mapping_view_is_read_before_attributes() {
        let rec = json!({"point_spread": "+2.5"});
        assert_eq!(normalize_line(&rec, SPREAD_KEYS), Some(2.5));

        let typed = BookLine {
            spread: None,
            point_spread: Some(-6.5),
        };
        assert_eq!(normalize_line(&typed, SPREAD_KEYS), Some(-6.5));
    }

    #[test]
    fn absent_or_garbage_fields_are_null() {
        let rec = json!({"spread": "pk"});
        assert_eq!(normalize_line(&rec, SPREAD_KEYS), None);
        assert_eq!(normalize_line(&json!("scalar"), TOTAL_KEYS), None);
        assert_eq!(field_i64(&json!({"gameId": "401"}), GAME_ID_KEYS), Some(401));
    }
}
