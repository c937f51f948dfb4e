use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;

use crate::normalize::parse_numeric_or_null;

static NULL_CELL: Cell = Cell::Null;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Hashable projection of a cell used for keyed dedup and joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyAtom {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    First,
    Last,
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            Cell::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Int(i)
                } else {
                    n.as_f64().map(Cell::Float).unwrap_or(Cell::Null)
                }
            }
            Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Integral floats collapse onto the integer atom so `401.0` and `401`
    /// land on the same key.
    pub fn key_atom(&self) -> KeyAtom {
        match self {
            Cell::Null => KeyAtom::Null,
            Cell::Bool(b) => KeyAtom::Bool(*b),
            Cell::Int(v) => KeyAtom::Int(*v),
            Cell::Float(v) if v.is_nan() => KeyAtom::Null,
            Cell::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => KeyAtom::Int(*v as i64),
            Cell::Float(v) => KeyAtom::Float(v.to_bits()),
            Cell::Text(s) => KeyAtom::Text(s.clone()),
        }
    }

    /// Numeric view used by opportunistic coercion. `Err(())` marks a value
    /// that cannot be made numeric.
    fn coerced(&self) -> Result<Cell, ()> {
        match self {
            Cell::Null => Ok(Cell::Null),
            Cell::Int(_) | Cell::Float(_) => Ok(self.clone()),
            Cell::Text(s) if s.trim().is_empty() => Ok(Cell::Null),
            Cell::Text(s) => parse_numeric_or_null(s).map(Cell::Float).ok_or(()),
            Cell::Bool(_) => Err(()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Table::default();
        for name in columns {
            table.add_column(&name.into());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns the index of `name`, appending a null-filled column if absent.
    pub fn add_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Null);
        }
        self.columns.len() - 1
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    /// Appends a row given as `(column, value)` pairs; unknown columns are added.
    pub fn push_named<S: AsRef<str>>(&mut self, values: Vec<(S, Cell)>) {
        let mut indexed = Vec::with_capacity(values.len());
        for (name, cell) in values {
            indexed.push((self.add_column(name.as_ref()), cell));
        }
        let mut row = vec![Cell::Null; self.columns.len()];
        for (idx, cell) in indexed {
            row[idx] = cell;
        }
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> &Cell {
        match (self.rows.get(row), self.column_index(column)) {
            (Some(r), Some(c)) => &r[c],
            _ => &NULL_CELL,
        }
    }

    pub fn set(&mut self, row: usize, column: &str, value: Cell) {
        let idx = self.add_column(column);
        if let Some(r) = self.rows.get_mut(row) {
            r[idx] = value;
        }
    }

    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Cell> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .map(move |row| idx.map(|i| &row[i]).unwrap_or(&NULL_CELL))
    }

    /// First row index whose `column` equals `value` by key semantics.
    pub fn find_row(&self, column: &str, value: &Cell) -> Option<usize> {
        let idx = self.column_index(column)?;
        let needle = value.key_atom();
        self.rows.iter().position(|row| row[idx].key_atom() == needle)
    }

    pub fn key_indices(&self, keys: &[&str]) -> Option<Vec<usize>> {
        keys.iter().map(|k| self.column_index(k)).collect()
    }

    pub fn row_key(row: &[Cell], indices: &[usize]) -> Vec<KeyAtom> {
        indices.iter().map(|&i| row[i].key_atom()).collect()
    }

    /// Keeps one row per key. Tables missing a key column are returned as-is.
    pub fn dedup_by(mut self, keys: &[&str], keep: Keep) -> Table {
        let Some(indices) = self.key_indices(keys) else {
            return self;
        };
        let mut chosen: HashMap<Vec<KeyAtom>, usize> = HashMap::new();
        for (pos, row) in self.rows.iter().enumerate() {
            let key = Table::row_key(row, &indices);
            match keep {
                Keep::First => {
                    chosen.entry(key).or_insert(pos);
                }
                Keep::Last => {
                    chosen.insert(key, pos);
                }
            }
        }
        let retained: HashSet<usize> = chosen.into_values().collect();
        let rows = std::mem::take(&mut self.rows);
        self.rows = rows
            .into_iter()
            .enumerate()
            .filter(|(pos, _)| retained.contains(pos))
            .map(|(_, row)| row)
            .collect();
        self
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Cell]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Prefixes every column except `keep`.
    pub fn prefixed(mut self, prefix: &str, keep: &[&str]) -> Table {
        for name in &mut self.columns {
            if !keep.contains(&name.as_str()) {
                *name = format!("{prefix}{name}");
            }
        }
        self
    }

    pub fn drop_column(mut self, name: &str) -> Table {
        if let Some(idx) = self.column_index(name) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
        self
    }

    /// Projects onto the listed columns that exist, in the given order.
    pub fn select(&self, names: &[&str]) -> Table {
        let picked: Vec<(usize, &str)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|i| (i, *n)))
            .collect();
        let mut out = Table::new(picked.iter().map(|(_, n)| *n));
        for row in &self.rows {
            out.rows
                .push(picked.iter().map(|(i, _)| row[*i].clone()).collect());
        }
        out
    }

    /// Moves the listed columns (those present) to the front, keeping the rest
    /// in their current order.
    pub fn with_front(self, front: &[&str]) -> Table {
        let mut order: Vec<&str> = front
            .iter()
            .copied()
            .filter(|c| self.has_column(c))
            .collect();
        for name in &self.columns {
            if !order.contains(&name.as_str()) {
                order.push(name.as_str());
            }
        }
        self.select(&order)
    }

    /// Row-wise union; columns of `other` missing here are appended.
    pub fn concat(mut self, other: &Table) -> Table {
        let mapping: Vec<usize> = other.columns.iter().map(|c| self.add_column(c)).collect();
        for row in &other.rows {
            let mut out = vec![Cell::Null; self.columns.len()];
            for (src, &dst) in mapping.iter().enumerate() {
                out[dst] = row[src].clone();
            }
            self.rows.push(out);
        }
        self
    }

    /// Converts each selected column to numeric cells when every non-null
    /// value coerces; a single failure leaves the column untouched.
    pub fn coerce_numeric_columns(&mut self, mut selected: impl FnMut(&str) -> bool) -> usize {
        let mut converted = 0usize;
        for idx in 0..self.columns.len() {
            if !selected(&self.columns[idx]) {
                continue;
            }
            let coerced: Result<Vec<Cell>, ()> =
                self.rows.iter().map(|row| row[idx].coerced()).collect();
            let Ok(values) = coerced else {
                continue;
            };
            for (row, value) in self.rows.iter_mut().zip(values) {
                row[idx] = value;
            }
            converted += 1;
        }
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_last_occurrence_in_place() {
        let mut t = Table::new(["game_id", "team", "v"]);
        t.push_row(vec![1.into(), "A".into(), 1.into()]);
        t.push_row(vec![1.into(), "B".into(), 2.into()]);
        t.push_row(vec![1.into(), "A".into(), 3.into()]);
        let t = t.dedup_by(&["game_id", "team"], Keep::Last);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "team"), &Cell::from("B"));
        assert_eq!(t.get(1, "v"), &Cell::Int(3));
    }

    #[test]
    fn integral_float_keys_match_ints() {
        assert_eq!(Cell::Float(401.0).key_atom(), Cell::Int(401).key_atom());
        assert_ne!(Cell::Float(1.5).key_atom(), Cell::Int(1).key_atom());
    }

    #[test]
    fn coercion_skips_columns_with_unparseable_text() {
        let mut t = Table::new(["a", "b"]);
        t.push_row(vec!["1.5".into(), "x".into()]);
        t.push_row(vec![Cell::Null, "2".into()]);
        let converted = t.coerce_numeric_columns(|_| true);
        assert_eq!(converted, 1);
        assert_eq!(t.get(0, "a"), &Cell::Float(1.5));
        assert_eq!(t.get(0, "b"), &Cell::from("x"));
    }

    #[test]
    fn with_front_reorders_present_columns_only() {
        let t = Table::new(["x", "team", "game_id"]).with_front(&["game_id", "team", "home_team"]);
        assert_eq!(t.columns(), &["game_id", "team", "x"]);
    }
}
