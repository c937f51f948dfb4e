use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Done,
    Skipped,
    Failed,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Done => "done",
            UnitStatus::Skipped => "skipped",
            UnitStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "done" => Ok(UnitStatus::Done),
            "skipped" => Ok(UnitStatus::Skipped),
            "failed" => Ok(UnitStatus::Failed),
            other => Err(anyhow!("unknown unit status {other:?}")),
        }
    }
}

/// Outcome of one (year, season[, week]) unit of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub unit: String,
    pub status: UnitStatus,
    pub rows: usize,
    pub message: Option<String>,
}

impl UnitRecord {
    pub fn done(unit: impl Into<String>, rows: usize) -> Self {
        Self {
            unit: unit.into(),
            status: UnitStatus::Done,
            rows,
            message: None,
        }
    }

    pub fn skipped(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            status: UnitStatus::Skipped,
            rows: 0,
            message: Some(message.into()),
        }
    }

    pub fn failed(unit: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            unit: unit.into(),
            status: UnitStatus::Failed,
            rows: 0,
            message: Some(format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub run_id: i64,
    pub command: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub units_total: usize,
    pub units_succeeded: usize,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS build_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            command TEXT NOT NULL,
            units_total INTEGER NOT NULL,
            units_succeeded INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS unit_results (
            run_id INTEGER NOT NULL REFERENCES build_runs(run_id),
            unit TEXT NOT NULL,
            status TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            message TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_unit_results_run ON unit_results(run_id);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn start_run(conn: &Connection, command: &str, units_total: usize) -> Result<i64> {
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO build_runs(started_at, finished_at, command, units_total, units_succeeded, errors_json)
         VALUES (?1, NULL, ?2, ?3, 0, '[]')",
        params![started_at, command, units_total as i64],
    )
    .context("insert build run")?;
    Ok(conn.last_insert_rowid())
}

pub fn record_unit(conn: &Connection, run_id: i64, unit: &UnitRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO unit_results(run_id, unit, status, row_count, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id,
            unit.unit,
            unit.status.as_str(),
            unit.rows as i64,
            unit.message
        ],
    )
    .context("insert unit result")?;
    Ok(())
}

/// Closes a run: every unit not marked failed counts as succeeded, and
/// failure messages are kept as a JSON list.
pub fn finish_run(conn: &Connection, run_id: i64, units: &[UnitRecord]) -> Result<()> {
    let finished_at = Utc::now().to_rfc3339();
    let succeeded = units
        .iter()
        .filter(|u| u.status != UnitStatus::Failed)
        .count();
    let errors: Vec<String> = units
        .iter()
        .filter(|u| u.status == UnitStatus::Failed)
        .map(|u| format!("{}: {}", u.unit, u.message.as_deref().unwrap_or("")))
        .collect();
    let errors_json = serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE build_runs
         SET finished_at = ?1, units_succeeded = ?2, errors_json = ?3
         WHERE run_id = ?4",
        params![finished_at, succeeded as i64, errors_json, run_id],
    )
    .context("update build run")?;
    Ok(())
}

/// Records a finished batch as one run with its unit rows.
pub fn record_batch(conn: &mut Connection, command: &str, units: &[UnitRecord]) -> Result<i64> {
    let tx = conn.transaction().context("begin run transaction")?;
    let run_id = start_run(&tx, command, units.len())?;
    for unit in units {
        record_unit(&tx, run_id, unit)?;
    }
    finish_run(&tx, run_id, units)?;
    tx.commit().context("commit run transaction")?;
    Ok(run_id)
}

pub fn load_run(conn: &Connection, run_id: i64) -> Result<Option<RunRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, command, started_at, finished_at, units_total, units_succeeded, errors_json
             FROM build_runs WHERE run_id = ?1",
        )
        .context("prepare run query")?;
    let mut rows = stmt
        .query_map(params![run_id], |row| {
            let errors_json: String = row.get(6)?;
            Ok(RunRow {
                run_id: row.get(0)?,
                command: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                units_total: row.get::<_, i64>(4)?.max(0) as usize,
                units_succeeded: row.get::<_, i64>(5)?.max(0) as usize,
                errors: serde_json::from_str(&errors_json).unwrap_or_default(),
            })
        })
        .context("query run")?;
    rows.next().transpose().context("decode run row")
}

pub fn load_units(conn: &Connection, run_id: i64) -> Result<Vec<UnitRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT unit, status, row_count, message FROM unit_results
             WHERE run_id = ?1 ORDER BY rowid",
        )
        .context("prepare unit query")?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .context("query units")?;

    let mut out = Vec::new();
    for row in rows {
        let (unit, status, count, message) = row.context("decode unit row")?;
        out.push(UnitRecord {
            unit,
            status: status.parse()?,
            rows: count.max(0) as usize,
            message,
        });
    }
    Ok(out)
}

/// Ends a command-line batch: stores the run in the ledger at `db_path`
/// (a ledger failure only warns), prints one line per unit and fails when
/// any unit failed.
pub fn finish_batch(db_path: &Path, command: &str, units: &[UnitRecord]) -> Result<()> {
    match open_db(db_path) {
        Ok(mut conn) => {
            if let Err(err) = record_batch(&mut conn, command, units) {
                warn!(error = %format!("{err:#}"), "failed to record run");
            }
        }
        Err(err) => warn!(error = %format!("{err:#}"), "run ledger unavailable"),
    }

    for unit in units {
        match unit.message.as_deref() {
            Some(message) => {
                println!("{} {}: rows={} {message}", unit.unit, unit.status, unit.rows)
            }
            None => println!("{} {}: rows={}", unit.unit, unit.status, unit.rows),
        }
    }
    let failed = units
        .iter()
        .filter(|u| u.status == UnitStatus::Failed)
        .count();
    if failed > 0 {
        return Err(anyhow!("{failed} of {} units failed", units.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_round_trips_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let run_id = start_run(&conn, "cfb_build", 2).unwrap();
        let units = vec![
            UnitRecord::done("2023 regular", 1500),
            UnitRecord::failed("2024 regular", &anyhow!("http 500")),
        ];
        for unit in &units {
            record_unit(&conn, run_id, unit).unwrap();
        }
        finish_run(&conn, run_id, &units).unwrap();

        let run = load_run(&conn, run_id).unwrap().unwrap();
        assert_eq!(run.command, "cfb_build");
        assert_eq!(run.units_total, 2);
        assert_eq!(run.units_succeeded, 1);
        assert_eq!(run.errors, vec!["2024 regular: http 500".to_string()]);
        assert!(run.finished_at.is_some());
        assert_eq!(load_units(&conn, run_id).unwrap(), units);
    }

    #[test]
    fn batch_is_recorded_in_one_go() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let units = vec![
            UnitRecord::skipped("2016 regular", "games table missing"),
            UnitRecord::done("2017 regular", 10),
        ];
        let run_id = record_batch(&mut conn, "cfb_backfill", &units).unwrap();
        let run = load_run(&conn, run_id).unwrap().unwrap();
        assert_eq!(run.units_succeeded, 2);
        assert!(run.errors.is_empty());
        assert_eq!(load_units(&conn, run_id).unwrap()[0].status, UnitStatus::Skipped);
        assert!(load_run(&conn, run_id + 1).unwrap().is_none());
    }
}
