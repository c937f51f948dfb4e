use anyhow::{Context, Result, anyhow};

use cfb_spreads::args::{cli_args, flag_value, has_flag, parse_season, parse_weeks, parse_years};
use cfb_spreads::assemble::{Assembler, Unit, run_batch};
use cfb_spreads::config::{AppConfig, load_dotenv};
use cfb_spreads::logging::init_tracing;
use cfb_spreads::run_log::{self, UnitRecord};
use cfb_spreads::table_store::TableStore;

const KINDS: &[&str] = &["games", "basic", "advanced", "lines"];

fn main() -> Result<()> {
    load_dotenv();
    init_tracing("info")?;

    let args = cli_args();
    let years = parse_years(&args)?.context("--year is required (e.g. --year 2023 2024)")?;
    let season = parse_season(&args)?;
    let weeks = parse_weeks(&args)?;
    let with_lines = !has_flag(&args, "--no-lines");
    let kinds = parse_kinds(&args)?;

    let cfg = AppConfig::from_env();
    let store = TableStore::new(cfg.store_config())?;
    let assembler = Assembler::new(cfg.provider()?, store)
        .with_pause(cfg.fetch_pause)
        .with_convention(cfg.spread_convention);

    let units = Unit::expand(&years, weeks, season);
    let records = run_batch(units, |unit| {
        let label = unit.to_string();
        if let Some(week) = unit.week {
            let fetched = assembler.fetch_week(unit.year, week, unit.season, with_lines)?;
            return Ok(UnitRecord::done(label, fetched.total_rows()));
        }
        let mut rows = 0usize;
        for kind in &kinds {
            let table = match *kind {
                "games" => assembler.fetch_games(unit.year, unit.season)?,
                "basic" => assembler.fetch_basic(unit.year, unit.season)?,
                "advanced" => assembler.fetch_advanced(unit.year, unit.season)?,
                "lines" if with_lines => assembler.fetch_lines(unit.year, unit.season)?,
                _ => continue,
            };
            println!("{label} {kind}: {} rows", table.len());
            rows += table.len();
        }
        Ok(UnitRecord::done(label, rows))
    });

    run_log::finish_batch(&cfg.run_log_path, "cfb_fetch", &records)
}

fn parse_kinds(args: &[String]) -> Result<Vec<&'static str>> {
    let Some(raw) = flag_value(args, "--kind") else {
        return Ok(KINDS.to_vec());
    };
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part == "all" {
            return Ok(KINDS.to_vec());
        }
        let Some(kind) = KINDS.iter().find(|k| **k == part) else {
            return Err(anyhow!("unknown --kind {part:?}, expected one of {KINDS:?}"));
        };
        out.push(*kind);
    }
    Ok(out)
}
