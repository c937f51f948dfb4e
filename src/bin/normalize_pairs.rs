use anyhow::{Context, Result};

use cfb_spreads::args::{cli_args, parse_season, parse_years};
use cfb_spreads::assemble::{Assembler, Unit, run_batch};
use cfb_spreads::config::{AppConfig, load_dotenv};
use cfb_spreads::logging::init_tracing;
use cfb_spreads::run_log::{self, UnitRecord};
use cfb_spreads::table_store::TableStore;

fn main() -> Result<()> {
    load_dotenv();
    init_tracing("info")?;

    let args = cli_args();
    let years = parse_years(&args)?.context("--year is required (e.g. --year 2016-2024)")?;
    let season = parse_season(&args)?;

    let cfg = AppConfig::from_env();
    let store = TableStore::new(cfg.store_config())?;
    let assembler = Assembler::offline(store);

    let records = run_batch(Unit::expand(&years, None, season), |unit| {
        let label = unit.to_string();
        let Some(report) = assembler.normalize_pairs(unit.year, unit.season)? else {
            return Ok(UnitRecord::skipped(label, "games table missing"));
        };
        println!("{label} basic: added {} placeholder rows", report.basic_added);
        println!("{label} advanced: added {} placeholder rows", report.advanced_added);
        Ok(UnitRecord::done(label, report.basic_added + report.advanced_added))
    });

    run_log::finish_batch(&cfg.run_log_path, "cfb_normalize_pairs", &records)
}
