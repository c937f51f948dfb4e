use anyhow::Result;

use cfb_spreads::args::{cli_args, has_flag, parse_season, parse_years};
use cfb_spreads::assemble::{Assembler, Unit, run_batch};
use cfb_spreads::config::{AppConfig, load_dotenv};
use cfb_spreads::logging::init_tracing;
use cfb_spreads::run_log;
use cfb_spreads::table_store::TableStore;

const DEFAULT_FIRST_YEAR: u32 = 2016;
const DEFAULT_LAST_YEAR: u32 = 2024;

fn main() -> Result<()> {
    load_dotenv();
    init_tracing("info")?;

    let args = cli_args();
    let years = parse_years(&args)?
        .unwrap_or_else(|| (DEFAULT_FIRST_YEAR..=DEFAULT_LAST_YEAR).collect());
    let season = parse_season(&args)?;
    let with_lines = !has_flag(&args, "--no-lines");

    let cfg = AppConfig::from_env();
    let store = TableStore::new(cfg.store_config())?;
    let assembler = Assembler::new(cfg.provider()?, store)
        .with_pause(cfg.fetch_pause)
        .with_convention(cfg.spread_convention);

    println!(
        "backfilling {} season(s) {}..={} ({season})",
        years.len(),
        years.first().copied().unwrap_or_default(),
        years.last().copied().unwrap_or_default()
    );
    let records = run_batch(Unit::expand(&years, None, season), |unit| {
        let outcome = assembler.backfill_year(unit.year, unit.season, with_lines)?;
        Ok(outcome.into_unit(unit.to_string()))
    });

    run_log::finish_batch(&cfg.run_log_path, "cfb_backfill", &records)
}
