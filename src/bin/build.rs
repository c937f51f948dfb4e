use anyhow::{Context, Result, anyhow};

use cfb_spreads::args::{cli_args, flag_value, has_flag, parse_season, parse_weeks, parse_years};
use cfb_spreads::assemble::{Assembler, BuildOutcome, Unit, run_batch};
use cfb_spreads::config::{AppConfig, load_dotenv};
use cfb_spreads::logging::init_tracing;
use cfb_spreads::run_log;
use cfb_spreads::table_store::TableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Team,
    Game,
    Weekly,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Team => "team",
            Level::Game => "game",
            Level::Weekly => "weekly",
        }
    }
}

fn main() -> Result<()> {
    load_dotenv();
    init_tracing("info")?;

    let args = cli_args();
    let years = parse_years(&args)?.context("--year is required (e.g. --year 2016-2024)")?;
    let season = parse_season(&args)?;
    let weeks = parse_weeks(&args)?;
    let complete = has_flag(&args, "--complete");
    let levels = parse_levels(flag_value(&args, "--level").as_deref(), weeks.is_some())?;

    let cfg = AppConfig::from_env();
    let store = TableStore::new(cfg.store_config())?;
    let assembler = Assembler::offline(store).with_convention(cfg.spread_convention);

    let mut records = Vec::new();
    for level in levels {
        let units = match level {
            Level::Weekly => Unit::expand(&years, weeks, season),
            Level::Team | Level::Game => Unit::expand(&years, None, season),
        };
        records.extend(run_batch(units, |unit| {
            let label = format!("{unit} {}", level.as_str());
            let outcome = match (level, unit.week) {
                (Level::Team, _) => assembler.build_team_level(unit.year, unit.season)?,
                (Level::Game, _) => {
                    assembler.build_game_level(unit.year, unit.season, complete)?
                }
                (Level::Weekly, Some(week)) => {
                    assembler.build_weekly(unit.year, week, unit.season)?
                }
                (Level::Weekly, None) => return Err(anyhow!("weekly build needs --weeks")),
            };
            if let BuildOutcome::Built { name, rows, columns } = &outcome {
                println!(
                    "{name}: {rows} rows x {columns} columns -> {}",
                    assembler.store().path_for(name).display()
                );
            }
            Ok(outcome.into_unit(label))
        }));
    }

    run_log::finish_batch(&cfg.run_log_path, "cfb_build", &records)
}

fn parse_levels(raw: Option<&str>, has_weeks: bool) -> Result<Vec<Level>> {
    let levels = match raw.unwrap_or("game") {
        "team" => vec![Level::Team],
        "game" => vec![Level::Game],
        "weekly" => vec![Level::Weekly],
        "all" if has_weeks => vec![Level::Team, Level::Game, Level::Weekly],
        "all" => vec![Level::Team, Level::Game],
        other => return Err(anyhow!("unknown --level {other:?} (team|game|weekly|all)")),
    };
    if levels.contains(&Level::Weekly) && !has_weeks {
        return Err(anyhow!("--level weekly needs --weeks START-END"));
    }
    Ok(levels)
}
