use anyhow::{Context, Result, anyhow};

use crate::games::SeasonType;

pub fn cli_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Value of `--name=value` or `--name value`; blank values are ignored.
pub fn flag_value(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.starts_with("--")
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

pub fn parse_u32_arg(args: &[String], name: &str) -> Result<Option<u32>> {
    flag_value(args, name)
        .map(|raw| {
            raw.parse::<u32>()
                .with_context(|| format!("{name} expects a non-negative integer, got {raw:?}"))
        })
        .transpose()
}

/// Years from `--year 2023 2024`, `--year=2023,2024` or `--year 2016-2024`.
pub fn parse_years(args: &[String]) -> Result<Option<Vec<u32>>> {
    let mut raw: Vec<&str> = Vec::new();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix("--year=") {
            raw.push(v);
        }
        if arg == "--year" {
            raw.extend(
                args[idx + 1..]
                    .iter()
                    .take_while(|a| !a.starts_with("--"))
                    .map(String::as_str),
            );
        }
    }

    let mut years = Vec::new();
    for token in raw.iter().flat_map(|r| r.split([',', ' '])) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((start, end)) = token.split_once('-') {
            let (start, end) = (parse_year(start)?, parse_year(end)?);
            if start > end {
                return Err(anyhow!("year range {token} is reversed"));
            }
            years.extend(start..=end);
        } else {
            years.push(parse_year(token)?);
        }
    }
    let mut seen = std::collections::HashSet::new();
    years.retain(|y| seen.insert(*y));
    Ok((!years.is_empty()).then_some(years))
}

fn parse_year(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .with_context(|| format!("invalid year {raw:?}"))
}

pub fn parse_season(args: &[String]) -> Result<SeasonType> {
    flag_value(args, "--season")
        .map(|raw| raw.parse::<SeasonType>())
        .transpose()
        .map(|season| season.unwrap_or(SeasonType::Regular))
}

/// Inclusive week range from `--weeks 1-5`, or `--start-week` /
/// `--end-week` (a lone start week means just that week).
pub fn parse_weeks(args: &[String]) -> Result<Option<(u32, u32)>> {
    if let Some(raw) = flag_value(args, "--weeks") {
        let (start, end) = match raw.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (raw.as_str(), raw.as_str()),
        };
        let start = start
            .parse::<u32>()
            .with_context(|| format!("invalid week range {raw:?}"))?;
        let end = end
            .parse::<u32>()
            .with_context(|| format!("invalid week range {raw:?}"))?;
        return week_range(start, end).map(Some);
    }
    let start = parse_u32_arg(args, "--start-week")?;
    let end = parse_u32_arg(args, "--end-week")?;
    match (start, end) {
        (Some(s), Some(e)) => week_range(s, e).map(Some),
        (Some(s), None) => Ok(Some((s, s))),
        (None, Some(e)) => week_range(1, e).map(Some),
        (None, None) => Ok(None),
    }
}

fn week_range(start: u32, end: u32) -> Result<(u32, u32)> {
    if start == 0 || start > end {
        return Err(anyhow!("invalid week range {start}-{end}"));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn years_accept_lists_and_ranges() {
        let a = args(&["--year", "2022", "2023", "--season", "postseason"]);
        assert_eq!(parse_years(&a).unwrap(), Some(vec![2022, 2023]));
        assert_eq!(parse_season(&a).unwrap(), SeasonType::Postseason);

        let a = args(&["--year=2016-2018,2018"]);
        assert_eq!(parse_years(&a).unwrap(), Some(vec![2016, 2017, 2018]));
        assert_eq!(parse_years(&args(&[])).unwrap(), None);
        assert!(parse_years(&args(&["--year", "20x1"])).is_err());
    }

    #[test]
    fn weeks_accept_range_or_bounds() {
        assert_eq!(parse_weeks(&args(&["--weeks", "3-5"])).unwrap(), Some((3, 5)));
        assert_eq!(parse_weeks(&args(&["--start-week", "4"])).unwrap(), Some((4, 4)));
        assert_eq!(parse_weeks(&args(&["--end-week=2"])).unwrap(), Some((1, 2)));
        assert!(parse_weeks(&args(&["--weeks", "5-3"])).is_err());
        assert_eq!(parse_weeks(&args(&[])).unwrap(), None);
    }

    #[test]
    fn default_season_is_regular() {
        assert_eq!(parse_season(&args(&["--no-lines"])).unwrap(), SeasonType::Regular);
        assert!(has_flag(&args(&["--no-lines"]), "--no-lines"));
    }
}
