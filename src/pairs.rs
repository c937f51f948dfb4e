use std::collections::{HashMap, HashSet};

use crate::games::game_ids;
use crate::table::{Cell, KeyAtom, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

#[derive(Debug, Clone)]
struct SideSlot {
    game_id: Cell,
    team: Cell,
    side: Side,
    conference: Cell,
}

/// `(game_id, team)` slots implied by the games table, in game order, home
/// before away.
#[derive(Debug, Clone, Default)]
pub struct GameSides {
    slots: Vec<SideSlot>,
    index: HashMap<(KeyAtom, KeyAtom), usize>,
}

impl GameSides {
    pub fn from_games(games: &Table) -> Self {
        let mut sides = GameSides::default();
        for row in 0..games.len() {
            let game_id = games.get(row, "game_id").clone();
            if game_id.is_null() {
                continue;
            }
            for side in [Side::Home, Side::Away] {
                let team = games.get(row, &format!("{}_team", side.as_str())).clone();
                if team.is_null() {
                    continue;
                }
                let key = (game_id.key_atom(), team.key_atom());
                if sides.index.contains_key(&key) {
                    continue;
                }
                sides.index.insert(key, sides.slots.len());
                sides.slots.push(SideSlot {
                    game_id: game_id.clone(),
                    team,
                    side,
                    conference: games
                        .get(row, &format!("{}_conference", side.as_str()))
                        .clone(),
                });
            }
        }
        sides
    }

    pub fn side_of(&self, game_id: &Cell, team: &Cell) -> Option<Side> {
        self.index
            .get(&(game_id.key_atom(), team.key_atom()))
            .map(|&i| self.slots[i].side)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Drops stat rows whose `(game_id, team)` is not a home or away slot of
/// some game. Returns the pruned table and the number of rows removed.
pub fn prune_orphans(games: &Table, stats: Table) -> (Table, usize) {
    let sides = GameSides::from_games(games);
    let (Some(gid), Some(team)) = (stats.column_index("game_id"), stats.column_index("team"))
    else {
        return (stats, 0);
    };
    let before = stats.len();
    let mut stats = stats;
    stats.retain_rows(|row| sides.side_of(&row[gid], &row[team]).is_some());
    let removed = before - stats.len();
    (stats, removed)
}

/// Keeps only rows whose `game_id` belongs to the games table.
pub fn restrict_to_games(games: &Table, stats: Table) -> Table {
    let ids = game_ids(games);
    restrict_to_ids(&ids, stats)
}

pub fn restrict_to_ids(ids: &HashSet<i64>, mut stats: Table) -> Table {
    let Some(gid) = stats.column_index("game_id") else {
        return stats;
    };
    stats.retain_rows(|row| row[gid].as_i64().is_some_and(|id| ids.contains(&id)));
    stats
}

/// Seed columns for a basic stats table created from nothing.
pub const BASIC_SEED_COLUMNS: [&str; 3] = ["game_id", "team", "team_conference"];

/// Appends a null-valued placeholder row for every `(game_id, side-team)`
/// slot of `games` that has no row in `stats`, so each game ends up with a
/// row per side. A column-less `stats` starts from `seed_columns`.
/// `team_conference` is filled from the game when that column exists.
/// Returns the completed table and the number of rows added.
pub fn ensure_pairs(games: &Table, stats: &Table, seed_columns: &[&str]) -> (Table, usize) {
    let sides = GameSides::from_games(games);
    let mut out = if stats.width() == 0 {
        Table::new(seed_columns.iter().copied())
    } else {
        stats.clone()
    };
    let gid = out.add_column("game_id");
    let team = out.add_column("team");

    let existing: HashSet<(KeyAtom, KeyAtom)> = out
        .rows()
        .iter()
        .map(|row| (row[gid].key_atom(), row[team].key_atom()))
        .collect();

    let conference = out.column_index("team_conference");
    let mut added = 0usize;
    for slot in &sides.slots {
        let key = (slot.game_id.key_atom(), slot.team.key_atom());
        if existing.contains(&key) {
            continue;
        }
        let mut row = vec![Cell::Null; out.width()];
        row[gid] = slot.game_id.clone();
        row[team] = slot.team.clone();
        if let Some(idx) = conference {
            row[idx] = slot.conference.clone();
        }
        out.push_row(row);
        added += 1;
    }
    (out, added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn games() -> Table {
        let mut g = Table::new(["game_id", "home_team", "away_team"]);
        g.push_row(vec![1.into(), "A".into(), "B".into()]);
        g
    }

    #[test]
    fn orphans_are_pruned() {
        let mut stats = Table::new(["game_id", "team"]);
        stats.push_row(vec![1.into(), "A".into()]);
        stats.push_row(vec![1.into(), "Z".into()]);
        stats.push_row(vec![2.into(), "A".into()]);
        let (pruned, removed) = prune_orphans(&games(), stats);
        assert_eq!(removed, 2);
        assert_eq!(pruned.len(), 1);
    }

    #[test]
    fn empty_stats_get_both_slots() {
        let (filled, added) = ensure_pairs(&games(), &Table::default(), &BASIC_SEED_COLUMNS);
        assert_eq!(added, 2);
        assert_eq!(filled.columns(), &["game_id", "team", "team_conference"]);
    }

    #[test]
    fn empty_stats_without_conference_seed_stay_narrow() {
        let (filled, added) = ensure_pairs(&games(), &Table::default(), &["game_id", "team"]);
        assert_eq!(added, 2);
        assert_eq!(filled.columns(), &["game_id", "team"]);
        assert_eq!(filled.get(1, "team"), &Cell::from("B"));
    }
}
