//! Per-team aggregate statistics over extracted match records

use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::{MatchRecord, MatchResult};
use crate::output::CsvColumns;

/// Totals and averages for one team
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamAggregate {
    pub team_name: String,
    pub matches_played: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub points: u32,
    pub goals_for_total: u32,
    pub goals_against_total: u32,
    pub goal_diff: i64,
    pub avg_goals_for: Option<f64>,
    pub avg_goals_against: Option<f64>,
    pub avg_xg: Option<f64>,
    pub avg_xga: Option<f64>,
    pub avg_possession: Option<f64>,
}

impl CsvColumns for TeamAggregate {
    const COLUMNS: &'static [&'static str] = &[
        "team_name",
        "matches_played",
        "wins",
        "draws",
        "losses",
        "points",
        "goals_for_total",
        "goals_against_total",
        "goal_diff",
        "avg_goals_for",
        "avg_goals_against",
        "avg_xg",
        "avg_xga",
        "avg_possession",
    ];
}

/// Groups records by team name and summarises each group
///
/// Teams come back sorted by name. Averages only count records that carry the
/// value and are `None` when no record does.
pub fn aggregate(records: &[MatchRecord]) -> Vec<TeamAggregate> {
    let mut groups: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.team_name.as_str()).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(team_name, matches)| summarise(team_name, &matches))
        .collect()
}

fn summarise(team_name: &str, matches: &[&MatchRecord]) -> TeamAggregate {
    let count = |wanted: MatchResult| {
        matches
            .iter()
            .filter(|m| m.outcome() == Some(wanted))
            .count()
    };
    let goals_for_total: u32 = matches.iter().filter_map(|m| m.goals_for).sum();
    let goals_against_total: u32 = matches.iter().filter_map(|m| m.goals_against).sum();

    TeamAggregate {
        team_name: team_name.to_string(),
        matches_played: matches.len(),
        wins: count(MatchResult::Win),
        draws: count(MatchResult::Draw),
        losses: count(MatchResult::Loss),
        points: matches.iter().filter_map(|m| m.points).map(u32::from).sum(),
        goals_for_total,
        goals_against_total,
        goal_diff: i64::from(goals_for_total) - i64::from(goals_against_total),
        avg_goals_for: mean(matches.iter().filter_map(|m| m.goals_for.map(f64::from))),
        avg_goals_against: mean(matches.iter().filter_map(|m| m.goals_against.map(f64::from))),
        avg_xg: mean(matches.iter().filter_map(|m| m.xg)),
        avg_xga: mean(matches.iter().filter_map(|m| m.xga)),
        avg_possession: mean(matches.iter().filter_map(|m| m.possession)),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
