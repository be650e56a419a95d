//! Core data models for matchstats
//!
//! This module contains the types shared by the providers: resolved team
//! identities, normalized match records and the static league catalogue.

pub mod football_api;
pub mod league;
pub mod matches;
pub mod resolver;

pub use football_api::{ApiError, ApiMatch, FootballDataClient, TeamMatchStatistics};
pub use league::{all_leagues, find_league, League};
pub use matches::{parse_match_log, MatchLogClient};
pub use resolver::TeamResolver;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A team as known to one provider
///
/// Created by a resolver and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamIdentity {
    /// Provider-specific opaque identifier
    pub id: String,
    /// Name as the provider displays it
    pub display_name: String,
    /// Absolute URL of the team's page or API resource
    pub source_url: String,
}

/// Outcome of a match from one team's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    /// Parses the single-letter result code (`W`, `D`, `L`)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "W" => Some(MatchResult::Win),
            "D" => Some(MatchResult::Draw),
            "L" => Some(MatchResult::Loss),
            _ => None,
        }
    }

    /// Compares two scores from the first team's side
    pub fn from_score(goals_for: u32, goals_against: u32) -> Self {
        match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => MatchResult::Win,
            std::cmp::Ordering::Equal => MatchResult::Draw,
            std::cmp::Ordering::Less => MatchResult::Loss,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MatchResult::Win => "W",
            MatchResult::Draw => "D",
            MatchResult::Loss => "L",
        }
    }

    /// League points: 3 for a win, 1 for a draw, 0 for a loss
    pub fn points(&self) -> u8 {
        match self {
            MatchResult::Win => 3,
            MatchResult::Draw => 1,
            MatchResult::Loss => 0,
        }
    }
}

/// Points for a raw result code; `None` for anything but `W`, `D` or `L`
pub fn points_for_code(code: &str) -> Option<u8> {
    MatchResult::from_code(code).map(|r| r.points())
}

/// One team's view of one played match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// `{YYYYMMDD}_{team_id}_{opponent without spaces}`
    ///
    /// Two meetings with the same opponent on the same day share an id.
    pub match_id: String,
    pub team_id: String,
    pub team_name: String,
    pub date: NaiveDate,
    pub competition: Option<String>,
    pub round: Option<String>,
    pub venue: Option<String>,
    pub opponent: String,
    /// Raw result code as published
    pub result: String,
    pub goals_for: Option<u32>,
    pub goals_against: Option<u32>,
    /// Expected goals
    pub xg: Option<f64>,
    /// Expected goals against
    pub xga: Option<f64>,
    /// Possession percentage
    pub possession: Option<f64>,
    pub points: Option<u8>,
}

impl MatchRecord {
    /// Builds the synthetic match identifier
    pub fn synthetic_id(date: NaiveDate, team_id: &str, opponent: &str) -> String {
        format!(
            "{}_{}_{}",
            date.format("%Y%m%d"),
            team_id,
            opponent.replace(' ', "")
        )
    }

    pub fn outcome(&self) -> Option<MatchResult> {
        MatchResult::from_code(&self.result)
    }
}

/// Errors raised while reading a provider page
#[derive(Debug, Error)]
pub enum ParseError {
    /// No table carried the expected header columns
    #[error("No table with columns {0} found")]
    MissingTable(String),

    /// A required column is absent from the chosen table
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A date cell could not be parsed
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// A CSS selector failed to compile
    #[error("Invalid selector: {0}")]
    Selector(String),
}

/// Compiles a CSS selector, mapping failures into [`ParseError`]
pub(crate) fn selector(css: &str) -> Result<scraper::Selector, ParseError> {
    scraper::Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {:?}", css, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_for_result_codes() {
        assert_eq!(points_for_code("W"), Some(3));
        assert_eq!(points_for_code("D"), Some(1));
        assert_eq!(points_for_code("L"), Some(0));
    }

    #[test]
    fn test_points_for_unknown_codes_are_absent() {
        assert_eq!(points_for_code(""), None);
        assert_eq!(points_for_code("w"), None);
        assert_eq!(points_for_code("nan"), None);
        assert_eq!(points_for_code("Postponed"), None);
    }

    #[test]
    fn test_result_from_score() {
        assert_eq!(MatchResult::from_score(2, 1), MatchResult::Win);
        assert_eq!(MatchResult::from_score(1, 1), MatchResult::Draw);
        assert_eq!(MatchResult::from_score(0, 3), MatchResult::Loss);
    }

    #[test]
    fn test_synthetic_id_strips_opponent_spaces() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            MatchRecord::synthetic_id(date, "822bd0ba", "Manchester City"),
            "20240309_822bd0ba_ManchesterCity"
        );
    }

    #[test]
    fn test_identity_json_shape() {
        let identity = TeamIdentity {
            id: "822bd0ba".to_string(),
            display_name: "Liverpool".to_string(),
            source_url: "https://fbref.com/en/squads/822bd0ba/Liverpool-Stats".to_string(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["id"], "822bd0ba");
        assert_eq!(json["display_name"], "Liverpool");
    }
}
