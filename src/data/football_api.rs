//! football-data.org REST API client
//!
//! Provides competition team lists, finished matches per team and per-match
//! statistics. Requests go through the shared [`Fetcher`] with the account
//! token in the `X-Auth-Token` header.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{MatchResult, TeamIdentity};
use crate::fetch::{FetchError, FetchRequest, Fetcher};

/// Default base URL for the API
pub const DEFAULT_API_BASE_URL: &str = "https://api.football-data.org/v4";

/// Header carrying the account token
const AUTH_HEADER: &str = "X-Auth-Token";

/// Errors that can occur when talking to the API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request itself failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// No token was configured
    #[error("No API token configured; set FOOTBALL_API_KEY")]
    MissingToken,
}

#[derive(Debug, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<ApiTeam>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: u64,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

/// One side of a match
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamRef {
    pub id: Option<u64>,
    pub name: Option<String>,
}

/// Home/away goals pair
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreLine {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    #[serde(default)]
    pub full_time: ScoreLine,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchLinks {
    #[serde(rename = "self")]
    pub self_link: Option<Link>,
}

/// A finished match as listed by the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMatch {
    pub id: u64,
    pub utc_date: DateTime<Utc>,
    #[serde(default)]
    pub home_team: TeamRef,
    #[serde(default)]
    pub away_team: TeamRef,
    #[serde(default)]
    pub score: Score,
    #[serde(rename = "_links", default)]
    pub links: Option<MatchLinks>,
}

/// Goals and result of a match from one team's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamOutcome {
    pub goals_for: u32,
    pub goals_against: u32,
    pub result: MatchResult,
}

impl ApiMatch {
    fn is_home(&self, team_name: &str) -> bool {
        self.home_team.name.as_deref() == Some(team_name)
    }

    fn is_away(&self, team_name: &str) -> bool {
        self.away_team.name.as_deref() == Some(team_name)
    }

    /// Full-time outcome for `team_name`
    ///
    /// `None` when the team played neither side under that name or the score
    /// is incomplete.
    pub fn outcome_for(&self, team_name: &str) -> Option<TeamOutcome> {
        let home = self.score.full_time.home?;
        let away = self.score.full_time.away?;
        let (goals_for, goals_against) = if self.is_home(team_name) {
            (home, away)
        } else if self.is_away(team_name) {
            (away, home)
        } else {
            return None;
        };
        Some(TeamOutcome {
            goals_for,
            goals_against,
            result: MatchResult::from_score(goals_for, goals_against),
        })
    }
}

/// Statistics block for one side of a match
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMatchStatistics {
    pub goals_for: Option<i64>,
    pub goals_against: Option<i64>,
    pub shots_total: Option<i64>,
    pub shots_on_target: Option<i64>,
    pub possession: Option<f64>,
}

impl TeamMatchStatistics {
    /// Column labels, in the order of [`TeamMatchStatistics::values`]
    pub const FIELDS: [&'static str; 5] = [
        "Goals for",
        "Goals against",
        "Total shots",
        "Shots on target",
        "Possession (%)",
    ];

    /// Values as CSV cells; absent values are empty
    pub fn values(&self) -> [String; 5] {
        fn cell<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }
        [
            cell(self.goals_for),
            cell(self.goals_against),
            cell(self.shots_total),
            cell(self.shots_on_target),
            cell(self.possession),
        ]
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsResponse {
    home_statistics: Option<TeamMatchStatistics>,
    away_statistics: Option<TeamMatchStatistics>,
}

/// Client for the football-data.org API
#[derive(Clone)]
pub struct FootballDataClient {
    fetcher: Arc<Fetcher>,
    base_url: String,
    token: Option<String>,
}

impl FootballDataClient {
    pub fn new(fetcher: Arc<Fetcher>, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        let request = FetchRequest::new(url).header(AUTH_HEADER, token);
        let text = self.fetcher.fetch_with(&request).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Teams of a competition as identities keyed by API team id
    pub async fn competition_teams(&self, code: &str) -> Result<Vec<TeamIdentity>, ApiError> {
        let url = format!("{}/competitions/{}/teams", self.base_url, code);
        let response: TeamsResponse = self.get_json(&url).await?;

        let teams: Vec<TeamIdentity> = response
            .teams
            .into_iter()
            .filter_map(|team| {
                let name = team.name?;
                Some(TeamIdentity {
                    id: team.id.to_string(),
                    display_name: name,
                    source_url: format!("{}/teams/{}", self.base_url, team.id),
                })
            })
            .collect();

        info!("Loaded {} teams for competition {}", teams.len(), code);
        Ok(teams)
    }

    /// Up to `limit` finished matches for a team, newest first
    pub async fn last_matches(&self, team_id: &str, limit: usize) -> Result<Vec<ApiMatch>, ApiError> {
        let url = format!(
            "{}/teams/{}/matches?status=FINISHED&limit={}",
            self.base_url, team_id, limit
        );
        let response: MatchesResponse = self.get_json(&url).await?;

        let mut matches = response.matches;
        matches.sort_by(|a, b| b.utc_date.cmp(&a.utc_date));
        matches.truncate(limit);
        debug!("Fetched {} finished matches for team {}", matches.len(), team_id);
        Ok(matches)
    }

    /// Statistics for `team_name`'s side of a match
    ///
    /// The home block is used when `team_name` is the home team, otherwise the
    /// away block.
    pub async fn match_statistics(
        &self,
        api_match: &ApiMatch,
        team_name: &str,
    ) -> Result<TeamMatchStatistics, ApiError> {
        let response: StatisticsResponse = self.get_json(&self.statistics_url(api_match)).await?;

        let side = if api_match.is_home(team_name) {
            response.home_statistics
        } else {
            response.away_statistics
        };
        Ok(side.unwrap_or_default())
    }

    fn statistics_url(&self, api_match: &ApiMatch) -> String {
        match api_match.links.as_ref().and_then(|l| l.self_link.as_ref()) {
            Some(link) => format!("{}/statistics", link.href.trim_end_matches('/')),
            None => format!("{}/matches/{}/statistics", self.base_url, api_match.id),
        }
    }
}
