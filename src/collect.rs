//! Collection runs
//!
//! Ties resolution, extraction, the JSON API and CSV output together for the
//! four run modes. Requests are awaited one at a time; a failure for one team
//! or one match is logged and leaves that team's cells empty.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::cache::{CacheManager, IdentityCache};
use crate::config::{Config, ConfigError};
use crate::data::{
    ApiError, FootballDataClient, League, MatchLogClient, MatchRecord, MatchResult, TeamIdentity,
    TeamMatchStatistics, TeamResolver,
};
use crate::fetch::{random_between, FetchError, Fetcher};
use crate::output::{
    commit_table, file_timestamp, fixture_teams, read_table, write_rows, OutputError, StatsRow,
};

/// Errors that end a collection run
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of a run that wrote a stats file
#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub output: PathBuf,
    pub records: Vec<MatchRecord>,
    /// Teams that produced no matches
    pub missing_teams: Vec<String>,
}

/// Console summary for a single team
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSummary {
    pub matches: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_for: u32,
    pub goals_against: u32,
}

impl TeamSummary {
    /// `None` for an empty record list
    pub fn from_records(records: &[MatchRecord]) -> Option<Self> {
        let first_date = records.iter().map(|r| r.date).min()?;
        let last_date = records.iter().map(|r| r.date).max()?;
        let count = |wanted| records.iter().filter(|r| r.outcome() == Some(wanted)).count();
        Some(Self {
            matches: records.len(),
            first_date,
            last_date,
            wins: count(MatchResult::Win),
            draws: count(MatchResult::Draw),
            losses: count(MatchResult::Loss),
            goals_for: records.iter().filter_map(|r| r.goals_for).sum(),
            goals_against: records.iter().filter_map(|r| r.goals_against).sum(),
        })
    }
}

impl fmt::Display for TeamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matches found: {}", self.matches)?;
        writeln!(f, "Date range: {} to {}", self.first_date, self.last_date)?;
        writeln!(f, "Record: {}W {}D {}L", self.wins, self.draws, self.losses)?;
        write!(f, "Goals: {}-{}", self.goals_for, self.goals_against)
    }
}

/// Column names added by a bulk update for `lookback` matches
pub fn update_columns(lookback: usize) -> Vec<String> {
    let mut columns: Vec<String> = (1..=lookback)
        .flat_map(|i| {
            TeamMatchStatistics::FIELDS
                .iter()
                .map(move |field| format!("Match {} {}", i, field))
        })
        .collect();
    columns.extend(
        ["GF", "GA", "W", "D", "L"]
            .iter()
            .map(|prefix| format!("{}_last{}", prefix, lookback)),
    );
    columns
}

/// Lower-cased file-name-safe form of a team name
pub fn team_slug(team_name: &str) -> String {
    let slug: String = team_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

/// Runs collections against one fetcher and one identity cache
pub struct StatsCollector {
    config: Config,
    fetcher: Arc<Fetcher>,
    resolver: TeamResolver,
    matches: MatchLogClient,
}

impl StatsCollector {
    /// Builds a collector with the real HTTP transport
    pub fn from_config(config: Config) -> Result<Self, CollectError> {
        let cache = CacheManager::with_dir(config.response_cache_dir());
        let mut fetcher = Fetcher::http(Some(cache), config.fetch_policy())?;
        if !config.use_cache {
            fetcher = fetcher.without_cache_reads();
        }
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn new(config: Config, fetcher: Arc<Fetcher>) -> Self {
        let identities = IdentityCache::load(config.site_mapping_path());
        let resolver = TeamResolver::new(fetcher.clone(), identities, config.site_base_url.clone());
        Self {
            matches: MatchLogClient::new(fetcher.clone()),
            resolver,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Recent played matches of one team, newest first
    ///
    /// Unknown teams and fetch failures are logged and give an empty list.
    pub async fn team_stats(
        &mut self,
        team_name: &str,
        league: Option<&League>,
        lookback: usize,
    ) -> Vec<MatchRecord> {
        let league_id = league.map(|l| l.site_id);
        let identity = match self.resolver.resolve(team_name, league_id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!("Team not found: {}", team_name);
                return Vec::new();
            }
            Err(e) => {
                error!("Error resolving {}: {}", team_name, e);
                return Vec::new();
            }
        };
        info!("Found team: {} (ID: {})", identity.display_name, identity.id);
        self.identity_stats(&identity, lookback).await
    }

    async fn identity_stats(&self, identity: &TeamIdentity, lookback: usize) -> Vec<MatchRecord> {
        match self.matches.recent_matches(identity, lookback).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error fetching matches for {}: {}", identity.display_name, e);
                Vec::new()
            }
        }
    }

    /// Collects every team named in a fixtures file
    ///
    /// Teams without data still get one row carrying only their name.
    pub async fn collect_fixtures(
        &mut self,
        input: &Path,
        output: Option<&Path>,
        lookback: usize,
    ) -> Result<CollectOutcome, CollectError> {
        let teams = fixture_teams(input)?;
        info!("Found {} unique teams in fixtures file", teams.len());

        let mut batches = Vec::with_capacity(teams.len());
        for (i, team_name) in teams.iter().enumerate() {
            if i > 0 {
                self.pause_between_teams().await;
            }
            info!("Processing team: {}", team_name);
            let records = self.team_stats(team_name, None, lookback).await;
            info!("Got {} matches for {}", records.len(), team_name);
            batches.push((team_name.clone(), records));
        }

        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output("team_stats"));
        self.write_batches(&output, batches)
    }

    /// Collects one team
    pub async fn collect_team(
        &mut self,
        team_name: &str,
        league: Option<&League>,
        output: Option<&Path>,
        lookback: usize,
    ) -> Result<CollectOutcome, CollectError> {
        let records = self.team_stats(team_name, league, lookback).await;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output(&format!("{}_stats", team_slug(team_name))));
        self.write_batches(&output, vec![(team_name.to_string(), records)])
    }

    /// Collects every club listed for a league
    pub async fn collect_league(
        &mut self,
        league: &League,
        output: Option<&Path>,
        lookback: usize,
    ) -> Result<CollectOutcome, CollectError> {
        let clubs = self.resolver.league_teams(league.site_id).await?;
        info!("Found {} clubs in {}", clubs.len(), league.name);

        let mut batches = Vec::with_capacity(clubs.len());
        for (i, club) in clubs.iter().enumerate() {
            if i > 0 {
                self.pause_between_teams().await;
            }
            info!("Processing team: {}", club.display_name);
            let records = self.identity_stats(club, lookback).await;
            batches.push((club.display_name.clone(), records));
        }

        let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
            self.default_output(&format!("{}_stats", team_slug(league.name)))
        });
        self.write_batches(&output, batches)
    }

    /// Writes per-team aggregates of `records`
    pub fn write_aggregate(&self, records: &[MatchRecord], path: &Path) -> Result<(), CollectError> {
        let aggregates = aggregate(records);
        write_rows(path, &aggregates, self.config.backup_outputs)?;
        info!("Saved aggregate statistics for {} teams", aggregates.len());
        Ok(())
    }

    /// Adds per-match API statistics and last-N summaries to a team table in place
    ///
    /// The file must have a `Team` column; `League` is optional and only its
    /// first comma-separated part is used. The file is replaced only when the
    /// updated table has as many rows as the original.
    pub async fn update_table(&mut self, path: &Path, lookback: usize) -> Result<PathBuf, CollectError> {
        let token = self.config.api_token.clone().ok_or(ApiError::MissingToken)?;
        let client = FootballDataClient::new(
            self.fetcher.clone(),
            self.config.api_base_url.clone(),
            Some(token),
        );

        let mut table = read_table(path)?;
        let expected_rows = table.rows.len();
        let team_column = table
            .column("Team")
            .ok_or_else(|| OutputError::MissingColumn("Team".to_string()))?;

        let leagues: BTreeSet<String> = match table.column("League") {
            Some(column) => (0..expected_rows)
                .filter_map(|row| table.get(row, column))
                .map(primary_league)
                .filter(|league| !league.is_empty())
                .collect(),
            None => BTreeSet::new(),
        };

        let mut identities = IdentityCache::load(self.config.api_mapping_path());
        for league in &leagues {
            let Some(code) = self.config.competition_code(league) else {
                warn!(
                    "No competition code for league '{}', team IDs will be missing",
                    league
                );
                continue;
            };
            match client.competition_teams(&code).await {
                Ok(teams) => {
                    for team in teams {
                        identities.insert(TeamResolver::bare_key(&team.display_name), team);
                    }
                }
                Err(e) => warn!("Error loading teams for {}: {}", league, e),
            }
        }
        if let Err(e) = identities.flush() {
            error!("Error saving API team mapping cache: {}", e);
        }

        let columns = update_columns(lookback);
        for row in 0..expected_rows {
            let team_name = table.get(row, team_column).unwrap_or_default().trim().to_string();
            let values = match lookup_api_team(&identities, &team_name) {
                Some(identity) => match api_row(&client, &identity, lookback).await {
                    Ok(values) => values,
                    Err(e) => {
                        warn!("Error fetching stats for '{}': {}", team_name, e);
                        vec![String::new(); columns.len()]
                    }
                },
                None => {
                    warn!("Team ID not found for '{}', leaving cells empty", team_name);
                    vec![String::new(); columns.len()]
                }
            };
            for (column, value) in columns.iter().zip(values) {
                table.set(row, column, value);
            }
        }

        let written = commit_table(path, expected_rows, &table, self.config.backup_outputs)?;
        info!("CSV updated for {} teams", expected_rows);
        Ok(written)
    }

    fn default_output(&self, stem: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}_{}.csv", stem, file_timestamp()))
    }

    fn write_batches(
        &self,
        output: &Path,
        batches: Vec<(String, Vec<MatchRecord>)>,
    ) -> Result<CollectOutcome, CollectError> {
        let processed_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut rows = Vec::new();
        let mut records = Vec::new();
        let mut missing_teams = Vec::new();

        for (team_name, team_records) in batches {
            if team_records.is_empty() {
                rows.push(StatsRow::missing(&team_name, &processed_at));
                missing_teams.push(team_name);
                continue;
            }
            rows.extend(
                team_records
                    .iter()
                    .map(|record| StatsRow::from_record(record, &processed_at)),
            );
            records.extend(team_records);
        }

        write_rows(output, &rows, self.config.backup_outputs)?;
        if !missing_teams.is_empty() {
            warn!("No matches for: {}", missing_teams.join(", "));
        }
        Ok(CollectOutcome {
            output: output.to_path_buf(),
            records,
            missing_teams,
        })
    }

    async fn pause_between_teams(&self) {
        let (low, high) = self.config.team_pause();
        let pause = random_between(low, high);
        if !pause.is_zero() {
            debug!("Pausing {:.2}s before next team", pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }
    }
}

/// First comma-separated part of a League cell
fn primary_league(cell: &str) -> String {
    cell.split(',').next().unwrap_or_default().trim().to_string()
}

/// Exact name first, then the first preloaded team (in key order) whose name contains it
fn lookup_api_team(identities: &IdentityCache, team_name: &str) -> Option<TeamIdentity> {
    if team_name.is_empty() {
        return None;
    }
    let key = TeamResolver::bare_key(team_name);
    identities.get(&key).cloned().or_else(|| {
        identities
            .iter()
            .find(|(_, identity)| identity.display_name.to_lowercase().contains(&key))
            .map(|(_, identity)| identity.clone())
    })
}

/// Cell values for one team, in `update_columns` order
///
/// Only a failed match list is an error; a failed statistics call leaves
/// that match's cells empty.
async fn api_row(
    client: &FootballDataClient,
    identity: &TeamIdentity,
    lookback: usize,
) -> Result<Vec<String>, ApiError> {
    let matches = client.last_matches(&identity.id, lookback).await?;

    let mut values = Vec::with_capacity(lookback * TeamMatchStatistics::FIELDS.len() + 5);
    for i in 0..lookback {
        match matches.get(i) {
            Some(api_match) => match client
                .match_statistics(api_match, &identity.display_name)
                .await
            {
                Ok(stats) => values.extend(stats.values()),
                Err(e) => {
                    warn!(
                        "Error fetching statistics of match {} for '{}': {}",
                        api_match.id, identity.display_name, e
                    );
                    values.extend(
                        std::iter::repeat(String::new()).take(TeamMatchStatistics::FIELDS.len()),
                    );
                }
            },
            None => values.extend(
                std::iter::repeat(String::new()).take(TeamMatchStatistics::FIELDS.len()),
            ),
        }
    }

    let (mut gf, mut ga, mut w, mut d, mut l) = (0u32, 0u32, 0u32, 0u32, 0u32);
    for outcome in matches
        .iter()
        .filter_map(|m| m.outcome_for(&identity.display_name))
    {
        gf += outcome.goals_for;
        ga += outcome.goals_against;
        match outcome.result {
            MatchResult::Win => w += 1,
            MatchResult::Draw => d += 1,
            MatchResult::Loss => l += 1,
        }
    }
    values.extend([gf, ga, w, d, l].iter().map(u32::to_string));
    Ok(values)
}
