//! Command-line interface parsing for matchstats
//!
//! This module handles parsing of CLI arguments using clap. Exactly one mode
//! flag (`--input`, `--team`, `--league` or `--update`) selects what to collect.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use thiserror::Error;

use crate::data::league::league_names;
use crate::data::{find_league, League};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The league name is not in the catalogue
    #[error("Unknown league: '{0}'. Available leagues: {names}", names = league_names())]
    UnknownLeague(String),

    /// No mode flag was given
    #[error("One of --input, --team, --league or --update is required")]
    MissingMode,

    /// A lookback of zero would collect nothing
    #[error("Lookback must be at least 1")]
    ZeroLookback,
}

/// matchstats - collect football team statistics into CSV files
#[derive(Parser, Debug)]
#[command(name = "matchstats")]
#[command(about = "Collect recent football match statistics into CSV files")]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true)))]
pub struct Cli {
    /// Fixtures CSV whose teams should be collected
    #[arg(long, value_name = "CSV", group = "mode")]
    pub input: Option<PathBuf>,

    /// Collect a single team
    #[arg(long, value_name = "NAME", group = "mode")]
    pub team: Option<String>,

    /// Collect every club of a league
    #[arg(long, value_name = "NAME", group = "mode")]
    pub league: Option<String>,

    /// Add per-match API statistics to a team CSV (columns Team, League)
    #[arg(long, value_name = "CSV", group = "mode")]
    pub update: Option<PathBuf>,

    /// Output CSV file (defaults to a timestamped file in the output directory)
    #[arg(long, value_name = "CSV")]
    pub output: Option<PathBuf>,

    /// Number of recent matches per team
    #[arg(long, default_value_t = 7)]
    pub lookback: usize,

    /// League of the team given with --team, to narrow the lookup
    #[arg(long = "league-name", value_name = "NAME")]
    pub league_name: Option<String>,

    /// Also write per-team aggregate statistics to this CSV
    #[arg(long, value_name = "CSV")]
    pub aggregate: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore cached responses (fresh responses are still cached)
    #[arg(long)]
    pub no_cache: bool,

    /// Overwrite existing output files without a timestamped backup
    #[arg(long)]
    pub no_backup: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

/// What the run should collect
#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// All teams of a fixtures file
    Fixtures(PathBuf),
    /// One team, optionally scoped to a league
    Team {
        name: String,
        league: Option<&'static League>,
    },
    /// All clubs of a league
    League(&'static League),
    /// API bulk update of a team table
    Update(PathBuf),
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, PartialEq)]
pub struct StartupConfig {
    pub mode: RunMode,
    pub output: Option<PathBuf>,
    pub aggregate_output: Option<PathBuf>,
    pub lookback: usize,
}

/// Parses a league name argument into a catalogue entry.
///
/// # Returns
/// * `Ok(&League)` if the name matches a known league
/// * `Err(CliError::UnknownLeague)` if it doesn't
pub fn parse_league_arg(s: &str) -> Result<&'static League, CliError> {
    find_league(s).ok_or_else(|| CliError::UnknownLeague(s.to_string()))
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// An unknown `--league-name` next to `--team` is not an error; the team
    /// is then looked up without a league. An unknown `--league` is.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.lookback == 0 {
            return Err(CliError::ZeroLookback);
        }

        let mode = match (&cli.input, &cli.team, &cli.league, &cli.update) {
            (Some(input), ..) => RunMode::Fixtures(input.clone()),
            (_, Some(name), ..) => RunMode::Team {
                name: name.clone(),
                league: cli.league_name.as_deref().and_then(find_league),
            },
            (_, _, Some(league), _) => RunMode::League(parse_league_arg(league)?),
            (_, _, _, Some(update)) => RunMode::Update(update.clone()),
            _ => return Err(CliError::MissingMode),
        };

        Ok(StartupConfig {
            mode,
            output: cli.output.clone(),
            aggregate_output: cli.aggregate.clone(),
            lookback: cli.lookback,
        })
    }
}
