//! matchstats - collect football team statistics into CSV files
//!
//! Resolves team names, extracts their recent matches and writes them out,
//! or adds per-match API statistics to an existing team table.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use matchstats::cli::{Cli, RunMode, StartupConfig};
use matchstats::collect::{StatsCollector, TeamSummary};
use matchstats::config::Config;
use matchstats::logging::init_logging;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let startup = match StartupConfig::from_cli(&cli) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.no_cache {
        config.use_cache = false;
    }
    if cli.no_backup {
        config.backup_outputs = false;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let _guard = init_logging(&config.log_dir, "matchstats", &config.log_level);
    info!("Starting matchstats with {:?}", startup.mode);

    let mut collector = StatsCollector::from_config(config)?;
    let lookback = startup.lookback;
    let output = startup.output.as_deref();

    let outcome = match startup.mode {
        RunMode::Fixtures(input) => collector.collect_fixtures(&input, output, lookback).await,
        RunMode::Team { name, league } => {
            let outcome = collector.collect_team(&name, league, output, lookback).await;
            if let Ok(ref outcome) = outcome {
                match TeamSummary::from_records(&outcome.records) {
                    Some(summary) => println!("\nSummary for {}:\n{}", name, summary),
                    None => println!("No statistics found for {}", name),
                }
            }
            outcome
        }
        RunMode::League(league) => collector.collect_league(league, output, lookback).await,
        RunMode::Update(csv) => {
            return match collector.update_table(&csv, lookback).await {
                Ok(path) => {
                    println!("Updated {}", path.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!("Update failed: {}", e);
                    eprintln!("Error: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            };
        }
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Collection failed: {}", e);
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    println!("Statistics saved to {}", outcome.output.display());

    if let Some(ref path) = startup.aggregate_output {
        collector.write_aggregate(&outcome.records, path)?;
        println!("Aggregate statistics saved to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}
