//! CSV input and output
//!
//! Reads fixture files and team tables, writes collected rows, and guards
//! in-place table updates against row-count drift.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::data::MatchRecord;

/// Errors that can occur while reading or writing tables
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Fixture file lacks two recognisable team columns
    #[error("Could not identify team columns in {0}")]
    MissingTeamColumns(PathBuf),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    /// A data row has cells beyond the header
    #[error("Row {row} has {cells} cells but the header has {columns} columns")]
    RowTooWide {
        row: usize,
        cells: usize,
        columns: usize,
    },

    /// Update produced a different number of rows than it read
    #[error("Row count mismatch: expected {expected}, got {actual}; original left untouched, update saved to {}", saved_to.display())]
    RowCountMismatch {
        expected: usize,
        actual: usize,
        saved_to: PathBuf,
    },
}

/// Row types with a fixed column set, written as the header even when no row is
pub trait CsvColumns {
    const COLUMNS: &'static [&'static str];
}

/// One output row: a played match, or an empty row for a team without data
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsRow {
    pub match_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub team_name: String,
    pub team_id: Option<String>,
    pub competition: Option<String>,
    pub round: Option<String>,
    pub venue: Option<String>,
    pub opponent: Option<String>,
    pub result: Option<String>,
    pub goals_for: Option<u32>,
    pub goals_against: Option<u32>,
    pub xg: Option<f64>,
    pub xga: Option<f64>,
    pub possession: Option<f64>,
    pub points: Option<u8>,
    pub processed_at: String,
}

impl CsvColumns for StatsRow {
    const COLUMNS: &'static [&'static str] = &[
        "match_id",
        "date",
        "team_name",
        "team_id",
        "competition",
        "round",
        "venue",
        "opponent",
        "result",
        "goals_for",
        "goals_against",
        "xg",
        "xga",
        "possession",
        "points",
        "processed_at",
    ];
}

impl StatsRow {
    pub fn from_record(record: &MatchRecord, processed_at: &str) -> Self {
        Self {
            match_id: Some(record.match_id.clone()),
            date: Some(record.date),
            team_name: record.team_name.clone(),
            team_id: Some(record.team_id.clone()),
            competition: record.competition.clone(),
            round: record.round.clone(),
            venue: record.venue.clone(),
            opponent: Some(record.opponent.clone()),
            result: Some(record.result.clone()),
            goals_for: record.goals_for,
            goals_against: record.goals_against,
            xg: record.xg,
            xga: record.xga,
            possession: record.possession,
            points: record.points,
            processed_at: processed_at.to_string(),
        }
    }

    /// Row carrying only the team name, for teams that produced no matches
    pub fn missing(team_name: &str, processed_at: &str) -> Self {
        Self {
            team_name: team_name.to_string(),
            processed_at: processed_at.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.match_id.is_none()
    }
}

/// An in-memory CSV file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Sets a cell, appending the column when it does not exist yet
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) {
        let index = match self.column(column) {
            Some(index) => index,
            None => {
                self.headers.push(column.to_string());
                self.headers.len() - 1
            }
        };
        let width = self.headers.len();
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() < width {
                cells.resize(width, String::new());
            }
            cells[index] = value.into();
        }
    }

    /// Pads every row to the header width
    fn normalise(&mut self) {
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
    }
}

/// Reads a CSV file with a header row
///
/// Short rows are padded; a row with more cells than headers is an error.
pub fn read_table(path: &Path) -> Result<Table, OutputError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > headers.len() {
            return Err(OutputError::RowTooWide {
                row: index + 1,
                cells: record.len(),
                columns: headers.len(),
            });
        }
        rows.push(record.iter().map(String::from).collect());
    }

    let mut table = Table { headers, rows };
    table.normalise();
    Ok(table)
}

/// Writes a table, backing up any existing file first when `backup` is set
pub fn write_table(path: &Path, table: &Table, backup: bool) -> Result<(), OutputError> {
    prepare_destination(path, backup)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Replaces `path` with `table` only if it still has `expected_rows` rows
///
/// On a mismatch the table is written next to the original as
/// `<stem>.unsaved.csv` and the original is not touched.
pub fn commit_table(
    path: &Path,
    expected_rows: usize,
    table: &Table,
    backup: bool,
) -> Result<PathBuf, OutputError> {
    if table.rows.len() != expected_rows {
        let saved_to = sibling(path, "unsaved.csv");
        write_table(&saved_to, table, false)?;
        warn!(
            "Row count mismatch ({} vs {}); {} NOT overwritten",
            table.rows.len(),
            expected_rows,
            path.display()
        );
        return Err(OutputError::RowCountMismatch {
            expected: expected_rows,
            actual: table.rows.len(),
            saved_to,
        });
    }

    write_table(path, table, backup)?;
    Ok(path.to_path_buf())
}

/// Serializes rows to CSV with a header taken from the row type
///
/// An empty slice still produces the header line.
pub fn write_rows<S: Serialize + CsvColumns>(
    path: &Path,
    rows: &[S],
    backup: bool,
) -> Result<(), OutputError> {
    prepare_destination(path, backup)?;
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(S::COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Saved {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Unique team names from a fixtures file, in first-seen order
///
/// Uses `home_team`/`away_team` when present, otherwise the first two columns
/// whose name contains "team".
pub fn fixture_teams(path: &Path) -> Result<Vec<String>, OutputError> {
    let table = read_table(path)?;

    let columns = match (table.column("home_team"), table.column("away_team")) {
        (Some(home), Some(away)) => [home, away],
        _ => {
            let team_columns: Vec<usize> = table
                .headers
                .iter()
                .enumerate()
                .filter(|(_, h)| h.to_lowercase().contains("team"))
                .map(|(i, _)| i)
                .collect();
            match team_columns.as_slice() {
                [first, second, ..] => [*first, *second],
                _ => return Err(OutputError::MissingTeamColumns(path.to_path_buf())),
            }
        }
    };

    let mut teams: Vec<String> = Vec::new();
    for column in columns {
        for row in 0..table.rows.len() {
            let Some(name) = table.get(row, column).map(str::trim) else {
                continue;
            };
            if !name.is_empty() && !teams.iter().any(|t| t == name) {
                teams.push(name.to_string());
            }
        }
    }
    Ok(teams)
}

/// Timestamp used in generated file names
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!("{}.{}", stem, suffix))
}

fn prepare_destination(path: &Path, backup: bool) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if backup && path.exists() {
        let backup_path = sibling(path, &format!("{}.bak.csv", file_timestamp()));
        fs::copy(path, &backup_path)?;
        info!("Backed up {} to {}", path.display(), backup_path.display());
    }
    Ok(())
}
