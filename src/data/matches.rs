//! Match log extraction
//!
//! Fetches a team's all-competitions schedule page and reduces the match
//! table to [`MatchRecord`]s. The page may hold several tables; the first one
//! whose header has both `Date` and `Comp` is used.

use std::sync::Arc;

use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use tracing::{debug, error, info};

use super::{points_for_code, selector, MatchRecord, ParseError, TeamIdentity};
use crate::fetch::{FetchError, Fetcher};

/// Date formats accepted in the Date column, tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Row classes the site uses for repeated headers and spacers
const SEPARATOR_CLASSES: [&str; 3] = ["thead", "spacer", "over_header"];

/// Client for a team's recent matches
#[derive(Clone)]
pub struct MatchLogClient {
    fetcher: Arc<Fetcher>,
}

impl MatchLogClient {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Schedule page for a resolved team
    pub fn match_log_url(identity: &TeamIdentity) -> String {
        identity
            .source_url
            .replace("/squads/", "/matchlogs/all_comps/schedule/")
    }

    /// Fetches up to `limit` of the team's most recent played matches, newest first
    ///
    /// A page that cannot be parsed is logged and yields an empty list; only
    /// fetch failures are returned as errors.
    pub async fn recent_matches(
        &self,
        identity: &TeamIdentity,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, FetchError> {
        let html = self.fetcher.fetch(&Self::match_log_url(identity)).await?;

        match parse_match_log(&html, identity) {
            Ok(records) => {
                let recent = most_recent(records, limit);
                info!(
                    "Extracted {} matches for {}",
                    recent.len(),
                    identity.display_name
                );
                Ok(recent)
            }
            Err(e) => {
                error!("Error parsing matches for {}: {}", identity.display_name, e);
                Ok(Vec::new())
            }
        }
    }
}

/// Sorts newest first and keeps at most `limit` records
pub fn most_recent(mut records: Vec<MatchRecord>, limit: usize) -> Vec<MatchRecord> {
    records.sort_by(|a, b| b.date.cmp(&a.date));
    records.truncate(limit);
    records
}

/// Column positions of the fields we keep
#[derive(Debug)]
struct Columns {
    date: usize,
    competition: usize,
    opponent: usize,
    round: Option<usize>,
    venue: Option<usize>,
    result: Option<usize>,
    goals_for: Option<usize>,
    goals_against: Option<usize>,
    xg: Option<usize>,
    xga: Option<usize>,
    possession: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &[String]) -> Result<Self, ParseError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require =
            |name: &str| find(name).ok_or_else(|| ParseError::MissingColumn(name.to_string()));

        Ok(Self {
            date: require("Date")?,
            competition: require("Comp")?,
            opponent: require("Opponent")?,
            round: find("Round"),
            venue: find("Venue"),
            result: find("Result"),
            goals_for: find("GF"),
            goals_against: find("GA"),
            xg: find("xG"),
            xga: find("xGA"),
            possession: find("Poss"),
        })
    }
}

/// Parses every played match in the first Date/Comp table of a schedule page
///
/// Records come back in page order.
pub fn parse_match_log(html: &str, identity: &TeamIdentity) -> Result<Vec<MatchRecord>, ParseError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table")?;
    let row_selector = selector("tr")?;
    let head_row_selector = selector("thead tr")?;
    let cell_selector = selector("th, td")?;

    let cells_of = |row: ElementRef<'_>| -> Vec<String> {
        row.select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect()
    };

    let mut chosen = None;
    for table in document.select(&table_selector) {
        let header_row = table
            .select(&head_row_selector)
            .last()
            .or_else(|| table.select(&row_selector).next());
        let Some(header_row) = header_row else {
            continue;
        };
        let headers = cells_of(header_row);
        if headers.iter().any(|h| h == "Date") && headers.iter().any(|h| h == "Comp") {
            chosen = Some((table, header_row, headers));
            break;
        }
    }

    let Some((table, header_row, headers)) = chosen else {
        return Err(ParseError::MissingTable("Date, Comp".to_string()));
    };
    let columns = Columns::from_headers(&headers)?;
    debug!("Match table headers: {:?}", headers);

    let mut records = Vec::new();
    for row in table.select(&row_selector) {
        if row.id() == header_row.id() || is_separator(row) || in_thead(row) {
            continue;
        }

        let cells = cells_of(row);
        let Some(date_text) = non_empty(&cells, Some(columns.date)) else {
            continue;
        };
        let date = parse_date(&date_text)?;

        let result = non_empty(&cells, columns.result).unwrap_or_default();
        if columns.result.is_some() && result.is_empty() {
            // Fixture not played yet
            continue;
        }

        let opponent = non_empty(&cells, Some(columns.opponent)).unwrap_or_default();
        records.push(MatchRecord {
            match_id: MatchRecord::synthetic_id(date, &identity.id, &opponent),
            team_id: identity.id.clone(),
            team_name: identity.display_name.clone(),
            date,
            competition: non_empty(&cells, Some(columns.competition)),
            round: non_empty(&cells, columns.round),
            venue: non_empty(&cells, columns.venue),
            opponent,
            points: points_for_code(&result),
            result,
            goals_for: non_empty(&cells, columns.goals_for).and_then(|v| parse_score(&v)),
            goals_against: non_empty(&cells, columns.goals_against).and_then(|v| parse_score(&v)),
            xg: non_empty(&cells, columns.xg).and_then(|v| parse_decimal(&v)),
            xga: non_empty(&cells, columns.xga).and_then(|v| parse_decimal(&v)),
            possession: non_empty(&cells, columns.possession).and_then(|v| parse_decimal(&v)),
        });
    }

    Ok(records)
}

fn is_separator(row: ElementRef<'_>) -> bool {
    row.value()
        .classes()
        .any(|class| SEPARATOR_CLASSES.contains(&class))
}

fn in_thead(row: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().name() == "thead")
}

fn non_empty(cells: &[String], index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| cells.get(i))
        .filter(|value| !value.is_empty())
        .cloned()
}

fn parse_date(text: &str) -> Result<NaiveDate, ParseError> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .ok_or_else(|| ParseError::InvalidDate(text.to_string()))
}

/// Leading integer of a score cell; `"2 (4)"` after penalties reads as 2
fn parse_score(text: &str) -> Option<u32> {
    text.split_whitespace().next()?.parse().ok()
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.trim_end_matches('%').trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::test_support::{quick_policy, MockTransport};
    use tempfile::TempDir;

    fn liverpool() -> TeamIdentity {
        TeamIdentity {
            id: "822bd0ba".to_string(),
            display_name: "Liverpool".to_string(),
            source_url: "https://fbref.com/en/squads/822bd0ba/Liverpool-Stats".to_string(),
        }
    }

    fn row(date: &str, comp: &str, result: &str, gf: &str, ga: &str, opponent: &str) -> String {
        format!(
            "<tr><th>{date}</th><td>{comp}</td><td>Matchweek</td><td>Home</td><td>{result}</td>\
             <td>{gf}</td><td>{ga}</td><td>{opponent}</td><td>1.8</td><td>0.7</td><td>61</td></tr>"
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body>
            <table id="summary"><thead><tr><th>Date</th><th>Opponent</th></tr></thead>
              <tbody><tr><td>2024-05-01</td><td>Ignored</td></tr></tbody></table>
            <table id="matchlogs_for">
              <thead>
                <tr class="over_header"><th colspan="11">Scores</th></tr>
                <tr><th>Date</th><th>Comp</th><th>Round</th><th>Venue</th><th>Result</th>
                    <th>GF</th><th>GA</th><th>Opponent</th><th>xG</th><th>xGA</th><th>Poss</th></tr>
              </thead>
              <tbody>{}</tbody>
            </table>
            </body></html>"#,
            rows.join("\n")
        )
    }

    #[test]
    fn test_first_table_with_date_and_comp_is_used() {
        let html = page(&[row("2024-03-10", "Premier League", "W", "2", "1", "Manchester City")]);

        let records = parse_match_log(&html, &liverpool()).expect("Should parse");

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.opponent, "Manchester City");
        assert_eq!(record.competition.as_deref(), Some("Premier League"));
        assert_eq!(record.venue.as_deref(), Some("Home"));
        assert_eq!(record.goals_for, Some(2));
        assert_eq!(record.goals_against, Some(1));
        assert_eq!(record.xg, Some(1.8));
        assert_eq!(record.xga, Some(0.7));
        assert_eq!(record.possession, Some(61.0));
        assert_eq!(record.points, Some(3));
        assert_eq!(record.match_id, "20240310_822bd0ba_ManchesterCity");
        assert_eq!(record.team_name, "Liverpool");
    }

    #[test]
    fn test_points_follow_result_codes() {
        let html = page(&[
            row("2024-03-01", "Premier League", "W", "1", "0", "A"),
            row("2024-03-02", "Premier League", "D", "1", "1", "B"),
            row("2024-03-03", "Premier League", "L", "0", "1", "C"),
            row("2024-03-04", "Premier League", "W-P", "1", "1", "D"),
        ]);

        let records = parse_match_log(&html, &liverpool()).expect("Should parse");
        let points: Vec<_> = records.iter().map(|r| r.points).collect();

        assert_eq!(points, vec![Some(3), Some(1), Some(0), None]);
    }

    #[test]
    fn test_unplayed_and_separator_rows_are_skipped() {
        let html = page(&[
            row("2024-03-01", "Premier League", "W", "3", "0", "Burnley"),
            "<tr class=\"spacer\"><th></th></tr>".to_string(),
            "<tr class=\"thead\"><th>Date</th><th>Comp</th></tr>".to_string(),
            row("2099-01-01", "Premier League", "", "", "", "Everton"),
        ]);

        let records = parse_match_log(&html, &liverpool()).expect("Should parse");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].opponent, "Burnley");
    }

    #[test]
    fn test_penalty_scores_take_leading_number() {
        let html = page(&[row("2024-02-25", "EFL Cup", "D", "1 (4)", "1 (3)", "Chelsea")]);

        let records = parse_match_log(&html, &liverpool()).expect("Should parse");

        assert_eq!(records[0].goals_for, Some(1));
        assert_eq!(records[0].goals_against, Some(1));
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        let html = "<html><body><table><tr><th>Player</th></tr></table></body></html>";

        let result = parse_match_log(html, &liverpool());

        assert!(matches!(result, Err(ParseError::MissingTable(_))));
    }

    #[test]
    fn test_invalid_date_is_parse_error() {
        let html = page(&[row("yesterday", "Premier League", "W", "1", "0", "A")]);

        let result = parse_match_log(&html, &liverpool());

        assert!(matches!(result, Err(ParseError::InvalidDate(_))));
    }

    #[test]
    fn test_most_recent_sorts_descending_and_truncates() {
        let rows: Vec<String> = (1..=10)
            .map(|day| row(&format!("2024-01-{:02}", day), "Premier League", "W", "1", "0", "X"))
            .collect();
        let records = parse_match_log(&page(&rows), &liverpool()).expect("Should parse");

        let recent = most_recent(records, 7);

        assert_eq!(recent.len(), 7);
        let days: Vec<_> = recent.iter().map(|r| r.date.format("%d").to_string()).collect();
        assert_eq!(days, vec!["10", "09", "08", "07", "06", "05", "04"]);
    }

    #[test]
    fn test_match_log_url() {
        assert_eq!(
            MatchLogClient::match_log_url(&liverpool()),
            "https://fbref.com/en/matchlogs/all_comps/schedule/822bd0ba/Liverpool-Stats"
        );
    }

    #[tokio::test]
    async fn test_recent_matches_parse_failure_yields_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(
            &MatchLogClient::match_log_url(&liverpool()),
            200,
            "<html><body>maintenance</body></html>",
        );
        let fetcher = Fetcher::new(
            Box::new(mock.clone()),
            Some(CacheManager::with_dir(temp_dir.path().to_path_buf())),
            quick_policy(),
        );
        let client = MatchLogClient::new(Arc::new(fetcher));

        let records = client
            .recent_matches(&liverpool(), 7)
            .await
            .expect("Parse failure is not an error");

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_recent_matches_limits_result() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let rows: Vec<String> = (1..=9)
            .map(|day| row(&format!("2024-02-{:02}", day), "Premier League", "L", "0", "2", "Y"))
            .collect();
        let mock = MockTransport::new();
        mock.respond(&MatchLogClient::match_log_url(&liverpool()), 200, &page(&rows));
        let fetcher = Fetcher::new(
            Box::new(mock.clone()),
            Some(CacheManager::with_dir(temp_dir.path().to_path_buf())),
            quick_policy(),
        );
        let client = MatchLogClient::new(Arc::new(fetcher));

        let records = client
            .recent_matches(&liverpool(), 7)
            .await
            .expect("Should fetch");

        assert_eq!(records.len(), 7);
        assert!(records.windows(2).all(|w| w[0].date >= w[1].date));
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 2, 9).unwrap());
    }
}
