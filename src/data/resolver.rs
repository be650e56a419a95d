//! Team name to site identity resolution
//!
//! Resolves a human team name to the site's squad identity. Results are kept
//! in an [`IdentityCache`] under either the bare lower-cased name or
//! `"{name}:{league}"`, and the cache is flushed after every new resolution.
//!
//! Both lookups pick the first candidate in document order. A partial name
//! such as "Real" therefore resolves to whichever club the page lists first.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};
use tracing::{debug, error, info, warn};

use super::{selector, ParseError, TeamIdentity};
use crate::cache::IdentityCache;
use crate::fetch::{FetchError, Fetcher};

static SQUAD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/squads/([a-f0-9]+)/").expect("squad id pattern is valid"));

/// Resolves team names against the HTML site
pub struct TeamResolver {
    fetcher: Arc<Fetcher>,
    cache: IdentityCache,
    base_url: String,
}

impl TeamResolver {
    /// `base_url` is the site root and must end with `/`
    pub fn new(fetcher: Arc<Fetcher>, cache: IdentityCache, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            cache,
            base_url: base_url.into(),
        }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Cache key for an unscoped lookup
    pub fn bare_key(team_name: &str) -> String {
        team_name.trim().to_lowercase()
    }

    /// Cache key for a lookup within one league
    pub fn scoped_key(team_name: &str, league_id: &str) -> String {
        format!("{}:{}", Self::bare_key(team_name), league_id)
    }

    /// Resolves `team_name`, optionally within the league with site id `league_id`
    ///
    /// Checks the scoped key, then the bare key, then the network.
    ///
    /// # Returns
    /// * `Ok(Some(identity))` when a candidate was found
    /// * `Ok(None)` when the site lists no matching team
    /// * `Err(FetchError)` when a page could not be fetched
    pub async fn resolve(
        &mut self,
        team_name: &str,
        league_id: Option<&str>,
    ) -> Result<Option<TeamIdentity>, FetchError> {
        if let Some(league_id) = league_id {
            if let Some(identity) = self.cache.get(&Self::scoped_key(team_name, league_id)) {
                debug!("Found {} in mapping cache for league {}", team_name, league_id);
                return Ok(Some(identity.clone()));
            }
        }
        if let Some(identity) = self.cache.get(&Self::bare_key(team_name)) {
            debug!("Found {} in mapping cache", team_name);
            return Ok(Some(identity.clone()));
        }

        match league_id {
            Some(league_id) => self.find_in_league(team_name, league_id).await,
            None => self.search(team_name).await,
        }
    }

    /// Lists every club in a league's club table, in page order
    pub async fn league_teams(&self, league_id: &str) -> Result<Vec<TeamIdentity>, FetchError> {
        let html = self.fetcher.fetch(&self.league_clubs_url(league_id)).await?;
        match club_links(&html, &self.base_url) {
            Ok(Some(links)) => {
                let mut seen = HashSet::new();
                Ok(links
                    .into_iter()
                    .filter(|identity| seen.insert(identity.id.clone()))
                    .collect())
            }
            Ok(None) => {
                warn!("No clubs table found for league {}", league_id);
                Ok(Vec::new())
            }
            Err(e) => {
                error!("Error parsing clubs for league {}: {}", league_id, e);
                Ok(Vec::new())
            }
        }
    }

    fn league_clubs_url(&self, league_id: &str) -> String {
        format!("{}comps/{}/clubs/", self.base_url, league_id)
    }

    async fn find_in_league(
        &mut self,
        team_name: &str,
        league_id: &str,
    ) -> Result<Option<TeamIdentity>, FetchError> {
        let html = self.fetcher.fetch(&self.league_clubs_url(league_id)).await?;

        let found = match club_links(&html, &self.base_url) {
            Ok(Some(links)) => first_name_match(links, team_name),
            Ok(None) => None,
            Err(e) => {
                error!("Error parsing clubs for league {}: {}", league_id, e);
                None
            }
        };

        match found {
            Some(identity) => {
                self.remember(Self::scoped_key(team_name, league_id), &identity);
                Ok(Some(identity))
            }
            None => {
                debug!(
                    "{} not listed for league {}, falling back to search",
                    team_name, league_id
                );
                self.search(team_name).await
            }
        }
    }

    async fn search(&mut self, team_name: &str) -> Result<Option<TeamIdentity>, FetchError> {
        let url = format!(
            "{}search/search.fcgi?search={}",
            self.base_url,
            urlencoding::encode(team_name.trim())
        );
        let html = self.fetcher.fetch(&url).await?;

        let first = match search_results(&html, &self.base_url) {
            Ok(results) => results.into_iter().next(),
            Err(e) => {
                error!("Error parsing search results for {}: {}", team_name, e);
                None
            }
        };

        match first {
            Some(identity) => {
                self.remember(Self::bare_key(team_name), &identity);
                Ok(Some(identity))
            }
            None => {
                warn!("No team matches found for '{}'", team_name);
                Ok(None)
            }
        }
    }

    fn remember(&mut self, key: String, identity: &TeamIdentity) {
        info!(
            "Resolved {} to {} ({})",
            key, identity.display_name, identity.id
        );
        if let Err(e) = self.cache.put(key, identity.clone()) {
            error!("Error saving team mapping cache: {}", e);
        }
    }
}

/// Extracts the squad id from a link such as `/en/squads/822bd0ba/Liverpool-Stats`
pub fn squad_id(href: &str) -> Option<String> {
    SQUAD_ID
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn absolute_url(base_url: &str, href: &str) -> String {
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

/// Turns a squad link into an identity; other links yield `None`
fn identity_from_link(link: ElementRef<'_>, base_url: &str) -> Option<TeamIdentity> {
    let href = link.value().attr("href")?;
    let id = squad_id(href)?;
    Some(TeamIdentity {
        id,
        display_name: link.text().collect::<String>().trim().to_string(),
        source_url: absolute_url(base_url, href),
    })
}

/// Squad links from the `table#clubs` element, or `None` if the page has no such table
pub fn club_links(html: &str, base_url: &str) -> Result<Option<Vec<TeamIdentity>>, ParseError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table#clubs")?;
    let link_selector = selector("a[href]")?;

    let Some(table) = document.select(&table_selector).next() else {
        return Ok(None);
    };

    Ok(Some(
        table
            .select(&link_selector)
            .filter_map(|link| identity_from_link(link, base_url))
            .collect(),
    ))
}

/// First identity whose display name contains `team_name`, ignoring case
pub fn first_name_match(candidates: Vec<TeamIdentity>, team_name: &str) -> Option<TeamIdentity> {
    let needle = team_name.trim().to_lowercase();
    candidates
        .into_iter()
        .find(|identity| identity.display_name.to_lowercase().contains(&needle))
}

/// Squad links from the "Teams" sections of a search results page, in page order
pub fn search_results(html: &str, base_url: &str) -> Result<Vec<TeamIdentity>, ParseError> {
    let document = Html::parse_document(html);
    let section_selector = selector("div.search-section")?;
    let link_selector = selector("a[href]")?;

    let mut results = Vec::new();
    for section in document.select(&section_selector) {
        if !section.text().any(|t| t.contains("Teams")) {
            continue;
        }
        results.extend(
            section
                .select(&link_selector)
                .filter_map(|link| identity_from_link(link, base_url)),
        );
    }
    Ok(results)
}
