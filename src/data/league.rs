//! Static league catalogue
//!
//! Maps the league names used in input files to the site's numeric league id
//! and, where the REST API covers the competition, its competition code.

/// A league known to both providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct League {
    /// Human-readable name
    pub name: &'static str,
    /// League id on the HTML site
    pub site_id: &'static str,
    /// Competition code on the REST API, if covered
    pub api_code: Option<&'static str>,
}

/// Static array of supported leagues
pub static LEAGUES: [League; 11] = [
    League {
        name: "Premier League",
        site_id: "9",
        api_code: Some("PL"),
    },
    League {
        name: "La Liga",
        site_id: "12",
        api_code: Some("PD"),
    },
    League {
        name: "Bundesliga",
        site_id: "20",
        api_code: Some("BL1"),
    },
    League {
        name: "Serie A",
        site_id: "11",
        api_code: Some("SA"),
    },
    League {
        name: "Ligue 1",
        site_id: "13",
        api_code: Some("FL1"),
    },
    League {
        name: "Eredivisie",
        site_id: "23",
        api_code: Some("DED"),
    },
    League {
        name: "Primeira Liga",
        site_id: "32",
        api_code: Some("PPL"),
    },
    League {
        name: "Championship",
        site_id: "10",
        api_code: Some("ELC"),
    },
    League {
        name: "MLS",
        site_id: "22",
        api_code: None,
    },
    League {
        name: "UEFA Champions League",
        site_id: "8",
        api_code: Some("CL"),
    },
    League {
        name: "UEFA Europa League",
        site_id: "19",
        api_code: None,
    },
];

/// Returns all supported leagues
pub fn all_leagues() -> &'static [League] {
    &LEAGUES
}

/// Looks up a league by name, ignoring case and surrounding whitespace
pub fn find_league(name: &str) -> Option<&'static League> {
    let name = name.trim();
    LEAGUES.iter().find(|l| l.name.eq_ignore_ascii_case(name))
}

/// Comma-separated list of league names for error messages
pub fn league_names() -> String {
    LEAGUES
        .iter()
        .map(|l| l.name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_find_league_is_case_insensitive() {
        let league = find_league("  premier league ").expect("Should find league");
        assert_eq!(league.site_id, "9");
        assert_eq!(league.api_code, Some("PL"));
    }

    #[test]
    fn test_find_league_unknown() {
        assert!(find_league("Sunday League").is_none());
    }

    #[test]
    fn test_site_ids_are_unique() {
        let ids: HashSet<_> = all_leagues().iter().map(|l| l.site_id).collect();
        assert_eq!(ids.len(), all_leagues().len());
    }

    #[test]
    fn test_league_names_lists_everything() {
        let names = league_names();
        assert!(names.contains("Bundesliga"));
        assert!(names.contains("UEFA Europa League"));
    }
}
