//! Session launch handoff
//!
//! Starting a practice session leaves the widget entirely; the learner
//! comes back only through new interaction records.

use std::collections::BTreeMap;
use url::Url;

use crate::config::LauncherConfig;
use crate::error::{ProgressError, Result};
use crate::types::{normalize_team, require_id};

/// Builds external launcher URLs per character
#[derive(Debug, Clone, Default)]
pub struct SessionLauncher {
    urls: BTreeMap<String, Url>,
}

impl SessionLauncher {
    /// Parse the configured base URLs
    pub fn from_config(config: &LauncherConfig) -> Result<Self> {
        let mut urls = BTreeMap::new();
        for (character, raw) in &config.urls {
            let url = Url::parse(raw).map_err(|e| {
                ProgressError::Config(format!("launcher URL for '{}' is invalid: {}", character, e))
            })?;
            urls.insert(character.clone(), url);
        }
        Ok(Self { urls })
    }

    /// Base URL plus `member_ID`, `teamId` (when present) and `character`
    pub fn launch_url(&self, learner_id: &str, team_id: Option<&str>, character_id: &str) -> Result<Url> {
        require_id("learnerId", learner_id)?;
        require_id("characterId", character_id)?;

        let mut url = self
            .urls
            .get(character_id)
            .cloned()
            .ok_or_else(|| {
                ProgressError::Validation(format!("no launcher configured for '{}'", character_id))
            })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("member_ID", learner_id);
            if let Some(team) = normalize_team(team_id) {
                query.append_pair("teamId", team);
            }
            query.append_pair("character", character_id);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher() -> SessionLauncher {
        let mut urls = BTreeMap::new();
        urls.insert("Megan".to_string(), "https://calls.example/start?mode=practice".to_string());
        SessionLauncher::from_config(&LauncherConfig { urls }).unwrap()
    }

    #[test]
    fn test_launch_url_appends_identity() {
        let url = launcher().launch_url("m 1", Some("team-a"), "Megan").unwrap();
        assert_eq!(
            url.as_str(),
            "https://calls.example/start?mode=practice&member_ID=m+1&teamId=team-a&character=Megan"
        );
    }

    #[test]
    fn test_team_is_optional() {
        let url = launcher().launch_url("m1", Some(" "), "Megan").unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, vec!["mode", "member_ID", "character"]);
    }

    #[test]
    fn test_unknown_character_rejected() {
        assert!(matches!(
            launcher().launch_url("m1", None, "David"),
            Err(ProgressError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_config_url() {
        let mut urls = BTreeMap::new();
        urls.insert("Megan".to_string(), "not a url".to_string());
        assert!(matches!(
            SessionLauncher::from_config(&LauncherConfig { urls }),
            Err(ProgressError::Config(_))
        ));
    }
}
