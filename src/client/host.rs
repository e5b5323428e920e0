//! The embedding page, seen from the poller

use std::sync::Mutex;

/// Identity and UI hooks provided by whatever hosts the widget
#[cfg_attr(test, mockall::automock)]
pub trait HostContext: Send + Sync {
    /// Opaque learner id; `None` until the host has resolved one
    fn learner_id(&self) -> Option<String>;

    /// Optional team the learner belongs to
    fn team_id(&self) -> Option<String>;

    /// Leave the widget for an external session
    fn navigate_to(&self, url: &str);

    /// Play the unlock celebration for a character
    fn show_unlock_animation(&self, character_id: &str);
}

/// Host for the `watch` command: fixed identity, prints instead of rendering
pub struct ConsoleHost {
    learner_id: String,
    team_id: Option<String>,
    navigations: Mutex<Vec<String>>,
}

impl ConsoleHost {
    pub fn new(learner_id: impl Into<String>, team_id: Option<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            team_id,
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// URLs passed to `navigate_to`, oldest first
    pub fn navigations(&self) -> Vec<String> {
        self.navigations
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

impl HostContext for ConsoleHost {
    fn learner_id(&self) -> Option<String> {
        Some(self.learner_id.clone())
    }

    fn team_id(&self) -> Option<String> {
        self.team_id.clone()
    }

    fn navigate_to(&self, url: &str) {
        println!("→ Open {}", url);
        if let Ok(mut urls) = self.navigations.lock() {
            urls.push(url.to_string());
        }
    }

    fn show_unlock_animation(&self, character_id: &str) {
        println!("🎉 {} unlocked!", character_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_host_records_navigation() {
        let host = ConsoleHost::new("m1", Some("team-a".into()));
        assert_eq!(host.learner_id().as_deref(), Some("m1"));
        assert_eq!(host.team_id().as_deref(), Some("team-a"));

        host.navigate_to("https://launch.example/megan?member_ID=m1");
        assert_eq!(host.navigations(), vec!["https://launch.example/megan?member_ID=m1"]);
    }
}
