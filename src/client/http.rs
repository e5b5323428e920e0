//! HTTP backend for the polling client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::ProgressBackend;
use crate::config::PollerConfig;
use crate::error::{ProgressError, Result};
use crate::server::http::{PairQuery, PairRequest, TeamQuery};
use crate::store::ResetSummary;
use crate::types::{AggregateMetrics, AnimationStatus, CompletionStatus, GoalConfig};

/// Error body produced by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Talks to `practice-progress serve` over JSON; one attempt per call
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ProgressError::Config(format!("invalid backend URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProgressError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &PollerConfig) -> Result<Self> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ProgressError::Config(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(ErrorBody { error, details: Some(details) }) => format!("{}: {}", error, details),
                Ok(ErrorBody { error, details: None }) => error,
                Err(_) => body,
            };
            debug!("Backend answered {}: {}", status, message);
            return Err(ProgressError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }

    fn pair_query(learner_id: &str, character_id: &str, team_id: Option<&str>) -> PairQuery {
        PairQuery {
            learner_id: learner_id.to_string(),
            character_id: character_id.to_string(),
            team_id: team_id.map(str::to_string),
        }
    }

    fn pair_request(learner_id: &str, character_id: &str, team_id: Option<&str>) -> PairRequest {
        PairRequest {
            learner_id: learner_id.to_string(),
            character_id: character_id.to_string(),
            team_id: team_id.map(str::to_string),
        }
    }
}

#[async_trait]
impl ProgressBackend for HttpBackend {
    async fn aggregate_metrics(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AggregateMetrics> {
        let url = self.endpoint("api/aggregate-metrics")?;
        let query = Self::pair_query(learner_id, character_id, team_id);
        self.send(self.client.get(url).query(&query)).await
    }

    async fn goal_config(&self, team_id: Option<&str>) -> Result<GoalConfig> {
        let url = self.endpoint("api/goal-config")?;
        let query = TeamQuery {
            team_id: team_id.map(str::to_string),
        };
        self.send(self.client.get(url).query(&query)).await
    }

    async fn completion_status(&self, learner_id: &str, character_id: &str) -> Result<CompletionStatus> {
        let url = self.endpoint("api/completion-status")?;
        let query = Self::pair_query(learner_id, character_id, None);
        self.send(self.client.get(url).query(&query)).await
    }

    async fn mark_complete(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<CompletionStatus> {
        let url = self.endpoint("api/mark-complete")?;
        let body = Self::pair_request(learner_id, character_id, team_id);
        self.send(self.client.post(url).json(&body)).await
    }

    async fn animation_status(
        &self,
        learner_id: &str,
        character_id: &str,
        team_id: Option<&str>,
    ) -> Result<AnimationStatus> {
        let url = self.endpoint("api/animation-status")?;
        let query = Self::pair_query(learner_id, character_id, team_id);
        self.send(self.client.get(url).query(&query)).await
    }

    async fn mark_animation_shown(&self, learner_id: &str, character_id: &str) -> Result<()> {
        let url = self.endpoint("api/animation-status")?;
        let body = Self::pair_request(learner_id, character_id, None);
        let _: serde_json::Value = self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn reset(&self, learner_id: &str, character_id: &str) -> Result<ResetSummary> {
        let url = self.endpoint("api/reset")?;
        let body = Self::pair_request(learner_id, character_id, None);
        self.send(self.client.post(url).json(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let backend = HttpBackend::new("http://127.0.0.1:8787/widget", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.base_url().as_str(), "http://127.0.0.1:8787/widget/");
        assert_eq!(
            backend.endpoint("api/reset").unwrap().as_str(),
            "http://127.0.0.1:8787/widget/api/reset"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBackend::new("::nope", Duration::from_secs(1)),
            Err(ProgressError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) is closed on any sane test host
        let backend = HttpBackend::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = backend.goal_config(None).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
