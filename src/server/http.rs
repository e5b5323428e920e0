//! HTTP handlers for the progression API

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Json, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::error::ProgressError;
use crate::server::ServerState;
use crate::store::ResetSummary;
use crate::types::{
    AggregateMetrics, AnimationStatus, ChainProgress, CompletionStatus, GoalConfig, InteractionRecord,
    ScoreCard,
};

type ApiResult<T> = Result<Json<T>, ProgressError>;

/// JSON body whose rejections use the API error shape
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ProgressError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections use the API error shape
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ProgressError))]
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for ProgressError {
    fn from(rejection: JsonRejection) -> Self {
        ProgressError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ProgressError {
    fn from(rejection: QueryRejection) -> Self {
        ProgressError::Validation(rejection.body_text())
    }
}

/// `?learnerId&characterId[&teamId]`
///
/// Ids default to empty so a missing one is reported as a validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairQuery {
    #[serde(default)]
    pub learner_id: String,
    #[serde(default)]
    pub character_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerQuery {
    #[serde(default)]
    pub learner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

/// Body of the pair-scoped POST endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    #[serde(default)]
    pub learner_id: String,
    #[serde(default)]
    pub character_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

/// Body of `PUT /api/goal-config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    #[serde(default)]
    pub team_id: String,
    pub window_size: Option<u32>,
    pub threshold: Option<u32>,
}

/// Body of `POST /api/interactions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    #[serde(default)]
    pub learner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub character_id: String,
    pub scores: Option<ScoreCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_at: Option<DateTime<Utc>>,
}

/// Response of `POST /api/interactions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedInteraction {
    pub interaction: InteractionRecord,
    /// The pair's aggregate including this session
    pub metrics: AggregateMetrics,
}

/// Status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub chain: Vec<String>,
    pub default_goals: GoalConfig,
}

impl IntoResponse for ProgressError {
    fn into_response(self) -> Response {
        let (status, label) = match &self {
            ProgressError::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            ProgressError::InvariantViolation(_) => {
                error!("Invariant violation while serving request: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invariant violated")
            }
            ProgressError::Storage(_) | ProgressError::Io(_) => {
                warn!("Storage failure while serving request: {}", self);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        };

        (
            status,
            Json(json!({
                "error": label,
                "details": self.to_string()
            })),
        )
            .into_response()
    }
}

/// Status handler
pub async fn status_handler(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        chain: state.service.chain().to_vec(),
        default_goals: state.config.progression.default_goals(),
    })
}

pub async fn aggregate_handler(
    State(state): State<ServerState>,
    ApiQuery(q): ApiQuery<PairQuery>,
) -> ApiResult<AggregateMetrics> {
    let metrics = state
        .service
        .aggregate_for_team(&q.learner_id, &q.character_id, q.team_id.as_deref())
        .await?;
    Ok(Json(metrics))
}

pub async fn record_interaction_handler(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<InteractionRequest>,
) -> Result<(StatusCode, Json<RecordedInteraction>), ProgressError> {
    let scores = req
        .scores
        .ok_or_else(|| ProgressError::Validation("scores is required".to_string()))?;

    let interaction = state
        .service
        .record_interaction(&req.learner_id, req.team_id.as_deref(), &req.character_id, scores, req.session_at)
        .await?;
    let metrics = state
        .service
        .aggregate_for_team(&req.learner_id, &req.character_id, req.team_id.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(RecordedInteraction { interaction, metrics })))
}

pub async fn get_goals_handler(
    State(state): State<ServerState>,
    ApiQuery(q): ApiQuery<TeamQuery>,
) -> ApiResult<GoalConfig> {
    Ok(Json(state.service.get_goals(q.team_id.as_deref()).await?))
}

pub async fn set_goals_handler(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<GoalUpdate>,
) -> ApiResult<GoalConfig> {
    let window_size = req
        .window_size
        .ok_or_else(|| ProgressError::Validation("windowSize is required".to_string()))?;
    let threshold = req
        .threshold
        .ok_or_else(|| ProgressError::Validation("threshold is required".to_string()))?;

    Ok(Json(state.service.set_goals(&req.team_id, window_size, threshold).await?))
}

pub async fn completion_status_handler(
    State(state): State<ServerState>,
    ApiQuery(q): ApiQuery<PairQuery>,
) -> ApiResult<CompletionStatus> {
    Ok(Json(state.service.completion_status(&q.learner_id, &q.character_id).await?))
}

/// Evaluate and record completion; safe to call on every poll
pub async fn mark_complete_handler(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<PairRequest>,
) -> ApiResult<CompletionStatus> {
    let status = state
        .service
        .evaluate_completion(&req.learner_id, &req.character_id, req.team_id.as_deref())
        .await?;
    Ok(Json(status))
}

pub async fn animation_status_handler(
    State(state): State<ServerState>,
    ApiQuery(q): ApiQuery<PairQuery>,
) -> ApiResult<AnimationStatus> {
    let status = state
        .service
        .animation_status(&q.learner_id, &q.character_id, q.team_id.as_deref())
        .await?;
    Ok(Json(status))
}

pub async fn mark_animation_handler(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<PairRequest>,
) -> ApiResult<serde_json::Value> {
    state
        .service
        .mark_animation_shown(&req.learner_id, &req.character_id)
        .await?;
    Ok(Json(json!({ "shown": true })))
}

pub async fn reset_handler(
    State(state): State<ServerState>,
    ApiJson(req): ApiJson<PairRequest>,
) -> ApiResult<ResetSummary> {
    Ok(Json(state.service.reset(&req.learner_id, &req.character_id).await?))
}

pub async fn progress_handler(
    State(state): State<ServerState>,
    ApiQuery(q): ApiQuery<LearnerQuery>,
) -> ApiResult<ChainProgress> {
    Ok(Json(state.service.chain_progress(&q.learner_id, q.team_id.as_deref()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ProgressError::Validation("learnerId is required".into()), StatusCode::BAD_REQUEST),
            (ProgressError::InvariantViolation("two rows".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ProgressError::Storage(rusqlite::Error::InvalidQuery),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ProgressError::Transport("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_missing_ids_deserialize_as_empty() {
        let q: PairQuery = serde_json::from_str(r#"{"characterId":"Megan"}"#).unwrap();
        assert_eq!(q.learner_id, "");
        assert_eq!(q.character_id, "Megan");
        assert!(q.team_id.is_none());
    }
}
