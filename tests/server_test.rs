//! Integration tests for the HTTP API, driven through the router without a socket

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use practice_progress::{router, Config, GoalConfig, ProgressService, ProgressStore, ServerState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, ProgressService) {
    let service = ProgressService::new(
        ProgressStore::in_memory().unwrap(),
        vec!["Megan".into(), "David".into(), "Linda".into()],
        GoalConfig::default(),
    );
    let state = ServerState::new(service.clone(), Config::default());
    (router(state), service)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn record(app: &Router, character: &str, overall: f64, times: usize) -> Value {
    let mut last = Value::Null;
    for _ in 0..times {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/interactions",
            Some(json!({
                "learnerId": "m1",
                "characterId": character,
                "scores": {
                    "overall_performance": overall,
                    "engagement": 80.0,
                    "objection_handling": 80.0,
                    "information_gathering": 80.0,
                    "program_explanation": 80.0,
                    "closing_skills": 80.0,
                    "overall_effectiveness": 80.0
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        last = body;
    }
    last
}

#[tokio::test]
async fn test_status_reports_chain() {
    let (app, _) = app();
    let (status, body) = call(&app, Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chain"], json!(["Megan", "David", "Linda"]));
    assert_eq!(body["defaultGoals"]["threshold"], 85);
}

#[tokio::test]
async fn test_empty_aggregate_is_zero_not_error() {
    let (app, _) = app();
    let (status, body) = call(&app, Method::GET, "/api/aggregate-metrics?learnerId=m1&characterId=Megan", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_calls"], 0);
    assert_eq!(body["overall_performance"], 0);
}

#[tokio::test]
async fn test_missing_ids_are_bad_requests() {
    let (app, _) = app();

    let (status, body) = call(&app, Method::GET, "/api/aggregate-metrics?characterId=Megan", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
    assert!(body["details"].as_str().unwrap().contains("learnerId"));

    let (status, _) = call(&app, Method::POST, "/api/reset", Some(json!({ "learnerId": "m1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/mark-complete", Some(json!({ "characterId": "Megan" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_scores_rejected() {
    let (app, service) = app();
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/interactions",
        Some(json!({
            "learnerId": "m1",
            "characterId": "Megan",
            "scores": {
                "overall_performance": 140.0,
                "engagement": 80.0,
                "objection_handling": 80.0,
                "information_gathering": 80.0,
                "program_explanation": 80.0,
                "closing_skills": 80.0,
                "overall_effectiveness": 80.0
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(service.store().interaction_count("m1", "Megan").await.unwrap(), 0);
}

#[tokio::test]
async fn test_goal_config_round_trip() {
    let (app, _) = app();

    let (status, body) = call(&app, Method::GET, "/api/goal-config?teamId=team-a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "windowSize": 10, "threshold": 85 }));

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/goal-config",
        Some(json!({ "teamId": "team-a", "windowSize": 5, "threshold": 70 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["windowSize"], 5);
    assert!(body["updatedAt"].is_string());

    let (_, body) = call(&app, Method::GET, "/api/goal-config?teamId=team-a", None).await;
    assert_eq!(body["threshold"], 70);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/goal-config",
        Some(json!({ "teamId": "team-a", "windowSize": 0, "threshold": 70 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mastery_flow_over_http() {
    let (app, _) = app();
    let last = record(&app, "Megan", 90.0, 10).await;
    assert_eq!(last["metrics"]["total_calls"], 10);
    assert_eq!(last["metrics"]["overall_performance"], 90);

    let (_, body) = call(&app, Method::GET, "/api/completion-status?learnerId=m1&characterId=Megan", None).await;
    assert_eq!(body, json!({ "completed": false }));

    let pair = json!({ "learnerId": "m1", "characterId": "Megan" });
    let (status, first) = call(&app, Method::POST, "/api/mark-complete", Some(pair.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["completed"], true);
    assert_eq!(first["snapshot"]["goals"], json!({ "windowSize": 10, "threshold": 85 }));

    // Redundant calls return the same record
    let (_, second) = call(&app, Method::POST, "/api/mark-complete", Some(pair)).await;
    assert_eq!(first, second);

    let (_, anim) = call(&app, Method::GET, "/api/animation-status?learnerId=m1&characterId=David", None).await;
    assert_eq!(anim, json!({ "shown": false, "unlocked": true, "shouldShow": true }));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/animation-status",
        Some(json!({ "learnerId": "m1", "characterId": "David" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, anim) = call(&app, Method::GET, "/api/animation-status?learnerId=m1&characterId=David", None).await;
    assert_eq!(anim["shown"], true);
    assert_eq!(anim["shouldShow"], false);

    let (_, progress) = call(&app, Method::GET, "/api/progress?learnerId=m1", None).await;
    assert_eq!(progress["degraded"], false);
    let characters = progress["characters"].as_array().unwrap();
    assert_eq!(characters[0]["completed"], true);
    assert_eq!(characters[1]["unlocked"], true);
    assert_eq!(characters[1]["animationShown"], true);
    assert_eq!(characters[2]["unlocked"], false);
}

#[tokio::test]
async fn test_reset_over_http() {
    let (app, _) = app();
    record(&app, "Megan", 95.0, 10).await;
    let pair = json!({ "learnerId": "m1", "characterId": "Megan" });
    call(&app, Method::POST, "/api/mark-complete", Some(pair.clone())).await;

    let (status, summary) = call(&app, Method::POST, "/api/reset", Some(pair.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["interactionsDeleted"], 10);
    assert_eq!(summary["completionDeleted"], true);

    let (_, body) = call(&app, Method::GET, "/api/completion-status?learnerId=m1&characterId=Megan", None).await;
    assert_eq!(body["completed"], false);

    let (_, anim) = call(&app, Method::GET, "/api/animation-status?learnerId=m1&characterId=David", None).await;
    assert_eq!(anim["unlocked"], false);

    let (status, again) = call(&app, Method::POST, "/api/reset", Some(pair)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["interactionsDeleted"], 0);
}

#[tokio::test]
async fn test_malformed_bodies_use_error_shape() {
    let (app, _) = app();

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/goal-config",
        Some(json!({ "teamId": "team-a", "windowSize": -1, "threshold": 70 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
    assert!(body["details"].is_string());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/mark-complete")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Invalid request");

    // No content type at all
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/reset")
        .body(Body::from(r#"{"learnerId":"m1","characterId":"Megan"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["details"].as_str().unwrap().contains("Content-Type"));
}

#[tokio::test]
async fn test_unknown_character_gate_is_bad_request() {
    let (app, _) = app();
    let (status, _) = call(&app, Method::GET, "/api/animation-status?learnerId=m1&characterId=Zed", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin_by_default() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/mark-complete")
        .header(header::ORIGIN, "https://lms.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
