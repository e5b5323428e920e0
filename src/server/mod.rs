//! HTTP server exposing the progression operations to embedded widgets

pub mod http;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::progression::ProgressService;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<ProgressService>,
    pub config: Arc<Config>,
}

impl ServerState {
    pub fn new(service: ProgressService, config: Config) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }
}

/// CORS for the host pages embedding the widget; any origin when none are listed
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Requests running past `limit` are answered with 408
fn timeout_layer(limit: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, limit)
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    let timeout = timeout_layer(state.config.server.request_timeout());

    let api = Router::new()
        .route("/api/status", get(http::status_handler))
        .route("/api/aggregate-metrics", get(http::aggregate_handler))
        .route("/api/interactions", post(http::record_interaction_handler))
        .route(
            "/api/goal-config",
            get(http::get_goals_handler).put(http::set_goals_handler),
        )
        .route("/api/completion-status", get(http::completion_status_handler))
        .route("/api/mark-complete", post(http::mark_complete_handler))
        .route(
            "/api/animation-status",
            get(http::animation_status_handler).post(http::mark_animation_handler),
        )
        .route("/api/reset", post(http::reset_handler))
        .route("/api/progress", get(http::progress_handler));

    Router::new()
        .merge(api)
        .layer(timeout)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and run until Ctrl-C
pub async fn start(config: Config, host: &str, port: u16) -> Result<()> {
    let service = ProgressService::from_config(&config)
        .await
        .context("Failed to open progress store")?;
    let database = config.storage.database_path.clone();
    let chain = config.progression.chain.join(" -> ");
    let app = router(ServerState::new(service, config));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Practice Progress Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Database: {}", database.display());
    println!("✓ Chain: {}", chain);
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_cors_layer_skips_invalid_origins() {
        // Builds without panicking on a header-invalid entry
        let _ = cors_layer(&["https://lms.example".to_string(), "bad\norigin".to_string()]);
    }
}
