//! HTTP route definitions

use axum::{
    extract::{Extension, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::game::GameError;
use crate::http::middleware::{require_session, SessionToken};
use crate::stream::handler::stream_handler;
use crate::stream::protocol::{ControlInput, Role};
use crate::util::time::uptime_secs;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 4 * 1024;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origins);

    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/", get(landing_handler))
        .route("/health", get(health_handler))
        .route("/api/join", post(join_handler))
        .route("/api/stream", get(stream_handler));

    // Session routes (bearer token required)
    let session_routes = Router::new()
        .route("/api/input", post(input_handler))
        .layer(middleware::from_fn(require_session));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured origins, or any origin when none are set
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Landing page and health
// ============================================================================

const LANDING_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Pitch Server</title></head>
<body>
<h1>Pitch Server</h1>
<p>Join with <code>POST /api/join</code>, watch with <code>GET /api/stream?token=...</code>,
play with <code>POST /api/input</code>.</p>
</body>
</html>
"#;

async fn landing_handler() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    uptime_secs: u64,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime_secs: uptime_secs(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Deserialize)]
struct JoinRequest {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "accessKey")]
    key: Option<String>,
}

#[derive(Serialize)]
struct JoinResponse {
    token: String,
    role: Role,
    name: String,
}

async fn join_handler(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    if state.join_limiter.check().is_err() {
        return Err(AppError::RateLimited);
    }

    let grant = state.game.join(req.name, req.key).await?;

    Ok(Json(JoinResponse {
        token: grant.token,
        role: grant.role,
        name: grant.name,
    }))
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn input_handler(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
    Json(input): Json<ControlInput>,
) -> Result<Json<OkResponse>, AppError> {
    state.game.submit_input(token, input).await?;
    Ok(Json(OkResponse { ok: true }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests")]
    RateLimited,

    #[error("Service unavailable")]
    Unavailable,
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::Forbidden => AppError::Forbidden,
            GameError::Unauthenticated => AppError::Unauthorized,
            GameError::RateLimited => AppError::RateLimited,
            GameError::Unavailable => AppError::Unavailable,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;

    fn app(config: Config) -> Router {
        build_router(AppState::new(config))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(Config::default());
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn landing_page_is_served() {
        let app = app(Config::default());
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn join_assigns_roles_in_order() {
        let app = app(Config::default());
        let mut roles = Vec::new();
        for name in ["ana", "bo", "cy"] {
            let (status, body) = send(&app, post_json("/api/join", None, json!({ "name": name }))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["token"].as_str().unwrap().len(), 64);
            roles.push(body["role"].as_str().unwrap().to_string());
        }
        assert_eq!(roles, ["primary", "secondary", "observer"]);
    }

    #[tokio::test]
    async fn join_with_wrong_key_is_forbidden() {
        let app = app(Config {
            access_key: Some("sesame".to_string()),
            ..Config::default()
        });

        let (status, _) = send(&app, post_json("/api/join", None, json!({ "name": "a", "key": "x" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, post_json("/api/join", None, json!({ "name": "a", "key": "sesame" }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn input_requires_known_token() {
        let app = app(Config::default());

        let (status, _) = send(&app, post_json("/api/input", None, json!({ "moveX": 1 }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, post_json("/api/input", Some("bogus"), json!({ "moveX": 1 }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, joined) = send(&app, post_json("/api/join", None, json!({ "name": "a" }))).await;
        let token = joined["token"].as_str().unwrap();
        let (status, body) = send(&app, post_json("/api/input", Some(token), json!({ "moveX": 1 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn input_flood_is_rate_limited() {
        let app = app(Config::default());
        let (_, joined) = send(&app, post_json("/api/join", None, json!({ "name": "a" }))).await;
        let token = joined["token"].as_str().unwrap().to_string();

        let mut limited = 0;
        for _ in 0..70 {
            let (status, _) = send(&app, post_json("/api/input", Some(&token), json!({ "moveX": 1 }))).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            }
        }
        // Even split across a second boundary, at most 60 calls get through
        assert!(limited >= 10, "only {limited} calls were limited");
    }

    #[tokio::test]
    async fn stream_requires_known_token() {
        let app = app(Config::default());
        let (status, _) = send(&app, get("/api/stream")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get("/api/stream?token=bogus")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stream_opens_as_event_stream() {
        let app = app(Config::default());
        let (_, joined) = send(&app, post_json("/api/join", None, json!({ "name": "a" }))).await;
        let token = joined["token"].as_str().unwrap();

        let response = app
            .oneshot(get(&format!("/api/stream?token={token}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));
    }
}
