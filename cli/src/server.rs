use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::tls::TlsConfig;
use fitlog_core::backend::Backend;
use fitlog_core::models::{Exercise, Meal, StructuredLog, parse_date_key};
use fitlog_core::remote::{DailyRow, LogRow, LogTable, RemoteLog, SaveOutcome};

const BODY_LIMIT: usize = 2 * 1024 * 1024; // 2 MB

#[derive(Clone)]
pub(crate) struct AppState {
    backend: Arc<Mutex<Backend>>,
    api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(backend: Backend, api_key: Option<String>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            api_key,
        }
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SaveLogRequest {
    #[serde(default)]
    exercises: Vec<Exercise>,
    #[serde(default)]
    meals: Vec<Meal>,
}

#[derive(Serialize)]
struct ClearResponse {
    deleted: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn check_date(date: &str) -> Result<(), ApiError> {
    parse_date_key(date)
        .map(|_| ())
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            warn!(path = %request.uri().path(), "rejected request without valid API key");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_logs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<LogRow>>, ApiError> {
    let rows = state
        .backend()
        .list_log_rows(&user_id)
        .context("failed to list logs")?;
    Ok(Json(rows))
}

async fn get_log(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(String, String)>,
) -> Result<Json<RemoteLog>, ApiError> {
    check_date(&date)?;
    let log = state
        .backend()
        .get_log(&user_id, &date)
        .context("failed to fetch log")?;
    Ok(Json(log))
}

async fn save_log(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(String, String)>,
    Json(req): Json<SaveLogRequest>,
) -> Result<Json<SaveOutcome>, ApiError> {
    check_date(&date)?;
    let outcome = state
        .backend()
        .save_log(&user_id, &date, &req.exercises, &req.meals)
        .context("failed to save log")?;
    Ok(Json(outcome))
}

async fn clear_log(
    State(state): State<AppState>,
    Path((user_id, date, table)): Path<(String, String, String)>,
) -> Result<Json<ClearResponse>, ApiError> {
    check_date(&date)?;
    let table: LogTable = table
        .parse()
        .map_err(|e: anyhow::Error| ApiError::NotFound(e.to_string()))?;
    let deleted = state
        .backend()
        .delete_log(&user_id, &date, table)
        .context("failed to clear log")?;
    Ok(Json(ClearResponse { deleted }))
}

async fn list_daily(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DailyRow>>, ApiError> {
    let rows = state
        .backend()
        .list_daily_logs(&user_id)
        .context("failed to list daily logs")?;
    Ok(Json(rows))
}

/// `null` when the date has no structured record.
async fn get_daily(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(String, String)>,
) -> Result<Json<Option<StructuredLog>>, ApiError> {
    check_date(&date)?;
    let log = state
        .backend()
        .get_daily_log(&user_id, &date)
        .context("failed to fetch daily log")?;
    Ok(Json(log))
}

async fn save_daily(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(String, String)>,
    Json(log): Json<StructuredLog>,
) -> Result<StatusCode, ApiError> {
    check_date(&date)?;
    state
        .backend()
        .upsert_daily_log(&user_id, &date, &log)
        .context("failed to save daily log")?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Router builder ---

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users/{user_id}/logs", get(list_logs))
        .route(
            "/api/users/{user_id}/logs/{date}",
            get(get_log).put(save_log),
        )
        .route(
            "/api/users/{user_id}/logs/{date}/{table}",
            delete(clear_log),
        )
        .route("/api/users/{user_id}/daily", get(list_daily))
        .route(
            "/api/users/{user_id}/daily/{date}",
            get(get_daily).put(save_daily),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/api/health", get(health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of a key longer than eight characters.
fn mask_key(key: &str) -> Option<String> {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return None;
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    Some(format!("{head}...{tail}"))
}

pub async fn start_server(
    backend: Backend,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    tls: Option<TlsConfig>,
) -> anyhow::Result<()> {
    let state = AppState::new(backend, api_key.clone());
    let app = build_router(state);

    match api_key.as_deref().and_then(mask_key) {
        Some(masked) => info!("API key: {masked} (see api_key file in data directory)"),
        None if api_key.is_some() => info!("API key authentication enabled"),
        None => warn!("authentication disabled (--no-auth); the API is open to anyone"),
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        warn!("listening on {bind} with no authentication; any device on the network can read and write logs");
    }

    let addr = format!("{bind}:{port}")
        .parse::<std::net::SocketAddr>()
        .context("invalid bind address")?;

    if let Some(tls) = tls {
        let fingerprint = tls.ensure()?;
        let rustls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context("failed to load TLS certificate")?;

        info!("listening on https://{addr}");
        info!("certificate fingerprint (SHA-256): {fingerprint}");

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("listening on http://{addr}");
        axum::serve(listener, app).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const KEY: &str = "test-key-abc123";

    fn test_app(api_key: Option<&str>) -> Router {
        let backend = Backend::open_in_memory().unwrap();
        build_router(AppState::new(backend, api_key.map(str::to_string)))
    }

    fn seeded_app() -> Router {
        let backend = Backend::open_in_memory().unwrap();
        backend
            .save_log(
                "user-1",
                "2025-03-01",
                &[Exercise {
                    id: "1".to_string(),
                    name: "Squat".to_string(),
                    ..Exercise::default()
                }],
                &[],
            )
            .unwrap();
        build_router(AppState::new(backend, None))
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn put_json(uri: &str, body: &Value) -> axum::http::Request<Body> {
        axum::http::Request::put(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let response = test_app(Some(KEY))
            .oneshot(get("/api/users/user-1/logs"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let response = test_app(Some(KEY))
            .oneshot(
                axum::http::Request::get("/api/users/user-1/logs")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let response = test_app(Some(KEY))
            .oneshot(
                axum::http::Request::get("/api/users/user-1/logs")
                    .header("Authorization", format!("Bearer {KEY}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn health_skips_auth() {
        let response = test_app(Some(KEY))
            .oneshot(get("/api/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let response = test_app(Some("secret"))
            .oneshot(get("/api/users/user-1/logs"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn unknown_date_returns_empty_log() {
        let response = test_app(None)
            .oneshot(get("/api/users/user-1/logs/2025-03-01"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"exercises": [], "meals": []})
        );
    }

    #[tokio::test]
    async fn put_then_get_log() {
        let app = test_app(None);
        let body = json!({
            "exercises": [{"id": "1", "name": "Squat", "sets": "3", "reps": "10", "notes": ""}],
            "meals": []
        });
        let response = app
            .clone()
            .oneshot(put_json("/api/users/user-1/logs/2025-03-01", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"workout_saved": true, "diet_saved": false})
        );

        let response = app
            .oneshot(get("/api/users/user-1/logs/2025-03-01"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["exercises"][0]["name"], "Squat");
        assert_eq!(json["meals"], json!([]));
    }

    #[tokio::test]
    async fn logs_are_scoped_per_user() {
        let response = seeded_app()
            .oneshot(get("/api/users/user-2/logs/2025-03-01"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["exercises"], json!([]));
    }

    #[tokio::test]
    async fn clear_removes_one_table() {
        let app = seeded_app();
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete("/api/users/user-1/logs/2025-03-01/workout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"deleted": true}));

        let response = app
            .oneshot(get("/api/users/user-1/logs"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn clear_unknown_table_returns_404() {
        let response = seeded_app()
            .oneshot(
                axum::http::Request::delete("/api/users/user-1/logs/2025-03-01/steps")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_date_returns_400() {
        let response = test_app(None)
            .oneshot(get("/api/users/user-1/logs/03-01-2025"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("YYYY-MM-DD"));
    }

    #[tokio::test]
    async fn daily_roundtrip() {
        let app = test_app(None);
        let response = app
            .clone()
            .oneshot(get("/api/users/user-1/daily/2025-03-01"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, Value::Null);

        let body = json!({
            "goals": ["stretch"],
            "steps": 8000,
            "workouts": [{"muscle_group": "Back", "exercise_name": "Row", "sets": "3", "reps": "8", "weight": "40"}],
            "muscle_groups": ["Back"]
        });
        let response = app
            .clone()
            .oneshot(put_json("/api/users/user-1/daily/2025-03-01", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(get("/api/users/user-1/daily/2025-03-01"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["steps"], 8000);
        assert_eq!(json["workouts"][0]["exercise_name"], "Row");

        let response = app
            .oneshot(get("/api/users/user-1/daily"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json[0]["date"], "2025-03-01");
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let big_body = vec![b' '; BODY_LIMIT + 1];
        let response = test_app(None)
            .oneshot(
                axum::http::Request::put("/api/users/user-1/logs/2025-03-01")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/backend.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn mask_key_counts_characters_not_bytes() {
        assert_eq!(mask_key("abcd1234wxyz").as_deref(), Some("abcd...wxyz"));
        assert_eq!(mask_key("ééééxxxxñññññ").as_deref(), Some("éééé...ññññ"));
        assert!(mask_key("short").is_none());
        assert!(mask_key("12345678").is_none());
    }
}
