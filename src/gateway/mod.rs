//! Axum-based HTTP gateway for the to-do API.
//!
//! - Public routes: `/`, `/health`, `/api/auth/register`, `/api/auth/login`
//! - Protected routes under `/api/tasks`, behind the bearer-token gate
//! - Request body size limit (64KB max), origin allow-list CORS
//! - Graceful shutdown on Ctrl+C / SIGTERM

pub mod auth_gate;
pub mod tasks;

use crate::auth::{
    AuthSession, Authenticator, LoginRequest, PasswordPolicy, RegisterRequest, SqliteUserStore,
    TokenIssuer,
};
use crate::config::{AuthConfig, Config, CorsConfig};
use crate::error::ApiError;
use crate::store::Database;
use crate::tasks::{SqliteTaskStore, TaskStore};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    pub tasks: Arc<dyn TaskStore>,
}

impl AppState {
    /// Create both stores on `db` and wire the authenticator from `config`.
    pub fn from_config(db: Database, config: &AuthConfig) -> Result<Self> {
        let users = SqliteUserStore::new(db.clone()).context("Failed to prepare users table")?;
        let tasks = SqliteTaskStore::new(db).context("Failed to prepare tasks table")?;
        let tokens = TokenIssuer::new(config.secret()?, config.token_ttl_secs);
        let passwords = PasswordPolicy::new(config.password_rounds);
        tracing::info!(
            token_ttl_secs = tokens.ttl_secs(),
            password_rounds = passwords.rounds(),
            "auth configured"
        );
        let auth = Authenticator::new(Arc::new(users), tokens, passwords);
        Ok(Self {
            auth: Arc::new(auth),
            tasks: Arc::new(tasks),
        })
    }
}

/// Build the CORS layer from config. `"*"` in the origin list allows any origin.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let methods = config
        .allowed_methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid CORS method: {m}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let headers = config
        .allowed_headers
        .iter()
        .map(|h| {
            HeaderName::from_bytes(h.trim().as_bytes())
                .with_context(|| format!("Invalid CORS header: {h}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.max_age_secs));

    if config.allowed_origins.iter().any(|o| o.trim() == "*") {
        return Ok(cors.allow_origin(Any));
    }
    let origins = config
        .allowed_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o.trim()).with_context(|| format!("Invalid CORS origin: {o}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(cors.allow_origin(origins))
}

/// Assemble the full router. Task routes only run after the auth gate has
/// attached an [`crate::auth::AuthUser`] to the request.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .route(
            "/api/tasks",
            get(tasks::handle_list).post(tasks::handle_create),
        )
        .route(
            "/api/tasks/{id}",
            patch(tasks::handle_update).delete(tasks::handle_delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_gate::require_auth,
        ));

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .merge(protected)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(middleware::map_response(payload_too_large_as_json))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// The body limit answers 413 with plain text, either up front from
/// `Content-Length` or when an extractor overruns it; clients expect the
/// usual `{"message"}` body.
async fn payload_too_large_as_json(response: Response) -> Response {
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge.into_response();
    }
    response
}

/// Run the HTTP gateway until a shutdown signal arrives.
pub async fn run_gateway(config: Config) -> Result<()> {
    let db = Database::open(&config.database.url, config.database.pool_size)
        .with_context(|| format!("Failed to open database: {}", config.database.url))?;
    let state = AppState::from_config(db, &config.auth)?;
    let cors = cors_layer(&config.gateway.cors)?;
    let app = router(state, cors);

    let (host, port) = (config.gateway.host.as_str(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, database = %config.database.url, "todo API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}

/// Map a body that failed to parse as JSON onto a 400 (413 if it was cut off
/// by the body limit).
pub(crate) fn invalid_request(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge;
    }
    ApiError::validation(format!("Invalid request: {}", rejection.body_text()))
}

fn session_body(message: &str, session: AuthSession) -> Value {
    serde_json::json!({
        "message": message,
        "token": session.token,
        "user": session.user,
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /: service banner listing the endpoint groups.
async fn handle_index() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Todo API Server with Auth",
        "endpoints": {
            "health": "/health",
            "auth": "/api/auth",
            "tasks": "/api/tasks",
        },
    }))
}

/// GET /health, always public
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Server is running!",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "cors": "enabled",
    }))
}

/// POST /api/auth/register: create an account and return its first token.
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = body.map_err(invalid_request)?;
    let session = state.auth.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(session_body("User created successfully!", session)),
    ))
}

/// POST /api/auth/login. `username` may also be the account's email.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(invalid_request)?;
    let session = state.auth.login(request).await?;
    Ok(Json(session_body("Logged in successfully!", session)))
}
