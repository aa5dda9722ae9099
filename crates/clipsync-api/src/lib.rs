//! HTTP surface of the ClipSync server: pairing, clip sync, message mirroring
//! and the encrypted vault, all behind bearer-token auth.

pub mod auth;
pub mod clips;
pub mod config;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pairing;
pub mod sync;
pub mod vault;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::auth::{AppState, AppStateInner};
use crate::config::Config;
use crate::error::ApiError;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/pairing/verify", post(pairing::verify_code));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/pairing/code", get(pairing::create_code))
        .route(
            "/api/clips",
            get(clips::list_clips).post(clips::create_clip).delete(clips::clear_clips),
        )
        .route("/api/clips/sync", post(clips::legacy_sync))
        .route(
            "/api/clips/{id}",
            get(clips::get_clip).put(clips::update_clip).delete(clips::delete_clip),
        )
        .route("/api/clips/{id}/favorite", put(clips::toggle_favorite))
        .route("/api/clips/{id}/pin", put(clips::toggle_pin))
        .route("/api/sync/status", get(sync::status))
        .route("/api/sync/pull", post(sync::pull))
        .route("/api/sync/push", post(sync::push))
        .route(
            "/api/messages",
            get(messages::list_messages).delete(messages::clear_messages),
        )
        .route("/api/messages/new", get(messages::messages_since))
        .route("/api/messages/push", post(messages::push_messages))
        .route("/api/messages/{id}", delete(messages::delete_message))
        .route("/api/secure/vault", get(vault::vault_status).post(vault::create_vault))
        .route(
            "/api/secure/clips",
            get(vault::list_secure_clips).post(vault::create_secure_clip),
        )
        .route(
            "/api/secure/clips/{id}",
            put(vault::update_secure_clip).delete(vault::delete_secure_clip),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

/// Run a storage-bound closure off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}

/// Parse an RFC 3339 timestamp supplied by a client.
pub(crate) fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request(format!("{} must be an RFC 3339 timestamp", field)))
}

/// Effective (page, page_size, offset). Page is at least 1; size is clamped to 1..=cap.
pub(crate) fn page_window(page: Option<u32>, page_size: Option<u32>, default_size: u32, cap: u32) -> (u32, u32, u64) {
    let page = page.unwrap_or(1).max(1);
    let size = page_size.unwrap_or(default_size).clamp(1, cap.max(1));
    let offset = u64::from(page - 1) * u64::from(size);
    (page, size, offset)
}
