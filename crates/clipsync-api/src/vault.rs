use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use rand_core::{OsRng, RngCore};
use tracing::{info, warn};
use uuid::Uuid;

use clipsync_db::models::SecureClipRow;
use clipsync_types::api::{
    CreateVaultResponse, SecureClipCreatedResponse, SecureClipRequest, StatusMessage, VaultStatusResponse,
};
use clipsync_types::models::SecureClip;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::run_blocking;

const SALT_LEN: usize = 32;

fn new_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    B64.encode(salt)
}

fn to_secure_clip(row: SecureClipRow) -> SecureClip {
    let id = row.id.parse().unwrap_or_else(|_| {
        warn!("Secure clip row has a malformed id: {}", row.id);
        Uuid::nil()
    });
    SecureClip {
        id,
        user_id: row.user_id,
        encrypted_payload: row.encrypted_payload,
        nonce: row.nonce,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn secure_clip_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::NotFound("Secure clip not found"))
}

fn validate(req: &SecureClipRequest) -> Result<(), ApiError> {
    if req.encrypted_payload.is_empty() || req.nonce.is_empty() {
        return Err(ApiError::bad_request("encryptedPayload and nonce are required"));
    }
    Ok(())
}

pub fn create_user_vault(state: &AppStateInner, user_id: &str) -> Result<CreateVaultResponse, ApiError> {
    let row = state
        .db
        .create_vault(user_id, &new_salt(), Utc::now())?
        .ok_or_else(|| ApiError::Conflict("Vault already exists".into()))?;

    info!("Vault created for user {}", user_id);
    Ok(CreateVaultResponse {
        salt: row.salt,
        created_at: row.created_at,
    })
}

pub fn store_secure_clip(
    state: &AppStateInner,
    user_id: &str,
    req: &SecureClipRequest,
) -> Result<SecureClipCreatedResponse, ApiError> {
    validate(req)?;
    if state.db.get_vault(user_id)?.is_none() {
        return Err(ApiError::Forbidden("Create a vault first".into()));
    }

    let row = state
        .db
        .insert_secure_clip(user_id, &req.encrypted_payload, &req.nonce, Utc::now())?;
    let clip = to_secure_clip(row);
    Ok(SecureClipCreatedResponse {
        id: clip.id,
        created_at: clip.created_at,
    })
}

pub async fn vault_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<VaultStatusResponse>, ApiError> {
    let vault = run_blocking(&state, move |s| Ok(s.db.get_vault(&identity.user_id)?)).await?;
    Ok(Json(match vault {
        Some(v) => VaultStatusResponse {
            exists: true,
            salt: Some(v.salt),
            created_at: Some(v.created_at),
        },
        None => VaultStatusResponse {
            exists: false,
            salt: None,
            created_at: None,
        },
    }))
}

pub async fn create_vault(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = run_blocking(&state, move |s| create_user_vault(s, &identity.user_id)).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn list_secure_clips(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<SecureClip>>, ApiError> {
    let rows = run_blocking(&state, move |s| Ok(s.db.list_secure_clips(&identity.user_id)?)).await?;
    Ok(Json(rows.into_iter().map(to_secure_clip).collect()))
}

pub async fn create_secure_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SecureClipRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = run_blocking(&state, move |s| store_secure_clip(s, &identity.user_id, &req)).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn update_secure_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(req): Json<SecureClipRequest>,
) -> Result<Json<SecureClip>, ApiError> {
    let id = secure_clip_id(&id)?;
    validate(&req)?;

    let row = run_blocking(&state, move |s| {
        Ok(s.db.update_secure_clip(&id, &identity.user_id, &req.encrypted_payload, &req.nonce, Utc::now())?)
    })
    .await?
    .ok_or(ApiError::NotFound("Secure clip not found"))?;
    Ok(Json(to_secure_clip(row)))
}

pub async fn delete_secure_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    let id = secure_clip_id(&id)?;
    let deleted = run_blocking(&state, move |s| {
        Ok(s.db.delete_secure_clip(&id, &identity.user_id)?)
    })
    .await?;
    if !deleted {
        return Err(ApiError::NotFound("Secure clip not found"));
    }
    Ok(Json(StatusMessage {
        message: "Secure clip deleted".into(),
    }))
}
