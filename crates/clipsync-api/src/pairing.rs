use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use tracing::{info, warn};

use clipsync_types::api::{PairingCodeResponse, VerifyPairingRequest, VerifyPairingResponse};

use crate::auth::{AppState, AppStateInner, issue_token};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::run_blocking;

pub const CODE_LEN: usize = 6;

/// Source of candidate pairing codes.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> String;
}

/// 3 bytes from the OS RNG, rendered as 6 uppercase hex digits.
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn next_code(&self) -> String {
        let mut bytes = [0u8; 3];
        OsRng.fill_bytes(&mut bytes);
        hex::encode_upper(bytes)
    }
}

/// Issue a fresh one-time code for `user_id`.
pub fn generate_code(
    state: &AppStateInner,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<PairingCodeResponse, ApiError> {
    let config = &state.config;
    let expires_at = now + config.pairing_code_ttl;

    let row = state
        .db
        .create_pairing_code(
            user_id,
            now,
            expires_at,
            config.pairing_max_attempts,
            &mut || state.codes.next_code(),
        )?
        .ok_or_else(|| {
            warn!(
                "Pairing code space exhausted after {} attempts",
                config.pairing_max_attempts
            );
            ApiError::Unavailable("Could not allocate a pairing code, try again".into())
        })?;

    info!("Pairing code issued for user {}", user_id);
    Ok(PairingCodeResponse {
        deep_link: format!("{}{}", config.pairing_link_base, row.code),
        code: row.code,
        expires_at: row.expires_at,
    })
}

/// Trim and uppercase a user-typed code, rejecting anything that is not 6 chars.
pub fn normalize_code(raw: &str) -> Result<String, ApiError> {
    let code = raw.trim().to_uppercase();
    if code.chars().count() != CODE_LEN {
        return Err(ApiError::bad_request("Pairing code must be 6 characters"));
    }
    Ok(code)
}

/// Consume a pairing code and mint a token for its owner.
pub fn redeem_code(state: &AppStateInner, raw: &str) -> Result<VerifyPairingResponse, ApiError> {
    redeem_code_at(state, raw, Utc::now())
}

pub fn redeem_code_at(
    state: &AppStateInner,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<VerifyPairingResponse, ApiError> {
    let code = normalize_code(raw)?;

    let row = state
        .db
        .find_pairing_code(&code)?
        .ok_or(ApiError::NotFound("Invalid pairing code"))?;

    if row.used {
        return Err(ApiError::CodeUsed);
    }
    if row.is_expired(now) {
        return Err(ApiError::CodeExpired);
    }

    // Another redeemer may have claimed it between the lookup and here.
    if !state.db.claim_pairing_code(&row.id, now)? {
        return Err(ApiError::CodeUsed);
    }

    let token = issue_token(&state.config, &row.user_id, now)?;
    info!("Device paired to user {}", row.user_id);

    Ok(VerifyPairingResponse {
        token,
        user_id: row.user_id,
        message: "Device paired successfully".into(),
    })
}

pub async fn create_code(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PairingCodeResponse>, ApiError> {
    let resp = run_blocking(&state, move |s| generate_code(s, &identity.user_id, Utc::now())).await?;
    Ok(Json(resp))
}

pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyPairingRequest>,
) -> Result<Json<VerifyPairingResponse>, ApiError> {
    let resp = run_blocking(&state, move |s| redeem_code(s, &req.code)).await?;
    Ok(Json(resp))
}
