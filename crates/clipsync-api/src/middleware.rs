use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use clipsync_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

/// Check signature and expiry (no leeway) and return the claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthorized
        })?;

    if data.claims.sub.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    Ok(data.claims)
}

/// Extract and validate the bearer token, then hand the caller's identity to the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::Unauthorized)?;
    let claims = verify_token(&state.config.jwt_secret, bearer.token())?;

    req.extensions_mut().insert(Identity { user_id: claims.sub });
    Ok(next.run(req).await)
}
