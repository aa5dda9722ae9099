use std::sync::Arc;

use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};

use clipsync_db::Database;
use clipsync_types::api::{Claims, MeResponse, StatusMessage};

use crate::config::Config;
use crate::middleware::Identity;
use crate::pairing::{CodeGenerator, RandomCodes};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    pub codes: Box<dyn CodeGenerator>,
}

impl AppStateInner {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config,
            codes: Box::new(RandomCodes),
        }
    }

    /// Swap the pairing code source.
    pub fn with_code_generator(mut self, codes: impl CodeGenerator + 'static) -> Self {
        self.codes = Box::new(codes);
        self
    }
}

/// Mint an HS256 bearer token for `user_id`, valid for the configured TTL.
pub fn issue_token(config: &Config, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
    let iat = now.timestamp().max(0) as usize;
    let exp = (now + config.token_ttl).timestamp().max(0) as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        iat,
        exp,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?)
}

pub async fn me(Extension(identity): Extension<Identity>) -> Json<MeResponse> {
    Json(MeResponse { id: identity.user_id })
}

/// Tokens are stateless; the client just drops its copy.
pub async fn logout(Extension(_identity): Extension<Identity>) -> Json<StatusMessage> {
    Json(StatusMessage {
        message: "Logged out".into(),
    })
}
