use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use chrono::Duration;

/// JWT secrets that must never reach production.
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "secret",
];

/// Startup configuration, built once in `main` and shared through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Empty means any origin is allowed.
    pub allowed_origins: Vec<String>,
    pub token_ttl: Duration,
    pub pairing_code_ttl: Duration,
    pub pairing_max_attempts: u32,
    pub pairing_link_base: String,
    pub clip_page_cap: u32,
    pub message_page_cap: u32,
    pub max_body_bytes: usize,
    pub cleanup_interval_secs: u64,
    pub pairing_retention: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: "clipsync.db".into(),
            jwt_secret: String::new(),
            allowed_origins: Vec::new(),
            token_ttl: Duration::hours(168),
            pairing_code_ttl: Duration::seconds(300),
            pairing_max_attempts: 16,
            pairing_link_base: "clipsync://pair/".into(),
            clip_page_cap: 100,
            message_page_cap: 100,
            max_body_bytes: 10 * 1024 * 1024,
            cleanup_interval_secs: 3600,
            pairing_retention: Duration::seconds(86_400),
        }
    }
}

impl Config {
    /// Read `CLIPSYNC_*` variables, falling back to defaults. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let allowed_origins = var(&["CLIPSYNC_ALLOWED_ORIGINS"])
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: var(&["CLIPSYNC_HOST"]).unwrap_or(defaults.host),
            port: parsed(&["CLIPSYNC_PORT", "PORT"], defaults.port)?,
            db_path: var(&["CLIPSYNC_DB_PATH"]).map(PathBuf::from).unwrap_or(defaults.db_path),
            jwt_secret: var(&["CLIPSYNC_JWT_SECRET", "JWT_SECRET"]).unwrap_or_default(),
            allowed_origins,
            token_ttl: Duration::hours(parsed(&["CLIPSYNC_TOKEN_TTL_HOURS"], 168)?),
            pairing_code_ttl: Duration::seconds(parsed(&["CLIPSYNC_PAIRING_TTL_SECS"], 300)?),
            pairing_max_attempts: defaults.pairing_max_attempts,
            pairing_link_base: var(&["CLIPSYNC_PAIRING_LINK_BASE"]).unwrap_or(defaults.pairing_link_base),
            clip_page_cap: defaults.clip_page_cap,
            message_page_cap: defaults.message_page_cap,
            max_body_bytes: parsed(&["CLIPSYNC_MAX_BODY_BYTES"], defaults.max_body_bytes)?,
            cleanup_interval_secs: parsed(&["CLIPSYNC_CLEANUP_INTERVAL_SECS"], defaults.cleanup_interval_secs)?,
            pairing_retention: Duration::seconds(parsed(&["CLIPSYNC_PAIRING_RETENTION_SECS"], 86_400)?),
        })
    }

    /// True when the signing secret is unset or one of the known placeholders.
    pub fn has_placeholder_secret(&self) -> bool {
        self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

/// First non-empty value among `keys`.
fn var(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

fn parsed<T>(keys: &[&str], default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(keys) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", keys[0], raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_secrets_are_rejected() {
        let mut config = Config::default();
        assert!(config.has_placeholder_secret());

        config.jwt_secret = "dev-secret-change-me".into();
        assert!(config.has_placeholder_secret());

        config.jwt_secret = "4f9c2a7e1b".into();
        assert!(!config.has_placeholder_secret());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl, Duration::days(7));
        assert_eq!(config.pairing_code_ttl, Duration::minutes(5));
        assert_eq!(config.pairing_link_base, "clipsync://pair/");
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }
}
