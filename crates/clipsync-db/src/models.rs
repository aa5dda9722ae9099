//! Row types that map directly to SQLite rows.
//! Kept separate from the clipsync-types wire models so storage stays independent.
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ClipRow {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub content_preview: String,
    pub copied_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub is_pinned: bool,
    pub tags: Vec<String>,
    pub device_name: Option<String>,
    pub synced: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert a clip. Timestamps left as `None` are taken
/// from the write clock while the insert holds the connection.
#[derive(Debug, Clone)]
pub struct NewClip {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub content_preview: String,
    /// Defaults to the creation time.
    pub copied_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub device_name: Option<String>,
    pub synced: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial clip update; `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct ClipChanges {
    pub content: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_pinned: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SyncSessionRow {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PairingCodeRow {
    pub id: String,
    pub code: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PairingCodeRow {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub body: String,
    pub sender: String,
    pub address: String,
    pub received_at: DateTime<Utc>,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub user_id: String,
    pub body: String,
    pub sender: String,
    pub address: String,
    /// Defaults to the creation time.
    pub received_at: Option<DateTime<Utc>>,
    pub device_id: String,
    /// `None` stamps from the write clock inside the insert.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct VaultRow {
    pub id: String,
    pub user_id: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SecureClipRow {
    pub id: String,
    pub user_id: String,
    pub encrypted_payload: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
