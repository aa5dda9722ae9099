use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: Uuid,
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

/// SMS/notification message mirrored from a phone. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedMessage {
    pub id: Uuid,
    pub user_id: String,
    pub body: String,
    pub sender: String,
    pub address: String,
    pub received_at: DateTime<Utc>,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

/// Client-encrypted secret. The server only ever sees ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureClip {
    pub id: Uuid,
    pub user_id: String,
    pub encrypted_payload: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, page_size: u32) -> Self {
        let size = i64::from(page_size.max(1));
        Self {
            data,
            total,
            page,
            page_size,
            total_pages: (total + size - 1) / size,
        }
    }
}
