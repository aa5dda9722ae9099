use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Clip, SyncedMessage};

// -- JWT Claims --

/// Bearer token claims. `sub` is the opaque user id handed out by the
/// identity provider; tokens minted by older servers carry it as `userId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "userId")]
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

// -- Account --

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

// -- Pairing --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub deep_link: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyPairingRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPairingResponse {
    pub token: String,
    pub user_id: String,
    pub message: String,
}

// -- Clips --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClipRequest {
    pub content: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateClipRequest {
    pub content: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_pinned: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySyncRequest {
    pub device_id: String,
    pub clips: Vec<CreateClipRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LegacySyncResponse {
    pub synced: usize,
    /// Always empty; kept for clients that still read it.
    pub conflicts: Vec<Clip>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

// -- Sync --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub device_id: String,
    /// RFC 3339 cursor from the previous pull; absent on first sync.
    #[serde(default)]
    pub last_sync: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub clips: Vec<Clip>,
    pub last_sync: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushClipItem {
    pub content: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub copied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: String,
    pub clips: Vec<PushClipItem>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub synced: usize,
    pub last_sync: DateTime<Utc>,
    /// Zero-based indexes of batch items that were skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    /// The Unix epoch when the device has never synced or no device was given.
    pub last_sync: DateTime<Utc>,
    pub total_clips: i64,
    pub unsynced_clips: i64,
    pub device_id: Option<String>,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessageItem {
    pub body: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessagesRequest {
    pub device_id: String,
    pub messages: Vec<PushMessageItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushMessagesResponse {
    pub synced: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesSinceResponse {
    pub messages: Vec<SyncedMessage>,
}

// -- Vault --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatusResponse {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVaultResponse {
    pub salt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecureClipRequest {
    pub encrypted_payload: String,
    pub nonce: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureClipCreatedResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}
