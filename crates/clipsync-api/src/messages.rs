use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use clipsync_db::models::{MessageRow, NewMessage};
use clipsync_types::api::{DeletedResponse, MessagesSinceResponse, PushMessagesRequest, PushMessagesResponse};
use clipsync_types::models::{Paginated, SyncedMessage};

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{page_window, parse_timestamp, run_blocking, sync};

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub since: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<String>,
}

pub fn to_message(row: MessageRow) -> SyncedMessage {
    let id = row.id.parse().unwrap_or_else(|_| {
        warn!("Message row has a malformed id: {}", row.id);
        Uuid::nil()
    });
    SyncedMessage {
        id,
        user_id: row.user_id,
        body: row.body,
        sender: row.sender,
        address: row.address,
        received_at: row.received_at,
        device_id: row.device_id,
        created_at: row.created_at,
    }
}

/// Messages stored after `since`, oldest first. `since` is mandatory.
pub fn list_since(
    state: &AppStateInner,
    user_id: &str,
    since: Option<&str>,
) -> Result<MessagesSinceResponse, ApiError> {
    let raw = since
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("since is required"))?;
    let since = parse_timestamp("since", raw)?;

    let rows = state.db.synced_messages_since(user_id, since)?;
    Ok(MessagesSinceResponse {
        messages: rows.into_iter().map(to_message).collect(),
    })
}

pub fn list_page(
    state: &AppStateInner,
    user_id: &str,
    query: &MessageQuery,
) -> Result<Paginated<SyncedMessage>, ApiError> {
    let since = query
        .since
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_timestamp("since", s))
        .transpose()?;
    let (page, page_size, offset) = page_window(
        query.page,
        query.page_size,
        DEFAULT_PAGE_SIZE,
        state.config.message_page_cap,
    );

    let (rows, total) = state.db.list_synced_messages(user_id, since, page_size, offset)?;
    let data = rows.into_iter().map(to_message).collect();
    Ok(Paginated::new(data, total, page, page_size))
}

/// Store each message independently; empty bodies and failed inserts are skipped.
pub fn push_batch(
    state: &AppStateInner,
    user_id: &str,
    req: PushMessagesRequest,
) -> Result<PushMessagesResponse, ApiError> {
    let device_id = sync::device_id(&req.device_id)?;

    let mut synced = 0;
    let mut failed = Vec::new();
    for (idx, item) in req.messages.into_iter().enumerate() {
        if item.body.is_empty() {
            warn!("Skipping empty message {} from device {}", idx, device_id);
            failed.push(idx);
            continue;
        }

        let msg = NewMessage {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            body: item.body,
            sender: item.sender.unwrap_or_default(),
            address: item.address.unwrap_or_default(),
            received_at: item.received_at,
            device_id: device_id.clone(),
            created_at: None,
        };
        match state.db.insert_synced_message(&msg) {
            Ok(_) => synced += 1,
            Err(e) => {
                warn!("Failed to store message {} from device {}: {:#}", idx, device_id, e);
                failed.push(idx);
            }
        }
    }

    info!("Synced {} messages from device {}", synced, device_id);
    Ok(PushMessagesResponse {
        synced,
        message: format!("Synced {} messages", synced),
        failed,
    })
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Paginated<SyncedMessage>>, ApiError> {
    let page = run_blocking(&state, move |s| list_page(s, &identity.user_id, &query)).await?;
    Ok(Json(page))
}

pub async fn messages_since(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<MessagesSinceResponse>, ApiError> {
    let resp = run_blocking(&state, move |s| {
        list_since(s, &identity.user_id, query.since.as_deref())
    })
    .await?;
    Ok(Json(resp))
}

pub async fn push_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PushMessagesRequest>,
) -> Result<Json<PushMessagesResponse>, ApiError> {
    let resp = run_blocking(&state, move |s| push_batch(s, &identity.user_id, req)).await?;
    Ok(Json(resp))
}

pub async fn clear_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = run_blocking(&state, move |s| {
        Ok(s.db.delete_all_synced_messages(&identity.user_id)?)
    })
    .await?;
    Ok(Json(DeletedResponse { deleted }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::NotFound("Message not found"))?;

    let deleted = run_blocking(&state, move |s| {
        Ok(s.db.delete_synced_message(&id, &identity.user_id)?)
    })
    .await?;
    if !deleted {
        return Err(ApiError::NotFound("Message not found"));
    }
    Ok(Json(DeletedResponse { deleted: 1 }))
}
