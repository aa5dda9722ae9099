use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use clipsync_db::clips::{ClipFilter, ClipFlag};
use clipsync_db::models::{ClipChanges, ClipRow, NewClip};
use clipsync_types::api::{
    CreateClipRequest, DeletedResponse, LegacySyncRequest, LegacySyncResponse, PushClipItem,
    UpdateClipRequest,
};
use clipsync_types::models::{Clip, Paginated};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{page_window, run_blocking, sync};

/// Previews hold at most this many characters.
pub const PREVIEW_LEN: usize = 200;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub favorite: Option<bool>,
}

/// First `PREVIEW_LEN` characters of `content`. Never splits a UTF-8 sequence.
pub fn content_preview(content: &str) -> String {
    content.chars().take(PREVIEW_LEN).collect()
}

/// Trim tags, drop blanks and keep the first occurrence of each.
pub fn normalize_tags(tags: Option<Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.unwrap_or_default() {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Build an insertable clip with a fresh id. Server timestamps are left to
/// the store, and `copied_at` falls back to the creation time.
pub(crate) fn new_clip(
    user_id: &str,
    content: String,
    device_name: Option<String>,
    tags: Option<Vec<String>>,
    copied_at: Option<DateTime<Utc>>,
) -> NewClip {
    NewClip {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        content_preview: content_preview(&content),
        content,
        copied_at,
        tags: normalize_tags(tags),
        device_name: device_name.filter(|d| !d.trim().is_empty()),
        synced: true,
        created_at: None,
    }
}

pub fn to_clip(row: ClipRow) -> Clip {
    let id = row.id.parse().unwrap_or_else(|_| {
        warn!("Clip row has a malformed id: {}", row.id);
        Uuid::nil()
    });
    Clip {
        id,
        user_id: row.user_id,
        content: row.content,
        content_preview: row.content_preview,
        copied_at: row.copied_at,
        is_favorite: row.is_favorite,
        is_pinned: row.is_pinned,
        tags: row.tags,
        device_name: row.device_name,
        synced: row.synced,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Ids that do not parse are treated the same as ids that do not exist.
fn clip_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::NotFound("Clip not found"))
}

pub async fn list_clips(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ClipQuery>,
) -> Result<Json<Paginated<Clip>>, ApiError> {
    let (page, page_size, offset) = page_window(
        query.page,
        query.page_size,
        DEFAULT_PAGE_SIZE,
        state.config.clip_page_cap,
    );
    let filter = ClipFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        favorites_only: query.favorite.unwrap_or(false),
    };

    let (rows, total) = run_blocking(&state, move |s| {
        Ok(s.db.list_clips(&identity.user_id, &filter, page_size, offset)?)
    })
    .await?;

    let clips = rows.into_iter().map(to_clip).collect();
    Ok(Json(Paginated::new(clips, total, page, page_size)))
}

pub async fn get_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Clip>, ApiError> {
    let id = clip_id(&id)?;
    let row = run_blocking(&state, move |s| Ok(s.db.get_clip(&id, &identity.user_id)?))
        .await?
        .ok_or(ApiError::NotFound("Clip not found"))?;
    Ok(Json(to_clip(row)))
}

pub async fn create_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateClipRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }

    let clip = new_clip(&identity.user_id, req.content, req.device_name, req.tags, None);
    let row = run_blocking(&state, move |s| Ok(s.db.insert_clip(&clip)?)).await?;

    Ok((StatusCode::CREATED, Json(to_clip(row))))
}

pub async fn update_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(req): Json<UpdateClipRequest>,
) -> Result<Json<Clip>, ApiError> {
    let id = clip_id(&id)?;
    if req.content.as_deref() == Some("") {
        return Err(ApiError::bad_request("content must not be empty"));
    }

    let changes = ClipChanges {
        content: req.content,
        is_favorite: req.is_favorite,
        is_pinned: req.is_pinned,
        tags: req.tags.map(|t| normalize_tags(Some(t))),
    };

    let row = run_blocking(&state, move |s| {
        Ok(s.db.update_clip(&id, &identity.user_id, &changes)?)
    })
    .await?
    .ok_or(ApiError::NotFound("Clip not found"))?;

    Ok(Json(to_clip(row)))
}

pub async fn toggle_favorite(
    state: State<AppState>,
    identity: Extension<Identity>,
    id: Path<String>,
) -> Result<Json<Clip>, ApiError> {
    toggle(state, identity, id, ClipFlag::Favorite).await
}

pub async fn toggle_pin(
    state: State<AppState>,
    identity: Extension<Identity>,
    id: Path<String>,
) -> Result<Json<Clip>, ApiError> {
    toggle(state, identity, id, ClipFlag::Pinned).await
}

async fn toggle(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    flag: ClipFlag,
) -> Result<Json<Clip>, ApiError> {
    let id = clip_id(&id)?;
    let row = run_blocking(&state, move |s| {
        Ok(s.db.toggle_clip_flag(&id, &identity.user_id, flag)?)
    })
    .await?
    .ok_or(ApiError::NotFound("Clip not found"))?;
    Ok(Json(to_clip(row)))
}

pub async fn delete_clip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = clip_id(&id)?;
    let deleted = run_blocking(&state, move |s| Ok(s.db.delete_clip(&id, &identity.user_id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Clip not found"));
    }
    Ok(Json(DeletedResponse { deleted: 1 }))
}

pub async fn clear_clips(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = run_blocking(&state, move |s| Ok(s.db.delete_all_clips(&identity.user_id)?)).await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// Older clients upload through here. Runs as a sync push, so the device id is
/// required and its watermark advances, but `copiedAt` is always server time
/// and nothing is ever reported as a conflict.
pub async fn legacy_sync(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<LegacySyncRequest>,
) -> Result<Json<LegacySyncResponse>, ApiError> {
    let items: Vec<PushClipItem> = req
        .clips
        .into_iter()
        .map(|c| PushClipItem {
            content: c.content,
            device_name: c.device_name,
            tags: c.tags,
            copied_at: None,
        })
        .collect();

    let device_id = req.device_id;
    let outcome = run_blocking(&state, move |s| {
        sync::push_clips(s, &identity.user_id, &device_id, items)
    })
    .await?;

    Ok(Json(LegacySyncResponse {
        synced: outcome.synced,
        conflicts: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_to_200_chars() {
        let long = "x".repeat(250);
        assert_eq!(content_preview(&long), "x".repeat(200));

        let short = "y".repeat(50);
        assert_eq!(content_preview(&short), short);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let emoji = "📋".repeat(201);
        let preview = content_preview(&emoji);
        assert_eq!(preview.chars().count(), 200);
        assert!(emoji.starts_with(&preview));
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = normalize_tags(Some(vec![
            "work".into(),
            " work ".into(),
            "".into(),
            "link".into(),
        ]));
        assert_eq!(tags, vec!["work", "link"]);
        assert!(normalize_tags(None).is_empty());
    }

    #[test]
    fn new_clip_defaults() {
        let clip = new_clip("u1", "hello".into(), Some("  ".into()), None, None);
        assert!(clip.synced);
        assert_eq!(clip.content_preview, "hello");
        assert!(clip.copied_at.is_none());
        assert!(clip.created_at.is_none());
        assert!(clip.device_name.is_none());
    }

    #[test]
    fn malformed_ids_look_missing() {
        assert!(matches!(clip_id("nope"), Err(ApiError::NotFound(_))));
        let id = Uuid::new_v4();
        assert_eq!(clip_id(&id.to_string().to_uppercase()).unwrap(), id.to_string());
    }
}
