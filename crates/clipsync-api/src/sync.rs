use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use clipsync_types::api::{
    PullRequest, PullResponse, PushClipItem, PushRequest, PushResponse, SyncStatusResponse,
};

use crate::auth::{AppState, AppStateInner};
use crate::clips::{new_clip, to_clip};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{parse_timestamp, run_blocking};

/// Result of a best-effort batch insert.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub synced: usize,
    /// Zero-based indexes of the items that were skipped.
    pub failed: Vec<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub device_id: Option<String>,
}

/// Canonical device id: surrounding whitespace is dropped, blank ids are rejected.
pub(crate) fn device_id(raw: &str) -> Result<String, ApiError> {
    let device_id = raw.trim();
    if device_id.is_empty() {
        return Err(ApiError::bad_request("deviceId is required"));
    }
    Ok(device_id.to_string())
}

/// Insert each item on its own. Empty or failing items are logged and skipped.
fn ingest_clips(
    state: &AppStateInner,
    user_id: &str,
    device_id: &str,
    items: Vec<PushClipItem>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for (idx, item) in items.into_iter().enumerate() {
        if item.content.is_empty() {
            warn!("Skipping empty clip {} from device {}", idx, device_id);
            outcome.failed.push(idx);
            continue;
        }

        let clip = new_clip(user_id, item.content, item.device_name, item.tags, item.copied_at);
        match state.db.insert_clip(&clip) {
            Ok(_) => outcome.synced += 1,
            Err(e) => {
                warn!("Failed to store clip {} from device {}: {:#}", idx, device_id, e);
                outcome.failed.push(idx);
            }
        }
    }

    outcome
}

/// Everything created or updated after `cursor`, then advance the device watermark.
/// The returned `last_sync` is stamped before the read, so feeding it back never
/// skips a clip written while this pull ran.
pub fn pull_clips(
    state: &AppStateInner,
    user_id: &str,
    device_id: &str,
    cursor: Option<DateTime<Utc>>,
) -> Result<PullResponse, ApiError> {
    let device_id = self::device_id(device_id)?;

    let (rows, last_sync) = state.db.pull_changes(user_id, &device_id, cursor)?;

    debug!("Pull for device {}: {} clips", device_id, rows.len());
    Ok(PullResponse {
        clips: rows.into_iter().map(to_clip).collect(),
        last_sync,
    })
}

pub fn push_clips(
    state: &AppStateInner,
    user_id: &str,
    device_id: &str,
    items: Vec<PushClipItem>,
) -> Result<PushResponse, ApiError> {
    let device_id = self::device_id(device_id)?;

    let outcome = ingest_clips(state, user_id, &device_id, items);
    let last_sync = state.db.touch_sync_session(user_id, &device_id)?;

    Ok(PushResponse {
        synced: outcome.synced,
        last_sync,
        failed: outcome.failed,
    })
}

pub fn sync_status(
    state: &AppStateInner,
    user_id: &str,
    device_id: Option<String>,
) -> Result<SyncStatusResponse, ApiError> {
    let device_id = device_id
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let last_sync = match &device_id {
        Some(device) => state.db.get_sync_session(user_id, device)?.map(|s| s.last_sync),
        None => None,
    }
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let counts = state.db.count_clips(user_id)?;

    Ok(SyncStatusResponse {
        last_sync,
        total_clips: counts.total,
        unsynced_clips: counts.unsynced,
        device_id,
    })
}

pub async fn pull(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PullRequest>,
) -> Result<Json<PullResponse>, ApiError> {
    let cursor = req
        .last_sync
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_timestamp("lastSync", s))
        .transpose()?;

    let resp = run_blocking(&state, move |s| {
        pull_clips(s, &identity.user_id, &req.device_id, cursor)
    })
    .await?;
    Ok(Json(resp))
}

pub async fn push(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PushRequest>,
) -> Result<Json<PushResponse>, ApiError> {
    let resp = run_blocking(&state, move |s| {
        push_clips(s, &identity.user_id, &req.device_id, req.clips)
    })
    .await?;
    Ok(Json(resp))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let resp = run_blocking(&state, move |s| {
        sync_status(s, &identity.user_id, query.device_id)
    })
    .await?;
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration;
    use clipsync_db::Database;

    use super::*;
    use crate::config::Config;

    fn state() -> AppStateInner {
        AppStateInner::new(Database::open_in_memory().unwrap(), Config::default())
    }

    fn item(content: &str) -> PushClipItem {
        PushClipItem {
            content: content.into(),
            device_name: Some("laptop".into()),
            tags: None,
            copied_at: None,
        }
    }

    #[test]
    fn pull_after_push_returns_pushed_clips() {
        let state = state();
        let pushed = push_clips(&state, "u1", "dev1", vec![item("a"), item("b"), item("c")]).unwrap();
        assert_eq!(pushed.synced, 3);
        assert!(pushed.failed.is_empty());

        let pulled = pull_clips(&state, "u1", "dev2", None).unwrap();
        assert!(pulled.clips.len() >= 3);
        assert!(pulled.clips.iter().all(|c| c.user_id == "u1"));
    }

    #[test]
    fn pull_with_fresh_cursor_is_empty() {
        let state = state();
        push_clips(&state, "u1", "dev1", vec![item("a")]).unwrap();

        let first = pull_clips(&state, "u1", "dev2", None).unwrap();
        let second = pull_clips(&state, "u1", "dev2", Some(first.last_sync)).unwrap();
        assert!(second.clips.is_empty());

        let old = pull_clips(&state, "u1", "dev2", Some(first.last_sync - Duration::hours(1))).unwrap();
        assert_eq!(old.clips.len(), 1);
    }

    #[test]
    fn same_content_twice_gives_two_clips() {
        let state = state();
        push_clips(&state, "u1", "dev1", vec![item("dup"), item("dup")]).unwrap();

        let pulled = pull_clips(&state, "u1", "dev1", None).unwrap();
        let ids: HashSet<_> = pulled.clips.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn empty_items_are_skipped_not_fatal() {
        let state = state();
        let resp = push_clips(&state, "u1", "dev1", vec![item("ok"), item(""), item("also ok")]).unwrap();
        assert_eq!(resp.synced, 2);
        assert_eq!(resp.failed, vec![1]);
    }

    #[test]
    fn copied_at_is_kept_when_supplied() {
        let state = state();
        let copied = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let mut it = item("dated");
        it.copied_at = Some(copied);
        push_clips(&state, "u1", "dev1", vec![it]).unwrap();

        let pulled = pull_clips(&state, "u1", "dev1", None).unwrap();
        assert_eq!(pulled.clips[0].copied_at, copied);
    }

    #[test]
    fn status_after_push() {
        let state = state();
        let pushed = push_clips(&state, "u1", "dev1", vec![item("hello")]).unwrap();

        let status = sync_status(&state, "u1", Some("dev1".into())).unwrap();
        assert!(status.total_clips >= 1);
        assert_eq!(status.unsynced_clips, 0);
        assert_eq!(status.device_id.as_deref(), Some("dev1"));
        assert_eq!(status.last_sync, pushed.last_sync);

        let unknown = sync_status(&state, "u1", Some("never-synced".into())).unwrap();
        assert_eq!(unknown.last_sync, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(sync_status(&state, "u1", None).unwrap().last_sync, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn clip_written_during_pull_is_not_skipped() {
        let state = state();

        // Another device's insert is stamped after the first pull's cursor.
        let clip = new_clip("u1", "late".into(), None, None, None);
        let first = pull_clips(&state, "u1", "dev2", None).unwrap();
        assert!(first.clips.is_empty());
        state.db.insert_clip(&clip).unwrap();

        let second = pull_clips(&state, "u1", "dev2", Some(first.last_sync)).unwrap();
        assert_eq!(second.clips.len(), 1);
        assert_eq!(second.clips[0].content, "late");
        assert!(second.last_sync > first.last_sync);
    }

    #[test]
    fn device_ids_are_trimmed_everywhere() {
        let state = state();
        let pushed = push_clips(&state, "u1", " dev1 ", vec![item("x")]).unwrap();

        let status = sync_status(&state, "u1", Some("dev1".into())).unwrap();
        assert_eq!(status.device_id.as_deref(), Some("dev1"));
        assert_eq!(status.last_sync, pushed.last_sync);

        let pulled = pull_clips(&state, "u1", "dev1\t", None).unwrap();
        let padded = sync_status(&state, "u1", Some("  dev1".into())).unwrap();
        assert_eq!(padded.device_id.as_deref(), Some("dev1"));
        assert_eq!(padded.last_sync, pulled.last_sync);

        let count: i64 = state
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM sync_sessions", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn blank_device_is_rejected() {
        let state = state();
        assert!(matches!(push_clips(&state, "u1", " ", vec![item("x")]), Err(ApiError::BadRequest(_))));
        assert!(matches!(pull_clips(&state, "u1", "", None), Err(ApiError::BadRequest(_))));
        assert!(sync_status(&state, "u1", Some("   ".into())).unwrap().device_id.is_none());
    }
}
