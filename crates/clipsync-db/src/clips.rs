use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, params_from_iter};

use crate::models::{ClipChanges, ClipRow, NewClip};
use crate::sessions::upsert_session;
use crate::timestamp::{get_ts, to_micros};
use crate::{Database, OptionalExt};

const CLIP_COLUMNS: &str = "id, user_id, content, content_preview, copied_at, is_favorite, \
     is_pinned, tags, device_name, synced, created_at, updated_at";

/// Filters for the paginated clip listing.
#[derive(Debug, Clone, Default)]
pub struct ClipFilter {
    /// Case-insensitive substring match on content or preview.
    pub search: Option<String>,
    pub favorites_only: bool,
}

/// Boolean clip columns that can be flipped in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipFlag {
    Favorite,
    Pinned,
}

impl ClipFlag {
    fn column(self) -> &'static str {
        match self {
            Self::Favorite => "is_favorite",
            Self::Pinned => "is_pinned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipCounts {
    pub total: i64,
    pub unsynced: i64,
}

impl Database {
    pub fn insert_clip(&self, clip: &NewClip) -> Result<ClipRow> {
        let tags = serde_json::to_string(&clip.tags)?;
        let created_at = self.with_conn(|conn| {
            let created_at = clip.created_at.unwrap_or_else(|| self.write_clock());
            conn.execute(
                "INSERT INTO clips (id, user_id, content, content_preview, copied_at, tags, device_name, synced, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                rusqlite::params![
                    clip.id,
                    clip.user_id,
                    clip.content,
                    clip.content_preview,
                    to_micros(clip.copied_at.unwrap_or(created_at)),
                    tags,
                    clip.device_name,
                    clip.synced,
                    to_micros(created_at),
                ],
            )?;
            Ok(created_at)
        })?;

        Ok(ClipRow {
            id: clip.id.clone(),
            user_id: clip.user_id.clone(),
            content: clip.content.clone(),
            content_preview: clip.content_preview.clone(),
            copied_at: clip.copied_at.unwrap_or(created_at),
            is_favorite: false,
            is_pinned: false,
            tags: clip.tags.clone(),
            device_name: clip.device_name.clone(),
            synced: clip.synced,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn get_clip(&self, id: &str, user_id: &str) -> Result<Option<ClipRow>> {
        self.with_conn(|conn| query_clip(conn, id, user_id))
    }

    /// One page of clips, pinned first then most recently copied, plus the
    /// total number of matching clips.
    pub fn list_clips(
        &self,
        user_id: &str,
        filter: &ClipFilter,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<ClipRow>, i64)> {
        let mut clause = String::from("user_id = ?1");
        let mut params = vec![Value::Text(user_id.to_string())];

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(Value::Text(like_pattern(search)));
            clause.push_str(&format!(
                " AND (content LIKE ?{n} ESCAPE '\\' OR content_preview LIKE ?{n} ESCAPE '\\')",
                n = params.len()
            ));
        }
        if filter.favorites_only {
            clause.push_str(" AND is_favorite = 1");
        }

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM clips WHERE {}", clause),
                params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let mut page_params = params.clone();
            page_params.push(Value::Integer(limit as i64));
            page_params.push(Value::Integer(offset as i64));
            let sql = format!(
                "SELECT {} FROM clips WHERE {}
                 ORDER BY is_pinned DESC, copied_at DESC, created_at DESC
                 LIMIT ?{} OFFSET ?{}",
                CLIP_COLUMNS,
                clause,
                page_params.len() - 1,
                page_params.len()
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(page_params.iter()), clip_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    /// Apply a partial update and bump `updated_at`. The preview is never recomputed.
    /// Returns `None` when the clip does not exist for this user.
    pub fn update_clip(&self, id: &str, user_id: &str, changes: &ClipChanges) -> Result<Option<ClipRow>> {
        let mut sets = vec!["updated_at = ?1".to_string()];
        // Slot 1 is filled with the write clock once the lock is held.
        let mut params = vec![Value::Null];

        if let Some(content) = &changes.content {
            params.push(Value::Text(content.clone()));
            sets.push(format!("content = ?{}", params.len()));
        }
        if let Some(fav) = changes.is_favorite {
            params.push(Value::Integer(fav as i64));
            sets.push(format!("is_favorite = ?{}", params.len()));
        }
        if let Some(pinned) = changes.is_pinned {
            params.push(Value::Integer(pinned as i64));
            sets.push(format!("is_pinned = ?{}", params.len()));
        }
        if let Some(tags) = &changes.tags {
            params.push(Value::Text(serde_json::to_string(tags)?));
            sets.push(format!("tags = ?{}", params.len()));
        }

        params.push(Value::Text(id.to_string()));
        params.push(Value::Text(user_id.to_string()));
        let sql = format!(
            "UPDATE clips SET {} WHERE id = ?{} AND user_id = ?{}",
            sets.join(", "),
            params.len() - 1,
            params.len()
        );

        self.with_conn(|conn| {
            let mut params = params;
            params[0] = Value::Integer(to_micros(self.write_clock()));
            let changed = conn.execute(&sql, params_from_iter(params.iter()))?;
            if changed == 0 {
                return Ok(None);
            }
            query_clip(conn, id, user_id)
        })
    }

    /// Flip a boolean column in a single statement.
    pub fn toggle_clip_flag(&self, id: &str, user_id: &str, flag: ClipFlag) -> Result<Option<ClipRow>> {
        let sql = format!(
            "UPDATE clips SET {col} = NOT {col}, updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
            col = flag.column()
        );
        self.with_conn(|conn| {
            let now = self.write_clock();
            let changed = conn.execute(&sql, rusqlite::params![to_micros(now), id, user_id])?;
            if changed == 0 {
                return Ok(None);
            }
            query_clip(conn, id, user_id)
        })
    }

    pub fn delete_clip(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM clips WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn delete_all_clips(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM clips WHERE user_id = ?1", [user_id])?)
        })
    }

    /// Clips created or updated strictly after `since` (all clips when `None`),
    /// newest created first.
    pub fn clips_changed_since(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ClipRow>> {
        self.with_conn(|conn| select_changed(conn, user_id, since))
    }

    /// Stamp a cursor, read everything changed after `since` and record the
    /// cursor as the device's last sync, all under one lock.
    ///
    /// Any write that is not visible to the read is stamped after the cursor,
    /// so the next pull from that cursor picks it up.
    pub fn pull_changes(
        &self,
        user_id: &str,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<(Vec<ClipRow>, DateTime<Utc>)> {
        self.with_conn(|conn| {
            let cursor = self.write_clock();
            let rows = select_changed(conn, user_id, since)?;
            upsert_session(conn, user_id, device_id, cursor)?;
            Ok((rows, cursor))
        })
    }

    pub fn count_clips(&self, user_id: &str) -> Result<ClipCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0)
                 FROM clips WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(ClipCounts {
                        total: row.get(0)?,
                        unsynced: row.get(1)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }
}

fn select_changed(conn: &Connection, user_id: &str, since: Option<DateTime<Utc>>) -> Result<Vec<ClipRow>> {
    let rows = match since {
        Some(since) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM clips
                 WHERE user_id = ?1 AND (created_at > ?2 OR updated_at > ?2)
                 ORDER BY created_at DESC",
                CLIP_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, to_micros(since)], clip_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM clips WHERE user_id = ?1 ORDER BY created_at DESC",
                CLIP_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], clip_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

fn query_clip(conn: &Connection, id: &str, user_id: &str) -> Result<Option<ClipRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM clips WHERE id = ?1 AND user_id = ?2",
        CLIP_COLUMNS
    ))?;
    let row = stmt.query_row((id, user_id), clip_from_row).optional()?;
    Ok(row)
}

fn clip_from_row(row: &Row<'_>) -> rusqlite::Result<ClipRow> {
    let tags_json: String = row.get(7)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(ClipRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        content_preview: row.get(3)?,
        copied_at: get_ts(row, 4)?,
        is_favorite: row.get(5)?,
        is_pinned: row.get(6)?,
        tags,
        device_name: row.get(8)?,
        synced: row.get(9)?,
        created_at: get_ts(row, 10)?,
        updated_at: get_ts(row, 11)?,
    })
}

/// Wrap a search term for `LIKE .. ESCAPE '\'`, escaping wildcards in the term itself.
fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
