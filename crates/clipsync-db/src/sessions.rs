use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::SyncSessionRow;
use crate::timestamp::{get_ts, to_micros};
use crate::{Database, OptionalExt};

/// Create the (user, device) session if missing and set its watermark to `at`.
/// Single upsert statement, so overlapping pull/push cannot create duplicates.
pub(crate) fn upsert_session(conn: &Connection, user_id: &str, device_id: &str, at: DateTime<Utc>) -> Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sync_sessions (id, user_id, device_id, last_sync, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4, ?4)
         ON CONFLICT(user_id, device_id)
         DO UPDATE SET last_sync = excluded.last_sync, updated_at = excluded.updated_at",
        rusqlite::params![id, user_id, device_id, to_micros(at)],
    )?;
    Ok(())
}

impl Database {
    /// Advance the device watermark to the write clock and return the new value.
    pub fn touch_sync_session(&self, user_id: &str, device_id: &str) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let now = self.write_clock();
            upsert_session(conn, user_id, device_id, now)?;
            Ok(now)
        })
    }

    pub fn get_sync_session(&self, user_id: &str, device_id: &str) -> Result<Option<SyncSessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, device_id, last_sync, created_at, updated_at
                     FROM sync_sessions WHERE user_id = ?1 AND device_id = ?2",
                    (user_id, device_id),
                    |row| {
                        Ok(SyncSessionRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            device_id: row.get(2)?,
                            last_sync: get_ts(row, 3)?,
                            created_at: get_ts(row, 4)?,
                            updated_at: get_ts(row, 5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}
