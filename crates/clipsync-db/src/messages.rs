use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Value;
use rusqlite::params_from_iter;

use crate::Database;
use crate::models::{MessageRow, NewMessage};
use crate::timestamp::{get_ts, to_micros};

const MESSAGE_COLUMNS: &str = "id, user_id, body, sender, address, received_at, device_id, created_at";

impl Database {
    pub fn insert_synced_message(&self, msg: &NewMessage) -> Result<MessageRow> {
        let created_at = self.with_conn(|conn| {
            let created_at = msg.created_at.unwrap_or_else(|| self.write_clock());
            conn.execute(
                "INSERT INTO synced_messages (id, user_id, body, sender, address, received_at, device_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.user_id,
                    msg.body,
                    msg.sender,
                    msg.address,
                    to_micros(msg.received_at.unwrap_or(created_at)),
                    msg.device_id,
                    to_micros(created_at),
                ],
            )?;
            Ok(created_at)
        })?;

        Ok(MessageRow {
            id: msg.id.clone(),
            user_id: msg.user_id.clone(),
            body: msg.body.clone(),
            sender: msg.sender.clone(),
            address: msg.address.clone(),
            received_at: msg.received_at.unwrap_or(created_at),
            device_id: msg.device_id.clone(),
            created_at,
        })
    }

    /// One page of messages, most recently received first, plus the total
    /// number of matching messages. `since` filters on server creation time.
    pub fn list_synced_messages(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<MessageRow>, i64)> {
        let mut clause = String::from("user_id = ?1");
        let mut params = vec![Value::Text(user_id.to_string())];
        if let Some(since) = since {
            params.push(Value::Integer(to_micros(since)));
            clause.push_str(&format!(" AND created_at > ?{}", params.len()));
        }

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM synced_messages WHERE {}", clause),
                params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let mut page_params = params.clone();
            page_params.push(Value::Integer(limit as i64));
            page_params.push(Value::Integer(offset as i64));
            let sql = format!(
                "SELECT {} FROM synced_messages WHERE {}
                 ORDER BY received_at DESC, created_at DESC
                 LIMIT ?{} OFFSET ?{}",
                MESSAGE_COLUMNS,
                clause,
                page_params.len() - 1,
                page_params.len()
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(page_params.iter()), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    /// Messages created strictly after `since`, oldest first.
    pub fn synced_messages_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM synced_messages
                 WHERE user_id = ?1 AND created_at > ?2
                 ORDER BY created_at ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, to_micros(since)], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_synced_message(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM synced_messages WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn delete_all_synced_messages(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM synced_messages WHERE user_id = ?1", [user_id])?)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        body: row.get(2)?,
        sender: row.get(3)?,
        address: row.get(4)?,
        received_at: get_ts(row, 5)?,
        device_id: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}
