use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::models::{SecureClipRow, VaultRow};
use crate::timestamp::{get_ts, to_micros};
use crate::{Database, OptionalExt};

impl Database {
    // -- Vaults --

    pub fn get_vault(&self, user_id: &str) -> Result<Option<VaultRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, salt, created_at FROM user_vaults WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(VaultRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            salt: row.get(2)?,
                            created_at: get_ts(row, 3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Insert the user's vault. Returns `None` if the user already has one.
    pub fn create_vault(&self, user_id: &str, salt: &str, now: DateTime<Utc>) -> Result<Option<VaultRow>> {
        let id = uuid::Uuid::new_v4().to_string();
        let inserted = self.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO user_vaults (id, user_id, salt, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(user_id) DO NOTHING",
                rusqlite::params![id, user_id, salt, to_micros(now)],
            )?)
        })?;

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(VaultRow {
            id,
            user_id: user_id.to_string(),
            salt: salt.to_string(),
            created_at: now,
        }))
    }

    // -- Secure clips --

    pub fn insert_secure_clip(
        &self,
        user_id: &str,
        encrypted_payload: &str,
        nonce: &str,
        now: DateTime<Utc>,
    ) -> Result<SecureClipRow> {
        let id = uuid::Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO secure_clips (id, user_id, encrypted_payload, nonce, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, user_id, encrypted_payload, nonce, to_micros(now)],
            )?;
            Ok(())
        })?;

        Ok(SecureClipRow {
            id,
            user_id: user_id.to_string(),
            encrypted_payload: encrypted_payload.to_string(),
            nonce: nonce.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn list_secure_clips(&self, user_id: &str) -> Result<Vec<SecureClipRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, encrypted_payload, nonce, created_at, updated_at
                 FROM secure_clips WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], secure_clip_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_secure_clip(
        &self,
        id: &str,
        user_id: &str,
        encrypted_payload: &str,
        nonce: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SecureClipRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE secure_clips SET encrypted_payload = ?1, nonce = ?2, updated_at = ?3
                 WHERE id = ?4 AND user_id = ?5",
                rusqlite::params![encrypted_payload, nonce, to_micros(now), id, user_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let row = conn
                .query_row(
                    "SELECT id, user_id, encrypted_payload, nonce, created_at, updated_at
                     FROM secure_clips WHERE id = ?1 AND user_id = ?2",
                    (id, user_id),
                    secure_clip_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_secure_clip(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM secure_clips WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }
}

fn secure_clip_from_row(row: &Row<'_>) -> rusqlite::Result<SecureClipRow> {
    Ok(SecureClipRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        encrypted_payload: row.get(2)?,
        nonce: row.get(3)?,
        created_at: get_ts(row, 4)?,
        updated_at: get_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_is_created_once() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_vault("u1").unwrap().is_none());

        let vault = db.create_vault("u1", "c2FsdA==", Utc::now()).unwrap().unwrap();
        assert!(db.create_vault("u1", "b3RoZXI=", Utc::now()).unwrap().is_none());

        let stored = db.get_vault("u1").unwrap().unwrap();
        assert_eq!(stored.id, vault.id);
        assert_eq!(stored.salt, "c2FsdA==");
    }

    #[test]
    fn secure_clips_are_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        let clip = db.insert_secure_clip("u1", "cipher", "nonce", Utc::now()).unwrap();

        assert!(db.update_secure_clip(&clip.id, "u2", "x", "y", Utc::now()).unwrap().is_none());
        let updated = db.update_secure_clip(&clip.id, "u1", "cipher2", "nonce2", Utc::now()).unwrap().unwrap();
        assert_eq!(updated.encrypted_payload, "cipher2");

        assert!(db.list_secure_clips("u2").unwrap().is_empty());
        assert_eq!(db.list_secure_clips("u1").unwrap().len(), 1);

        assert!(!db.delete_secure_clip(&clip.id, "u2").unwrap());
        assert!(db.delete_secure_clip(&clip.id, "u1").unwrap());
    }
}
