use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;

use crate::models::PairingCodeRow;
use crate::timestamp::{get_ts, to_micros};
use crate::{Database, OptionalExt};

impl Database {
    /// Draw codes from `next_code` until one is not already stored, then insert it.
    ///
    /// Codes are stored uppercase, so the collision check is case-insensitive.
    /// The check and the insert share one immediate transaction. Returns `None`
    /// when every one of `max_attempts` draws collided.
    pub fn create_pairing_code(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        max_attempts: u32,
        next_code: &mut dyn FnMut() -> String,
    ) -> Result<Option<PairingCodeRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            for _ in 0..max_attempts {
                let code = next_code().to_ascii_uppercase();
                let taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM pairing_codes WHERE code = ?1)",
                    [&code],
                    |row| row.get(0),
                )?;
                if taken {
                    continue;
                }

                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO pairing_codes (id, code, user_id, expires_at, used, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                    rusqlite::params![id, code, user_id, to_micros(expires_at), to_micros(now)],
                )?;
                tx.commit()?;

                return Ok(Some(PairingCodeRow {
                    id,
                    code,
                    user_id: user_id.to_string(),
                    expires_at,
                    used: false,
                    created_at: now,
                }));
            }

            Ok(None)
        })
    }

    pub fn find_pairing_code(&self, code: &str) -> Result<Option<PairingCodeRow>> {
        let code = code.to_ascii_uppercase();
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, code, user_id, expires_at, used, created_at
                     FROM pairing_codes WHERE code = ?1",
                    [&code],
                    |row| {
                        Ok(PairingCodeRow {
                            id: row.get(0)?,
                            code: row.get(1)?,
                            user_id: row.get(2)?,
                            expires_at: get_ts(row, 3)?,
                            used: row.get(4)?,
                            created_at: get_ts(row, 5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Flip `used` from false to true. Returns `false` if the code was already
    /// used, so at most one concurrent caller ever gets `true`.
    pub fn claim_pairing_code(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE pairing_codes SET used = 1, updated_at = ?2 WHERE id = ?1 AND used = 0",
                rusqlite::params![id, to_micros(now)],
            )?;
            Ok(changed == 1)
        })
    }

    /// Delete codes that expired before `cutoff`. Returns the number removed.
    pub fn purge_expired_pairing_codes(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM pairing_codes WHERE expires_at < ?1",
                [to_micros(cutoff)],
            )?)
        })
    }
}
