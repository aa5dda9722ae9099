use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// All timestamps are stored as INTEGER unix microseconds (UTC).
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (clips, sync sessions, pairing codes)");
        conn.execute_batch(
            "
            CREATE TABLE clips (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                content         TEXT NOT NULL,
                content_preview TEXT NOT NULL,
                copied_at       INTEGER NOT NULL,
                is_favorite     INTEGER NOT NULL DEFAULT 0,
                is_pinned       INTEGER NOT NULL DEFAULT 0,
                tags            TEXT NOT NULL DEFAULT '[]',
                device_name     TEXT,
                synced          INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_clips_user_created ON clips(user_id, created_at);
            CREATE INDEX idx_clips_user_updated ON clips(user_id, updated_at);
            CREATE INDEX idx_clips_user_pinned ON clips(user_id, is_pinned, copied_at);

            CREATE TABLE sync_sessions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                device_id   TEXT NOT NULL,
                last_sync   INTEGER NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL,
                UNIQUE(user_id, device_id)
            );

            CREATE TABLE pairing_codes (
                id          TEXT PRIMARY KEY,
                code        TEXT NOT NULL UNIQUE,
                user_id     TEXT NOT NULL,
                expires_at  INTEGER NOT NULL,
                used        INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_pairing_expires ON pairing_codes(expires_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (synced messages, vaults, secure clips)");
        conn.execute_batch(
            "
            CREATE TABLE synced_messages (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                body        TEXT NOT NULL,
                sender      TEXT NOT NULL DEFAULT '',
                address     TEXT NOT NULL DEFAULT '',
                received_at INTEGER NOT NULL,
                device_id   TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_user_created ON synced_messages(user_id, created_at);
            CREATE INDEX idx_messages_user_received ON synced_messages(user_id, received_at);

            CREATE TABLE user_vaults (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL UNIQUE,
                salt        TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE secure_clips (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                encrypted_payload   TEXT NOT NULL,
                nonce               TEXT NOT NULL,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );

            CREATE INDEX idx_secure_clips_user ON secure_clips(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
