use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

// Timestamps are fixed-width RFC 3339 strings with microseconds, so text
// order is chronological and `ORDER BY created_at, id` matches timeline order.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS rooms (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            password_hash   TEXT NOT NULL,
            owner_id        TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS members (
            id              TEXT PRIMARY KEY,
            room_id         TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            is_owner        INTEGER NOT NULL DEFAULT 0,
            joined_at       TEXT NOT NULL,
            UNIQUE(room_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_room
            ON members(room_id, joined_at);

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON members(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            room_id             TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            author_id           TEXT NOT NULL,
            author_display_name TEXT NOT NULL,
            content             TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
