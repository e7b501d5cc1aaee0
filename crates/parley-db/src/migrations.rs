use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS rooms (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            created_by          TEXT NOT NULL,
            last_message        TEXT NOT NULL DEFAULT '',
            last_message_time   TEXT,
            unread_count        INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS room_participants (
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            user_id     TEXT NOT NULL,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            provisional_id  TEXT,
            sender_id       TEXT NOT NULL,
            sender_name     TEXT NOT NULL,
            room_id         TEXT NOT NULL REFERENCES rooms(id),
            content         TEXT NOT NULL,
            kind            TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            deleted_by      TEXT,
            deleted_at      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, timestamp);

        -- Replays of the same provisional id collide here
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_provisional
            ON messages(sender_id, provisional_id);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS blocked_users (
            blocker_id  TEXT NOT NULL,
            blocked_id  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (blocker_id, blocked_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
