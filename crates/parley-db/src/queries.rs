use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use parley_types::models::{Message, Room};

use crate::Database;
use crate::error::StoreResult;
use crate::models::{MessageRow, RoomRow, format_time};

const MESSAGE_COLUMNS: &str = "id, provisional_id, sender_id, sender_name, room_id, content, kind, \
     timestamp, is_deleted, deleted_by, deleted_at";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, msg: &Message) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (id, provisional_id, sender_id, sender_name, room_id, content, kind, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    msg.id.to_string(),
                    msg.provisional_id,
                    msg.sender_id.to_string(),
                    msg.sender_name,
                    msg.room_id.to_string(),
                    msg.content,
                    msg.kind.as_str(),
                    format_time(&msg.timestamp),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            let row = conn
                .query_row(&sql, [id.to_string()], message_row)
                .optional()?;
            row.map(|row| load_read_by(conn, row)).transpose()
        })
    }

    pub fn get_message_by_provisional(
        &self,
        sender_id: Uuid,
        provisional_id: &str,
    ) -> StoreResult<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE sender_id = ?1 AND provisional_id = ?2",
                MESSAGE_COLUMNS
            );
            let row = conn
                .query_row(&sql, params![sender_id.to_string(), provisional_id], message_row)
                .optional()?;
            row.map(|row| load_read_by(conn, row)).transpose()
        })
    }

    /// Add `reader_id` to the read-by set of every message in the room it did
    /// not send. Returns how many messages gained the reader.
    pub fn mark_room_read(
        &self,
        room_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 SELECT id, ?2, ?3 FROM messages WHERE room_id = ?1 AND sender_id != ?2",
                params![room_id.to_string(), reader_id.to_string(), format_time(&read_at)],
            )?;
            Ok(changed as u64)
        })
    }

    /// Soft delete. Returns false if the message is missing or already deleted.
    pub fn set_message_deleted(
        &self,
        id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1, deleted_by = ?2, deleted_at = ?3
                 WHERE id = ?1 AND is_deleted = 0",
                params![id.to_string(), deleted_by.to_string(), format_time(&deleted_at)],
            )?;
            Ok(changed > 0)
        })
    }

    /// Undo a soft delete. Returns false if the message is missing or not deleted.
    pub fn clear_message_deleted(&self, id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 0, deleted_by = NULL, deleted_at = NULL
                 WHERE id = ?1 AND is_deleted = 1",
                [id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn count_messages(&self, room_id: Uuid) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE room_id = ?1",
                [room_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    // -- Rooms --

    pub fn create_room(
        &self,
        id: Uuid,
        name: &str,
        created_by: Uuid,
        participants: &[Uuid],
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, name, created_by) VALUES (?1, ?2, ?3)",
                params![id.to_string(), name, created_by.to_string()],
            )?;
            for user_id in participants {
                insert_participant(conn, id, *user_id)?;
            }
            Ok(())
        })
    }

    pub fn add_participant(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| insert_participant(conn, room_id, user_id))
    }

    pub fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, created_by, last_message, last_message_time, unread_count
                     FROM rooms WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(RoomRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            created_by: row.get(2)?,
                            last_message: row.get(3)?,
                            last_message_time: row.get(4)?,
                            unread_count: row.get(5)?,
                        })
                    },
                )
                .optional()?;

            let Some(row) = row else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT user_id FROM room_participants WHERE room_id = ?1 ORDER BY rowid",
            )?;
            let participants = stmt
                .query_map([id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            row.into_room(participants).map(Some)
        })
    }

    /// Set the room's last message and bump its unread counter.
    pub fn update_room_summary(
        &self,
        id: Uuid,
        last_message: &str,
        last_message_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE rooms SET last_message = ?2, last_message_time = ?3,
                     unread_count = unread_count + 1, updated_at = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    last_message,
                    format_time(&last_message_time),
                    format_time(&Utc::now()),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn reset_room_unread(&self, id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE rooms SET unread_count = 0, updated_at = ?2 WHERE id = ?1",
                params![id.to_string(), format_time(&Utc::now())],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Blocks --

    pub fn block_user(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blocked_users (blocker_id, blocked_id) VALUES (?1, ?2)",
                params![blocker_id.to_string(), blocked_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn is_blocked(&self, blocker_id: Uuid, blocked_id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM blocked_users WHERE blocker_id = ?1 AND blocked_id = ?2",
                params![blocker_id.to_string(), blocked_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}

fn insert_participant(conn: &Connection, room_id: Uuid, user_id: Uuid) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO room_participants (room_id, user_id) VALUES (?1, ?2)",
        params![room_id.to_string(), user_id.to_string()],
    )?;
    Ok(())
}

fn message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        provisional_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        room_id: row.get(4)?,
        content: row.get(5)?,
        kind: row.get(6)?,
        timestamp: row.get(7)?,
        is_deleted: row.get(8)?,
        deleted_by: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

fn load_read_by(conn: &Connection, row: MessageRow) -> StoreResult<Message> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY read_at")?;
    let read_by = stmt
        .query_map([&row.id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    row.into_message(read_by)
}
