use crate::Database;
use crate::models::{JoinOutcome, MemberRow, MessageRow, RoomRow, now, timestamp};
use anyhow::Result;
use huddle_crypto::digests_match;
use huddle_types::{Member, Message, Room, RoomSummary};
use rusqlite::{Connection, Row};
use uuid::Uuid;

impl Database {
    // -- Rooms --

    /// Create a room and its owner's membership row in one transaction.
    pub fn create_room(
        &self,
        name: &str,
        password_hash: &str,
        owner_id: Uuid,
        display_name: &str,
    ) -> Result<(Room, Member)> {
        let created_at = now();
        let room = Room {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id,
            created_at,
        };
        let member = Member {
            id: Uuid::new_v4(),
            room_id: room.id,
            user_id: owner_id,
            display_name: display_name.to_string(),
            is_owner: true,
            joined_at: created_at,
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO rooms (id, name, password_hash, owner_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    room.id.to_string(),
                    room.name,
                    password_hash,
                    owner_id.to_string(),
                    timestamp(created_at)
                ],
            )?;
            insert_member(&tx, &member)?;
            tx.commit()?;
            Ok(())
        })?;

        Ok((room, member))
    }

    pub fn get_room(&self, room_id: Uuid) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, room_id))
    }

    /// Check the password digest and add a membership row if there is none.
    pub fn join_room(
        &self,
        room_id: Uuid,
        password_hash: &str,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(row) = query_room(&tx, room_id)? else {
                return Ok(JoinOutcome::RoomNotFound);
            };
            if !digests_match(&row.password_hash, password_hash) {
                return Ok(JoinOutcome::WrongPassword);
            }
            let room = Room::try_from(row)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM members WHERE room_id = ?1 AND user_id = ?2",
                    [room_id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(JoinOutcome::AlreadyMember(room));
            }

            let member = Member {
                id: Uuid::new_v4(),
                room_id,
                user_id,
                display_name: display_name.to_string(),
                is_owner: false,
                joined_at: now(),
            };
            insert_member(&tx, &member)?;
            tx.commit()?;

            Ok(JoinOutcome::Joined { room, member })
        })
    }

    /// Remove a user's membership. Returns false when there was none.
    pub fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM members WHERE room_id = ?1 AND user_id = ?2",
                [room_id.to_string(), user_id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    /// Rooms the user belongs to, newest first, with live member counts.
    pub fn list_user_rooms(&self, user_id: Uuid) -> Result<Vec<RoomSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.name, r.password_hash, r.owner_id, r.created_at,
                        (SELECT COUNT(*) FROM members c WHERE c.room_id = r.id)
                 FROM rooms r
                 JOIN members m ON m.room_id = r.id
                 WHERE m.user_id = ?1
                 ORDER BY r.created_at DESC, r.id DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((room_row(row)?, row.get::<_, i64>(5)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(row, count)| {
                    Ok(RoomSummary {
                        room: Room::try_from(row)?,
                        member_count: usize::try_from(count)?,
                    })
                })
                .collect()
        })
    }

    // -- Members --

    /// All members of a room, oldest join first.
    pub fn list_members(&self, room_id: Uuid) -> Result<Vec<Member>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, user_id, display_name, is_owner, joined_at
                 FROM members
                 WHERE room_id = ?1
                 ORDER BY joined_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([room_id.to_string()], |row| {
                    Ok(MemberRow {
                        id: row.get(0)?,
                        room_id: row.get(1)?,
                        user_id: row.get(2)?,
                        display_name: row.get(3)?,
                        is_owner: row.get(4)?,
                        joined_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Member::try_from).collect()
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        author_display_name: &str,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            room_id,
            author_id,
            author_display_name: author_display_name.to_string(),
            content: content.to_string(),
            created_at: now(),
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, author_id, author_display_name, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id.to_string(),
                    room_id.to_string(),
                    author_id.to_string(),
                    message.author_display_name,
                    message.content,
                    timestamp(message.created_at)
                ],
            )?;
            Ok(())
        })?;

        Ok(message)
    }

    /// The `limit` most recent messages of a room, in ascending timeline order.
    pub fn list_messages(&self, room_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, author_id, author_display_name, content, created_at
                 FROM messages
                 WHERE room_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt
                .query_map(rusqlite::params![room_id.to_string(), limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        room_id: row.get(1)?,
                        author_id: row.get(2)?,
                        author_display_name: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();

            rows.into_iter().map(Message::try_from).collect()
        })
    }
}

fn insert_member(conn: &Connection, member: &Member) -> Result<()> {
    conn.execute(
        "INSERT INTO members (id, room_id, user_id, display_name, is_owner, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            member.id.to_string(),
            member.room_id.to_string(),
            member.user_id.to_string(),
            member.display_name,
            member.is_owner,
            timestamp(member.joined_at)
        ],
    )?;
    Ok(())
}

fn room_row(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_room(conn: &Connection, room_id: Uuid) -> Result<Option<RoomRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, password_hash, owner_id, created_at FROM rooms WHERE id = ?1",
    )?;

    let row = stmt.query_row([room_id.to_string()], room_row).optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
