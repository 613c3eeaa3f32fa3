/// Database row types — these map directly to SQLite rows.
/// Distinct from huddle-types models to keep the DB layer independent;
/// `TryFrom` parses the stored text back into typed ids and timestamps.
use anyhow::{Context, Error, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use huddle_types::{Member, Message, Room};
use uuid::Uuid;

pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub password_hash: String,
    pub owner_id: String,
    pub created_at: String,
}

pub struct MemberRow {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    pub is_owner: bool,
    pub joined_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub content: String,
    pub created_at: String,
}

/// Result of a join attempt. Authorization failures are outcomes, not errors,
/// so callers can tell them apart from storage faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { room: Room, member: Member },
    AlreadyMember(Room),
    RoomNotFound,
    WrongPassword,
}

/// Current time at the precision timestamps are stored with, so rows
/// returned from an insert compare equal to the same rows read back.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {field} '{raw}'"))
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("corrupt {field} '{raw}'"))
}

impl TryFrom<RoomRow> for Room {
    type Error = Error;

    fn try_from(row: RoomRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id, "room id")?,
            owner_id: parse_id(&row.owner_id, "owner_id")?,
            created_at: parse_timestamp(&row.created_at, "room created_at")?,
            name: row.name,
        })
    }
}

impl TryFrom<MemberRow> for Member {
    type Error = Error;

    fn try_from(row: MemberRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id, "member id")?,
            room_id: parse_id(&row.room_id, "member room_id")?,
            user_id: parse_id(&row.user_id, "member user_id")?,
            joined_at: parse_timestamp(&row.joined_at, "joined_at")?,
            display_name: row.display_name,
            is_owner: row.is_owner,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id, "message id")?,
            room_id: parse_id(&row.room_id, "message room_id")?,
            author_id: parse_id(&row.author_id, "author_id")?,
            created_at: parse_timestamp(&row.created_at, "message created_at")?,
            author_display_name: row.author_display_name,
            content: row.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let early = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
        let late = Utc.timestamp_opt(1_700_000_000, 120_000_000).unwrap();

        let (a, b) = (timestamp(early), timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&a, "t").unwrap(), early);
    }

    #[test]
    fn corrupt_row_is_an_error() {
        let row = MessageRow {
            id: "not-a-uuid".into(),
            room_id: Uuid::nil().to_string(),
            author_id: Uuid::nil().to_string(),
            author_display_name: "A".into(),
            content: "hi".into(),
            created_at: timestamp(Utc::now()),
        };
        let err = Message::try_from(row).unwrap_err();
        assert!(err.to_string().contains("corrupt message id"));
    }
}
