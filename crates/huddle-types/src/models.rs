use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A password-protected chat room. The password digest stays in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A room as shown in a user's room list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: Room,
    pub member_count: usize,
}

/// One membership row. At most one exists per `(room_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub is_owner: bool,
    pub joined_at: DateTime<Utc>,
}

/// A chat message. Immutable once the server has assigned `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub author_display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Authoritative timeline order: `created_at`, then `id` as tiebreaker.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// The local user of a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }

    /// A fresh identity with a random user id.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), display_name)
    }
}
