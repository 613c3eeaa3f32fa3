use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Rooms --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    /// Hex SHA-256 digest of the room password, computed client-side.
    pub password_hash: String,
    pub owner_id: Uuid,
    /// Display name of the owner's membership row.
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomRequest {
    pub password_hash: String,
    pub user_id: Uuid,
    pub display_name: String,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub user_id: Uuid,
    pub display_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Snapshot size the client polls for.
pub const DEFAULT_MESSAGE_LIMIT: u32 = 100;

/// Hard cap on a single message page.
pub const MAX_MESSAGE_LIMIT: u32 = 200;

fn default_limit() -> u32 {
    DEFAULT_MESSAGE_LIMIT
}

// -- Errors --

/// JSON body returned alongside non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
