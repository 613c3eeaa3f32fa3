use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use huddle_crypto::DIGEST_HEX_LEN;
use huddle_db::{Database, JoinOutcome};
use huddle_gateway::Dispatcher;
use huddle_types::api::{
    CreateRoomRequest, JoinRoomRequest, MAX_MESSAGE_LIMIT, SendMessageRequest,
};
use huddle_types::events::GatewayEvent;
use huddle_types::{Member, Message, Room, RoomSummary};

use crate::error::ServiceError;

type Result<T> = std::result::Result<T, ServiceError>;

/// Room operations over the database, with every insert announced on the
/// gateway so subscribed clients see it without polling.
///
/// All SQLite work runs on the blocking pool.
#[derive(Clone)]
pub struct RoomService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl RoomService {
    pub fn new(db: Database, dispatcher: Dispatcher) -> Self {
        Self {
            db: Arc::new(db),
            dispatcher,
        }
    }

    /// Fresh in-memory database with its own dispatcher.
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, Dispatcher::new()))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn create_room(&self, req: CreateRoomRequest) -> Result<Room> {
        let name = required(&req.name, "room name")?;
        let display_name = required(&req.display_name, "display name")?;
        check_digest(&req.password_hash)?;

        let db = self.db.clone();
        let (room, _owner) = tokio::task::spawn_blocking(move || {
            db.create_room(&name, &req.password_hash, req.owner_id, &display_name)
        })
        .await??;

        info!("Room {} ({}) created by {}", room.name, room.id, room.owner_id);
        Ok(room)
    }

    pub async fn join_room(&self, room_id: Uuid, req: JoinRoomRequest) -> Result<Room> {
        let display_name = required(&req.display_name, "display name")?;
        check_digest(&req.password_hash)?;

        let db = self.db.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            db.join_room(room_id, &req.password_hash, req.user_id, &display_name)
        })
        .await??;

        match outcome {
            JoinOutcome::Joined { room, member } => {
                info!("{} ({}) joined room {}", member.display_name, member.user_id, room.id);
                self.dispatcher.broadcast(GatewayEvent::MemberJoin(member));
                Ok(room)
            }
            JoinOutcome::AlreadyMember(room) => {
                debug!("{} already a member of room {}", req.user_id, room.id);
                Ok(room)
            }
            JoinOutcome::RoomNotFound => Err(ServiceError::RoomNotFound),
            JoinOutcome::WrongPassword => {
                info!("Rejected join of room {} by {}: wrong password", room_id, req.user_id);
                Err(ServiceError::WrongPassword)
            }
        }
    }

    pub async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let db = self.db.clone();
        let removed = tokio::task::spawn_blocking(move || db.leave_room(room_id, user_id)).await??;
        if removed {
            info!("{} left room {}", user_id, room_id);
        }
        Ok(removed)
    }

    pub async fn list_user_rooms(&self, user_id: Uuid) -> Result<Vec<RoomSummary>> {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || db.list_user_rooms(user_id)).await??)
    }

    pub async fn list_members(&self, room_id: Uuid) -> Result<Vec<Member>> {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || db.list_members(room_id)).await??)
    }

    pub async fn list_messages(&self, room_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        let limit = limit.min(MAX_MESSAGE_LIMIT);
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || db.list_messages(room_id, limit)).await??)
    }

    pub async fn send_message(&self, room_id: Uuid, req: SendMessageRequest) -> Result<Message> {
        let content = required(&req.content, "message content")?;

        let db = self.db.clone();
        let message = tokio::task::spawn_blocking(move || {
            if db.get_room(room_id)?.is_none() {
                return Ok(None);
            }
            db.insert_message(room_id, req.user_id, &req.display_name, &content)
                .map(Some)
        })
        .await??
        .ok_or(ServiceError::RoomNotFound)?;

        let receivers = self
            .dispatcher
            .broadcast(GatewayEvent::MessageCreate(message.clone()));
        debug!("Message {} in room {} broadcast to {} listeners", message.id, room_id, receivers);

        Ok(message)
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn check_digest(digest: &str) -> Result<()> {
    if digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ServiceError::InvalidInput(
            "password_hash must be a hex SHA-256 digest".to_string(),
        ))
    }
}
