use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use huddle_crypto::hash_password;
use huddle_types::{Identity, Room, RoomSummary};

use crate::backend::StorageApi;
use crate::effects::EffectDispatcher;
use crate::error::{AuthorizationError, ClientError};
use crate::session::{RoomSession, SessionEvent, SessionOptions};

/// Shortest password accepted when creating a room.
pub const MIN_PASSWORD_LEN: usize = 4;

/// Room lifecycle outside an open session: create, join, list, leave.
///
/// Passwords are hashed here; backends only ever see the digest.
#[derive(Clone)]
pub struct RoomDirectory<B> {
    backend: B,
}

impl<B: StorageApi> RoomDirectory<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn create_room(
        &self,
        owner: &Identity,
        name: &str,
        password: &str,
    ) -> Result<Room, ClientError> {
        let name = required(name, "Room name")?;
        required(&owner.display_name, "Display name")?;
        required(password, "Password")?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::InvalidInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let room = self
            .backend
            .create_room(name, &hash_password(password), owner)
            .await?;
        info!("Created room {} ({})", room.name, room.id);
        Ok(room)
    }

    /// Join by the id a user typed or pasted.
    ///
    /// Unknown or malformed ids and wrong passwords are
    /// [`ClientError::Authorization`]; nothing is retried.
    pub async fn join_room(
        &self,
        user: &Identity,
        room_id: &str,
        password: &str,
    ) -> Result<Room, ClientError> {
        let room_id = required(room_id, "Room ID")?;
        required(&user.display_name, "Display name")?;
        required(password, "Password")?;
        let room_id: Uuid = room_id
            .parse()
            .map_err(|_| AuthorizationError::RoomNotFound)?;

        let room = self
            .backend
            .join_room(room_id, &hash_password(password), user)
            .await?;
        info!("Joined room {} ({})", room.name, room.id);
        Ok(room)
    }

    pub async fn list_rooms(&self, user_id: Uuid) -> Result<Vec<RoomSummary>, ClientError> {
        Ok(self.backend.list_user_rooms(user_id).await?)
    }

    pub async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> Result<(), ClientError> {
        self.backend.leave_room(room_id, user_id).await?;
        info!("Left room {}", room_id);
        Ok(())
    }

    pub fn open_session(
        &self,
        room_id: Uuid,
        identity: Identity,
        effects: Arc<EffectDispatcher>,
        options: SessionOptions,
    ) -> (RoomSession, mpsc::UnboundedReceiver<SessionEvent>) {
        RoomSession::open(self.backend.clone(), room_id, identity, effects, options)
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, ClientError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ClientError::InvalidInput(format!("{field} is required")));
    }
    Ok(value)
}
