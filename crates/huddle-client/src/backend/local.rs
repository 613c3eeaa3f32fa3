use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_api::{RoomService, ServiceError};
use huddle_types::api::{CreateRoomRequest, JoinRoomRequest, SendMessageRequest};
use huddle_types::events::GatewayEvent;
use huddle_types::{Identity, Member, Message, Room, RoomSummary};

use super::StorageApi;
use crate::error::BackendError;
use crate::stream::{InsertSubscription, STREAM_BUFFER};

/// Storage in the same process: a [`RoomService`] and its dispatcher.
#[derive(Clone)]
pub struct LocalBackend {
    service: RoomService,
}

impl LocalBackend {
    pub fn new(service: RoomService) -> Self {
        Self { service }
    }

    /// Backend over a fresh in-memory database.
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(RoomService::in_memory()?))
    }

    pub fn service(&self) -> &RoomService {
        &self.service
    }
}

impl From<ServiceError> for BackendError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RoomNotFound => Self::RoomNotFound,
            ServiceError::WrongPassword => Self::WrongPassword,
            ServiceError::InvalidInput(reason) => Self::InvalidInput(reason),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl StorageApi for LocalBackend {
    async fn create_room(
        &self,
        name: &str,
        password_hash: &str,
        owner: &Identity,
    ) -> Result<Room, BackendError> {
        let req = CreateRoomRequest {
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            owner_id: owner.user_id,
            display_name: owner.display_name.clone(),
        };
        Ok(self.service.create_room(req).await?)
    }

    async fn join_room(
        &self,
        room_id: Uuid,
        password_hash: &str,
        user: &Identity,
    ) -> Result<Room, BackendError> {
        let req = JoinRoomRequest {
            password_hash: password_hash.to_string(),
            user_id: user.user_id,
            display_name: user.display_name.clone(),
        };
        Ok(self.service.join_room(room_id, req).await?)
    }

    async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> Result<(), BackendError> {
        self.service.leave_room(room_id, user_id).await?;
        Ok(())
    }

    async fn list_user_rooms(&self, user_id: Uuid) -> Result<Vec<RoomSummary>, BackendError> {
        Ok(self.service.list_user_rooms(user_id).await?)
    }

    async fn insert_message(
        &self,
        room_id: Uuid,
        author: &Identity,
        content: &str,
    ) -> Result<Message, BackendError> {
        let req = SendMessageRequest {
            user_id: author.user_id,
            display_name: author.display_name.clone(),
            content: content.to_string(),
        };
        Ok(self.service.send_message(room_id, req).await?)
    }

    async fn list_messages(&self, room_id: Uuid, limit: u32) -> Result<Vec<Message>, BackendError> {
        Ok(self.service.list_messages(room_id, limit).await?)
    }

    async fn list_members(&self, room_id: Uuid) -> Result<Vec<Member>, BackendError> {
        Ok(self.service.list_members(room_id).await?)
    }

    async fn subscribe_inserts(&self, room_id: Uuid) -> Result<InsertSubscription, BackendError> {
        // Subscribe before spawning so nothing inserted after this call is missed.
        let mut events = self.service.dispatcher().subscribe();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GatewayEvent::MessageCreate(message)) if message.room_id == room_id => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("Insert stream for room {} lagged by {} events", room_id, n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Local insert forwarder for room {} stopped", room_id);
        });

        Ok(InsertSubscription::new(room_id, rx, forwarder))
    }
}
