use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_types::api::{CreateRoomRequest, ErrorBody, JoinRoomRequest, SendMessageRequest};
use huddle_types::events::{GatewayCommand, GatewayEvent};
use huddle_types::{Identity, Member, Message, Room, RoomSummary};

use super::StorageApi;
use crate::error::BackendError;
use crate::stream::{InsertSubscription, STREAM_BUFFER};

/// Storage behind a `huddle-server`: REST for reads and writes, the
/// `/gateway` WebSocket for insert events.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn gateway_url(&self) -> String {
        let ws_base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/gateway", ws_base)
    }
}

/// Turn a non-2xx response into the matching error.
async fn check(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::NOT_FOUND => Err(BackendError::RoomNotFound),
        StatusCode::FORBIDDEN => Err(BackendError::WrongPassword),
        _ => {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            if status == StatusCode::BAD_REQUEST {
                Err(BackendError::InvalidInput(message))
            } else {
                Err(BackendError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

impl StorageApi for HttpBackend {
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
        let resp = self.client.post(self.url("/rooms")).json(&req).send().await?;
        Ok(check(resp).await?.json().await?)
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
        let resp = self
            .client
            .post(self.url(&format!("/rooms/{}/join", room_id)))
            .json(&req)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> Result<(), BackendError> {
        let resp = self
            .client
            .delete(self.url(&format!("/rooms/{}/members/{}", room_id, user_id)))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_user_rooms(&self, user_id: Uuid) -> Result<Vec<RoomSummary>, BackendError> {
        let resp = self
            .client
            .get(self.url(&format!("/users/{}/rooms", user_id)))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
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
        let resp = self
            .client
            .post(self.url(&format!("/rooms/{}/messages", room_id)))
            .json(&req)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn list_messages(&self, room_id: Uuid, limit: u32) -> Result<Vec<Message>, BackendError> {
        let resp = self
            .client
            .get(self.url(&format!("/rooms/{}/messages", room_id)))
            .query(&[("limit", limit)])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn list_members(&self, room_id: Uuid) -> Result<Vec<Member>, BackendError> {
        let resp = self
            .client
            .get(self.url(&format!("/rooms/{}/members", room_id)))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn subscribe_inserts(&self, room_id: Uuid) -> Result<InsertSubscription, BackendError> {
        let url = self.gateway_url();
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let subscribe = serde_json::to_string(&GatewayCommand::Subscribe {
            room_ids: vec![room_id],
        })?;
        ws_tx.send(WsMessage::Text(subscribe.into())).await?;
        info!("Subscribed to room {} on {}", room_id, url);

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let forwarder = tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Gateway read error for room {}: {}", room_id, e);
                        break;
                    }
                };

                match serde_json::from_str::<GatewayEvent>(&text) {
                    Ok(GatewayEvent::MessageCreate(message)) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(GatewayEvent::Ready { connection_id }) => {
                        debug!("Gateway ready, connection {}", connection_id);
                    }
                    Ok(GatewayEvent::MemberJoin(_)) => {}
                    Err(e) => warn!("Undecodable gateway frame: {}", e),
                }
            }
            // Keep the write half alive until the read loop ends.
            drop(ws_tx);
            warn!("Gateway stream for room {} ended, falling back to polling", room_id);
        });

        Ok(InsertSubscription::new(room_id, rx, forwarder))
    }
}
