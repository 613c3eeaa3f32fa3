use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_types::api::{MessageQuery, SendMessageRequest};

use crate::error::ServiceError;
use crate::service::RoomService;

pub async fn send_message(
    State(service): State<RoomService>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let message = service.send_message(room_id, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Most recent `limit` messages of a room, oldest first.
pub async fn get_messages(
    State(service): State<RoomService>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(service.list_messages(room_id, query.limit).await?))
}
