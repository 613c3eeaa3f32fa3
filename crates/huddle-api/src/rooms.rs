use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_types::api::{CreateRoomRequest, JoinRoomRequest};

use crate::error::ServiceError;
use crate::service::RoomService;

pub async fn create_room(
    State(service): State<RoomService>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let room = service.create_room(req).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn join_room(
    State(service): State<RoomService>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(service.join_room(room_id, req).await?))
}

pub async fn list_members(
    State(service): State<RoomService>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(service.list_members(room_id).await?))
}

/// Removing a membership that does not exist is still a success.
pub async fn leave_room(
    State(service): State<RoomService>,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    service.leave_room(room_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_user_rooms(
    State(service): State<RoomService>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(service.list_user_rooms(user_id).await?))
}
