use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{delete, get, post},
};

use huddle_gateway::connection;

use crate::{messages, rooms, service::RoomService};

/// Every REST route plus the `/gateway` WebSocket, sharing one service.
pub fn router(service: RoomService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", post(rooms::create_room))
        .route("/rooms/{room_id}/join", post(rooms::join_room))
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/rooms/{room_id}/members", get(rooms::list_members))
        .route("/rooms/{room_id}/members/{user_id}", delete(rooms::leave_room))
        .route("/users/{user_id}/rooms", get(rooms::list_user_rooms))
        .route("/gateway", get(ws_upgrade))
        .with_state(service)
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(State(service): State<RoomService>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = service.dispatcher().clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}
