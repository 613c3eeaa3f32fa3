use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// After 2 consecutive unanswered Pings the connection is dropped, ~45s
/// after the last Pong.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one gateway WebSocket until either side goes away.
///
/// The connection starts with no room subscriptions; room-scoped events are
/// forwarded only after the client sends `Subscribe`.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (sender, receiver) = socket.split();
    serve(sender, receiver, dispatcher).await;
}

async fn serve<S, R, E>(mut sender: S, mut receiver: R, dispatcher: Dispatcher)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let conn_id = dispatcher.register_connection().await;
    info!(
        "Gateway connection {} opened ({} live)",
        conn_id,
        dispatcher.connection_count().await
    );

    let ready = GatewayEvent::Ready {
        connection_id: conn_id,
    };
    if send_event(&mut sender, &ready).await.is_err() {
        dispatcher.unregister_connection(conn_id).await;
        return;
    }

    let mut broadcast_rx = dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts -> client, with heartbeat
    let send_dispatcher = dispatcher.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Gateway connection {} lagged by {} events", conn_id, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if let Some(room_id) = event.room_id() {
                        if !send_dispatcher.is_subscribed(conn_id, room_id).await {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on {} (missed {} pongs), dropping connection", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_dispatcher = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_dispatcher, conn_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "Gateway connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_connection(conn_id).await;
    info!(
        "Gateway connection {} closed ({} live)",
        conn_id,
        dispatcher.connection_count().await
    );
}

async fn handle_command(dispatcher: &Dispatcher, conn_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Subscribe { room_ids } => {
            debug!(
                "Gateway connection {} subscribing to {} rooms",
                conn_id,
                room_ids.len()
            );
            dispatcher.set_subscriptions(conn_id, &room_ids).await;
        }
    }
}

async fn send_event<S>(sender: &mut S, event: &GatewayEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
