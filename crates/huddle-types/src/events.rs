use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Member, Message};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server accepted the connection
    Ready { connection_id: Uuid },

    /// A message was inserted into a room
    MessageCreate(Message),

    /// A user joined a room for the first time
    MemberJoin(Member),
}

impl GatewayEvent {
    /// Returns the room_id if this event is scoped to a specific room.
    /// Events that return `None` go to every connection.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate(message) => Some(message.room_id),
            Self::MemberJoin(member) => Some(member.room_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Replace the set of rooms whose events this connection receives.
    Subscribe { room_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn message_create_is_scoped_to_its_room() {
        let room_id = Uuid::new_v4();
        let event = GatewayEvent::MessageCreate(Message {
            id: Uuid::new_v4(),
            room_id,
            author_id: Uuid::new_v4(),
            author_display_name: "A".into(),
            content: "hi".into(),
            created_at: Utc::now(),
        });

        assert_eq!(event.room_id(), Some(room_id));
        assert_eq!(GatewayEvent::Ready { connection_id: Uuid::nil() }.room_id(), None);
    }

    #[test]
    fn subscribe_command_wire_format() {
        let room_id = Uuid::nil();
        let json = serde_json::to_string(&GatewayCommand::Subscribe {
            room_ids: vec![room_id],
        })
        .unwrap();

        assert_eq!(
            json,
            r#"{"type":"Subscribe","data":{"room_ids":["00000000-0000-0000-0000-000000000000"]}}"#
        );
        let parsed: GatewayCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GatewayCommand::Subscribe { room_ids: vec![room_id] });
    }
}
