//! Types shared by the Huddle storage server, gateway and client.
//!
//! `models` are the domain rows every layer agrees on, `api` holds the REST
//! request bodies, and `events` the JSON frames carried over `/gateway`.

pub mod api;
pub mod events;
pub mod models;

pub use models::{Identity, Member, Message, Room, RoomSummary};
