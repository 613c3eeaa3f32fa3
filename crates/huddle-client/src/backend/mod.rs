//! Storage backends a room client can talk to.

pub mod http;
pub mod local;

use std::future::Future;

use uuid::Uuid;

use huddle_types::{Identity, Member, Message, Room, RoomSummary};

use crate::error::BackendError;
use crate::stream::InsertSubscription;

pub use http::HttpBackend;
pub use local::LocalBackend;

/// Rooms, members and messages as seen by a client.
///
/// `password_hash` is always the hex digest from [`huddle_crypto::hash_password`];
/// plaintext passwords never reach a backend.
pub trait StorageApi: Clone + Send + Sync + 'static {
    fn create_room(
        &self,
        name: &str,
        password_hash: &str,
        owner: &Identity,
    ) -> impl Future<Output = Result<Room, BackendError>> + Send;

    /// Idempotent: joining a room twice keeps the first membership.
    fn join_room(
        &self,
        room_id: Uuid,
        password_hash: &str,
        user: &Identity,
    ) -> impl Future<Output = Result<Room, BackendError>> + Send;

    fn leave_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Rooms `user_id` belongs to, newest first.
    fn list_user_rooms(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<RoomSummary>, BackendError>> + Send;

    fn insert_message(
        &self,
        room_id: Uuid,
        author: &Identity,
        content: &str,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// The most recent `limit` messages, oldest first.
    fn list_messages(
        &self,
        room_id: Uuid,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    /// Members ordered by join time.
    fn list_members(
        &self,
        room_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Member>, BackendError>> + Send;

    fn subscribe_inserts(
        &self,
        room_id: Uuid,
    ) -> impl Future<Output = Result<InsertSubscription, BackendError>> + Send;
}
