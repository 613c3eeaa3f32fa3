//! In-memory [`StorageApi`] with failure and latency knobs.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use huddle_types::{Identity, Member, Message, Room, RoomSummary};

use crate::backend::StorageApi;
use crate::error::BackendError;
use crate::stream::InsertSubscription;

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    members: Vec<Member>,
    subscribers: Vec<mpsc::Sender<Message>>,
    clock: i64,
    fetch_delay: Duration,
    fail_fetches: bool,
    fail_sends: bool,
    refuse_subscriptions: bool,
    message_fetches: usize,
}

#[derive(Clone)]
pub struct FakeBackend {
    room_id: Uuid,
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new(room_id: Uuid) -> Self {
        Self {
            room_id,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn next_timestamp(state: &mut State) -> DateTime<Utc> {
        state.clock += 1;
        Utc.timestamp_opt(1_700_000_000 + state.clock, 0).unwrap()
    }

    /// Store a message from a remote author without streaming it.
    pub fn store_message(&self, author: &str, content: &str) -> Message {
        let mut state = self.state();
        let message = Message {
            id: Uuid::new_v4(),
            room_id: self.room_id,
            author_id: Uuid::from_u128(0xff),
            author_display_name: author.into(),
            content: content.into(),
            created_at: Self::next_timestamp(&mut state),
        };
        state.messages.push(message.clone());
        message
    }

    /// Push a message to every live subscriber.
    pub fn stream(&self, message: &Message) {
        for tx in &self.state().subscribers {
            let _ = tx.try_send(message.clone());
        }
    }

    pub fn add_member(&self, user: u128, display_name: &str) -> Member {
        let mut state = self.state();
        let member = Member {
            id: Uuid::new_v4(),
            room_id: self.room_id,
            user_id: Uuid::from_u128(user),
            display_name: display_name.into(),
            is_owner: state.members.is_empty(),
            joined_at: Self::next_timestamp(&mut state),
        };
        state.members.push(member.clone());
        member
    }

    pub fn members(&self) -> Vec<Member> {
        self.state().members.clone()
    }

    pub fn clear_messages(&self) {
        self.state().messages.clear();
    }

    pub fn message_count(&self) -> usize {
        self.state().messages.len()
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = delay;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.state().fail_fetches = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    pub fn refuse_subscriptions(&self) {
        self.state().refuse_subscriptions = true;
    }

    pub fn message_fetches(&self) -> usize {
        self.state().message_fetches
    }

    pub fn live_subscribers(&self) -> usize {
        self.state()
            .subscribers
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    pub async fn wait_for_subscriber(&self) {
        while self.live_subscribers() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn read<T>(&self, read: impl FnOnce(&mut State) -> T) -> Result<T, BackendError> {
        let (value, delay, fail) = {
            let mut state = self.state();
            let value = read(&mut state);
            (value, state.fetch_delay, state.fail_fetches)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BackendError::Storage("fetch refused".into()));
        }
        Ok(value)
    }
}

impl StorageApi for FakeBackend {
    async fn create_room(
        &self,
        name: &str,
        _password_hash: &str,
        owner: &Identity,
    ) -> Result<Room, BackendError> {
        Ok(Room {
            id: self.room_id,
            name: name.into(),
            owner_id: owner.user_id,
            created_at: Utc::now(),
        })
    }

    async fn join_room(
        &self,
        _room_id: Uuid,
        _password_hash: &str,
        _user: &Identity,
    ) -> Result<Room, BackendError> {
        Err(BackendError::RoomNotFound)
    }

    async fn leave_room(&self, _room_id: Uuid, _user_id: Uuid) -> Result<(), BackendError> {
        Ok(())
    }

    async fn list_user_rooms(&self, _user_id: Uuid) -> Result<Vec<RoomSummary>, BackendError> {
        Ok(Vec::new())
    }

    async fn insert_message(
        &self,
        room_id: Uuid,
        author: &Identity,
        content: &str,
    ) -> Result<Message, BackendError> {
        let message = {
            let mut state = self.state();
            if state.fail_sends {
                return Err(BackendError::Storage("insert refused".into()));
            }
            let message = Message {
                id: Uuid::new_v4(),
                room_id,
                author_id: author.user_id,
                author_display_name: author.display_name.clone(),
                content: content.into(),
                created_at: Self::next_timestamp(&mut state),
            };
            state.messages.push(message.clone());
            message
        };
        self.stream(&message);
        Ok(message)
    }

    async fn list_messages(&self, _room_id: Uuid, limit: u32) -> Result<Vec<Message>, BackendError> {
        self.read(|state| {
            state.message_fetches += 1;
            let skip = state.messages.len().saturating_sub(limit as usize);
            state.messages[skip..].to_vec()
        })
        .await
    }

    async fn list_members(&self, _room_id: Uuid) -> Result<Vec<Member>, BackendError> {
        self.read(|state| state.members.clone()).await
    }

    async fn subscribe_inserts(&self, room_id: Uuid) -> Result<InsertSubscription, BackendError> {
        let mut state = self.state();
        if state.refuse_subscriptions {
            return Err(BackendError::Storage("no push channel".into()));
        }
        let (tx, sub) = InsertSubscription::channel(room_id);
        state.subscribers.push(tx);
        Ok(sub)
    }
}
