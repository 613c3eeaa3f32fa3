use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use huddle_types::api::DEFAULT_MESSAGE_LIMIT;
use huddle_types::{Member, Message};

use crate::backend::StorageApi;
use crate::error::{BackendError, ClientError};

/// Messages kept per snapshot.
pub const SNAPSHOT_LIMIT: usize = DEFAULT_MESSAGE_LIMIT as usize;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Full reads of a room's messages and members.
///
/// Every failure, including a call that outlives the timeout, comes back as
/// [`ClientError::TransientFetch`]. Callers skip the cycle; they never read a
/// failure as an empty room.
#[derive(Clone)]
pub struct SnapshotFetcher<B> {
    backend: B,
    timeout: Duration,
}

impl<B: StorageApi> SnapshotFetcher<B> {
    pub fn new(backend: B, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// The 100 most recent messages, ascending by `created_at` then `id`.
    pub async fn fetch_messages(&self, room_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let mut messages = self
            .bounded(self.backend.list_messages(room_id, DEFAULT_MESSAGE_LIMIT))
            .await?;

        if !messages.is_sorted_by(|a, b| a.timeline_cmp(b).is_le()) {
            debug!("Snapshot for room {} arrived unsorted", room_id);
            messages.sort_by(Message::timeline_cmp);
        }
        if messages.len() > SNAPSHOT_LIMIT {
            messages.drain(..messages.len() - SNAPSHOT_LIMIT);
        }
        Ok(messages)
    }

    /// All members, ascending by `joined_at`.
    pub async fn fetch_members(&self, room_id: Uuid) -> Result<Vec<Member>, ClientError> {
        let mut members = self.bounded(self.backend.list_members(room_id)).await?;
        members.sort_by_key(|member| member.joined_at);
        Ok(members)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, ClientError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ClientError::TransientFetch(e)),
            Err(_) => Err(ClientError::TransientFetch(BackendError::Timeout(self.timeout))),
        }
    }
}
