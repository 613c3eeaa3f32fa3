//! Huddle room client.
//!
//! A [`RoomSession`] keeps one room's timeline and member list current from
//! two channels at once: a [`PollScheduler`]-driven [`SnapshotFetcher`] and a
//! push [`InsertSubscription`]. Both feed the same [`Reconciler`], which
//! dedups by message id and decides which messages are new enough to drive
//! the [`EffectDispatcher`] exactly once.

pub mod backend;
pub mod config;
pub mod effects;
pub mod error;
pub mod fetcher;
pub mod reconciler;
pub mod rooms;
pub mod scheduler;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testing;

pub use backend::{HttpBackend, LocalBackend, StorageApi};
pub use config::ClientConfig;
pub use effects::{EffectDispatcher, HapticPattern, Haptics, Notification, Notifier, Unsupported};
pub use error::{AuthorizationError, BackendError, CapabilityUnavailable, ClientError};
pub use fetcher::SnapshotFetcher;
pub use reconciler::{MemberDiff, MemberOutcome, MessageOutcome, Reconciler};
pub use rooms::RoomDirectory;
pub use scheduler::{Generation, PollScheduler};
pub use session::{RoomSession, RoomView, SessionEvent, SessionOptions};
pub use stream::InsertSubscription;
