use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_types::{Identity, Member, Message};

use crate::backend::StorageApi;
use crate::effects::EffectDispatcher;
use crate::error::{BackendError, ClientError};
use crate::fetcher::{DEFAULT_FETCH_TIMEOUT, SnapshotFetcher};
use crate::reconciler::{MemberOutcome, MessageOutcome, Reconciler};
use crate::scheduler::{DEFAULT_POLL_INTERVAL, Generation, PollScheduler};
use crate::stream::InsertSubscription;

/// What a session reports to its consumer. Each event is a minimal diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A snapshot replaced the whole timeline.
    TimelineReplaced { messages: Vec<Message> },
    /// One message was appended at the tail.
    MessageAppended(Message),
    MembersChanged {
        members: Vec<Member>,
        joined: Vec<Member>,
        left: Vec<Member>,
    },
    /// Someone else's message became visible for the first time.
    NewRemoteMessage(Message),
    /// Someone else joined after the session opened.
    MemberJoined(Member),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomView {
    pub messages: Vec<Message>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

enum Command {
    Send {
        content: String,
        reply: oneshot::Sender<Result<Message, ClientError>>,
    },
    View(oneshot::Sender<RoomView>),
    Suspend,
    Resume,
    Close,
}

/// Handle to one open room.
///
/// The room's state lives in a single task that owns the reconciler, the
/// poll scheduler and the insert subscription; every fetch result, stream
/// delivery and send acknowledgement is applied there in turn. The task
/// stops on [`close`](Self::close) or when the last handle is dropped.
#[derive(Clone)]
pub struct RoomSession {
    room_id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    effects: Arc<EffectDispatcher>,
}

impl RoomSession {
    /// Start the session task. Polling and the subscription begin at once.
    pub fn open<B: StorageApi>(
        backend: B,
        room_id: Uuid,
        identity: Identity,
        effects: Arc<EffectDispatcher>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (subscribed_tx, subscribed_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            room_id,
            reconciler: Reconciler::new(room_id, identity.user_id),
            identity,
            fetcher: SnapshotFetcher::new(backend.clone(), options.fetch_timeout),
            backend,
            scheduler: PollScheduler::new(options.poll_interval),
            stream: None,
            fetch_in_flight: None,
            effects: effects.clone(),
            events: events_tx,
            fetch_tx,
            fetch_rx,
            subscribed_tx,
            subscribed_rx,
            sent_tx,
            sent_rx,
        };
        tokio::spawn(actor.run(commands_rx));

        let session = Self {
            room_id,
            commands: commands_tx,
            effects,
        };
        (session, events_rx)
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Insert a message and append the acknowledged copy locally.
    ///
    /// On failure the content is not retained; the caller still has it.
    pub async fn send(&self, content: &str) -> Result<Message, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::InvalidInput("message must not be empty".into()));
        }

        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            content: content.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Copy of the current timeline and member list.
    pub async fn view(&self) -> Result<RoomView, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::View(reply))?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// Stop polling and unsubscribe, keeping the timeline.
    pub fn suspend(&self) -> Result<(), ClientError> {
        self.command(Command::Suspend)
    }

    /// Fetch immediately, resubscribe and resume polling.
    pub fn resume(&self) -> Result<(), ClientError> {
        self.command(Command::Resume)
    }

    /// Stop everything and discard the room state.
    pub fn close(&self) {
        let _ = self.command(Command::Close);
    }

    /// Whether the app is visible; notifications only fire in the background.
    pub fn set_foreground(&self, foreground: bool) {
        self.effects.set_foreground(foreground);
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SessionClosed)
    }
}

struct FetchResult {
    generation: Generation,
    messages: Result<Vec<Message>, ClientError>,
    members: Result<Vec<Member>, ClientError>,
}

struct SendResult {
    result: Result<Message, BackendError>,
    reply: oneshot::Sender<Result<Message, ClientError>>,
}

type Subscribed = (Generation, Result<InsertSubscription, BackendError>);

struct SessionActor<B> {
    room_id: Uuid,
    identity: Identity,
    backend: B,
    fetcher: SnapshotFetcher<B>,
    reconciler: Reconciler,
    scheduler: PollScheduler,
    stream: Option<InsertSubscription>,
    fetch_in_flight: Option<Generation>,
    effects: Arc<EffectDispatcher>,
    events: mpsc::UnboundedSender<SessionEvent>,

    fetch_tx: mpsc::UnboundedSender<FetchResult>,
    fetch_rx: mpsc::UnboundedReceiver<FetchResult>,
    subscribed_tx: mpsc::UnboundedSender<Subscribed>,
    subscribed_rx: mpsc::UnboundedReceiver<Subscribed>,
    sent_tx: mpsc::UnboundedSender<SendResult>,
    sent_rx: mpsc::UnboundedReceiver<SendResult>,
}

impl<B: StorageApi> SessionActor<B> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Opened room session {} for {}", self.room_id, self.identity.user_id);
        self.activate();

        loop {
            tokio::select! {
                generation = self.scheduler.tick() => self.on_tick(generation),
                Some(result) = self.fetch_rx.recv() => self.on_fetched(result),
                Some((generation, result)) = self.subscribed_rx.recv() => {
                    self.on_subscribed(generation, result);
                }
                Some(sent) = self.sent_rx.recv() => self.on_sent(sent),
                insert = next_insert(&mut self.stream) => self.on_insert(insert),
                command = commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
        }

        self.deactivate();
        info!("Closed room session {}", self.room_id);
    }

    fn activate(&mut self) {
        if self.scheduler.is_active() {
            return;
        }
        let generation = self.scheduler.activate();
        debug!("Room {} active, generation {:?}", self.room_id, generation);

        let backend = self.backend.clone();
        let tx = self.subscribed_tx.clone();
        let room_id = self.room_id;
        tokio::spawn(async move {
            let result = backend.subscribe_inserts(room_id).await;
            let _ = tx.send((generation, result));
        });
    }

    fn deactivate(&mut self) {
        self.scheduler.deactivate();
        if let Some(mut stream) = self.stream.take() {
            stream.unsubscribe();
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Send { content, reply } => self.start_send(content, reply),
            Command::View(reply) => {
                let _ = reply.send(RoomView {
                    messages: self.reconciler.timeline().to_vec(),
                    members: self.reconciler.members().to_vec(),
                });
            }
            Command::Suspend => {
                debug!("Suspending room session {}", self.room_id);
                self.deactivate();
            }
            Command::Resume => self.activate(),
            Command::Close => {}
        }
    }

    fn on_tick(&mut self, generation: Generation) {
        if self.fetch_in_flight == Some(generation) {
            debug!("Previous fetch for room {} still running, skipping tick", self.room_id);
            return;
        }
        self.fetch_in_flight = Some(generation);

        let fetcher = self.fetcher.clone();
        let tx = self.fetch_tx.clone();
        let room_id = self.room_id;
        tokio::spawn(async move {
            let (messages, members) = tokio::join!(
                fetcher.fetch_messages(room_id),
                fetcher.fetch_members(room_id)
            );
            let _ = tx.send(FetchResult {
                generation,
                messages,
                members,
            });
        });
    }

    fn on_fetched(&mut self, result: FetchResult) {
        if self.fetch_in_flight == Some(result.generation) {
            self.fetch_in_flight = None;
        }
        if !self.scheduler.is_current(result.generation) {
            debug!("Discarding stale fetch for room {}", self.room_id);
            return;
        }

        match result.messages {
            Ok(messages) => {
                let outcome = self.reconciler.apply_snapshot(messages);
                self.publish_messages(outcome);
            }
            Err(e) => warn!("Message poll for room {} failed: {}", self.room_id, e),
        }
        match result.members {
            Ok(members) => {
                let outcome = self.reconciler.apply_member_snapshot(members);
                self.publish_members(outcome);
            }
            Err(e) => warn!("Member poll for room {} failed: {}", self.room_id, e),
        }
    }

    fn on_subscribed(&mut self, generation: Generation, result: Result<InsertSubscription, BackendError>) {
        match result {
            Ok(stream) if self.scheduler.is_current(generation) => {
                debug!("Insert stream for room {} attached", self.room_id);
                self.stream = Some(stream);
            }
            // Dropping a stale subscription unsubscribes it.
            Ok(_) => {}
            Err(e) => warn!("Insert stream for room {} unavailable, polling only: {}", self.room_id, e),
        }
    }

    fn on_insert(&mut self, insert: Option<Message>) {
        match insert {
            Some(message) => {
                let outcome = self.reconciler.apply_stream_event(message);
                self.publish_messages(outcome);
            }
            None => {
                warn!("Insert stream for room {} dropped, polling only", self.room_id);
                self.stream = None;
            }
        }
    }

    fn start_send(&mut self, content: String, reply: oneshot::Sender<Result<Message, ClientError>>) {
        let backend = self.backend.clone();
        let identity = self.identity.clone();
        let tx = self.sent_tx.clone();
        let room_id = self.room_id;
        tokio::spawn(async move {
            let result = backend.insert_message(room_id, &identity, &content).await;
            let _ = tx.send(SendResult { result, reply });
        });
    }

    fn on_sent(&mut self, sent: SendResult) {
        match sent.result {
            Ok(message) => {
                self.effects.on_send_accepted();
                let outcome = self.reconciler.apply_stream_event(message.clone());
                self.publish_messages(outcome);
                let _ = sent.reply.send(Ok(message));
            }
            Err(e) => {
                warn!("Send to room {} failed: {}", self.room_id, e);
                self.effects.on_send_failed();
                let _ = sent.reply.send(Err(ClientError::Send(e)));
            }
        }
    }

    fn publish_messages(&mut self, outcome: MessageOutcome) {
        match &outcome {
            MessageOutcome::Unchanged => return,
            MessageOutcome::Replaced { .. } => self.emit(SessionEvent::TimelineReplaced {
                messages: self.reconciler.timeline().to_vec(),
            }),
            MessageOutcome::Appended { .. } => {
                if let Some(message) = self.reconciler.timeline().last() {
                    self.emit(SessionEvent::MessageAppended(message.clone()));
                }
            }
        }

        for message in outcome.novel() {
            debug!("New message {} in room {} from {}", message.id, self.room_id, message.author_id);
            self.effects.on_new_remote_message(message);
            self.emit(SessionEvent::NewRemoteMessage(message.clone()));
        }
    }

    fn publish_members(&mut self, outcome: MemberOutcome) {
        let MemberOutcome::Replaced(diff) = outcome else {
            return;
        };

        self.emit(SessionEvent::MembersChanged {
            members: self.reconciler.members().to_vec(),
            joined: diff.joined,
            left: diff.left,
        });
        for member in diff.novel {
            self.effects.on_member_joined(&member);
            self.emit(SessionEvent::MemberJoined(member));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // A consumer that stopped listening does not stop the session.
        let _ = self.events.send(event);
    }
}

async fn next_insert(stream: &mut Option<InsertSubscription>) -> Option<Message> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::HapticPattern;
    use crate::effects::testing::{Recorder, recording};
    use crate::testing::FakeBackend;
    use pretty_assertions::assert_eq;
    use tokio::time::{sleep, timeout};

    const ROOM: Uuid = Uuid::from_u128(0xa);

    struct Harness {
        backend: FakeBackend,
        session: RoomSession,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        recorder: Arc<Recorder>,
        me: Identity,
    }

    impl Harness {
        fn open(backend: FakeBackend) -> Self {
            let me = Identity::new(Uuid::from_u128(1), "me");
            let (recorder, effects) = recording();
            let (session, events) = RoomSession::open(
                backend.clone(),
                ROOM,
                me.clone(),
                Arc::new(effects),
                SessionOptions::default(),
            );
            Self {
                backend,
                session,
                events,
                recorder,
                me,
            }
        }

        async fn next(&mut self) -> SessionEvent {
            timeout(Duration::from_secs(30), self.events.recv())
                .await
                .expect("no session event within 30s")
                .expect("session event channel closed")
        }

        /// Wait until `pred` matches, returning every event seen on the way.
        async fn until(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
            let mut seen = Vec::new();
            loop {
                let event = self.next().await;
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }

        fn drain(&mut self) -> Vec<SessionEvent> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }
    }

    fn novel_count(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::NewRemoteMessage(_)))
            .count()
    }

    fn light_haptics(recorder: &Recorder) -> usize {
        recorder
            .haptics()
            .into_iter()
            .filter(|p| *p == HapticPattern::Light)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_history_is_not_novel() {
        let backend = FakeBackend::new(ROOM);
        backend.store_message("them", "old one");
        backend.store_message("them", "old two");
        let mut h = Harness::open(backend);

        let event = h.next().await;
        let SessionEvent::TimelineReplaced { messages } = event else {
            panic!("expected baseline timeline, got {event:?}");
        };
        assert_eq!(messages.len(), 2);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(novel_count(&h.drain()), 0);
        assert!(h.recorder.haptics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_and_poll_surface_a_message_once() {
        let backend = FakeBackend::new(ROOM);
        backend.store_message("them", "history");
        let mut h = Harness::open(backend);
        h.until(|e| matches!(e, SessionEvent::TimelineReplaced { .. })).await;
        h.backend.wait_for_subscriber().await;

        let hi = h.backend.store_message("them", "hi");
        h.backend.stream(&hi);
        h.backend.stream(&hi);

        let events = h.until(|e| matches!(e, SessionEvent::NewRemoteMessage(_))).await;
        assert!(events.contains(&SessionEvent::MessageAppended(hi.clone())));

        // Several polls now return the same message.
        sleep(Duration::from_secs(7)).await;
        assert_eq!(novel_count(&h.drain()), 0);
        assert_eq!(light_haptics(&h.recorder), 1);
        assert_eq!(h.session.view().await.unwrap().messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_picks_up_messages_without_a_stream() {
        let backend = FakeBackend::new(ROOM);
        backend.refuse_subscriptions();
        let mut h = Harness::open(backend);
        // Empty room: wait out the baseline poll.
        sleep(Duration::from_millis(100)).await;

        let hi = h.backend.store_message("them", "hi");
        let events = h.until(|e| matches!(e, SessionEvent::NewRemoteMessage(_))).await;

        assert_eq!(events.last(), Some(&SessionEvent::NewRemoteMessage(hi)));
        assert_eq!(light_haptics(&h.recorder), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_keeps_timeline() {
        let backend = FakeBackend::new(ROOM);
        backend.store_message("them", "history");
        let mut h = Harness::open(backend);
        h.until(|e| matches!(e, SessionEvent::TimelineReplaced { .. })).await;

        h.backend.fail_fetches(true);
        h.backend.clear_messages();
        sleep(Duration::from_secs(7)).await;

        assert_eq!(h.drain(), vec![]);
        assert_eq!(h.session.view().await.unwrap().messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_session_stops_polling_and_streaming() {
        let backend = FakeBackend::new(ROOM);
        let mut h = Harness::open(backend);
        h.backend.wait_for_subscriber().await;
        let fetches = h.backend.message_fetches();

        h.session.suspend().unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.backend.live_subscribers(), 0);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.backend.message_fetches(), fetches);

        let hi = h.backend.store_message("them", "hi");
        h.backend.stream(&hi);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.drain(), vec![]);

        h.session.resume().unwrap();
        let events = h.until(|e| matches!(e, SessionEvent::NewRemoteMessage(_))).await;
        assert_eq!(novel_count(&events), 1);
        assert_eq!(h.backend.message_fetches(), fetches + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_fetch_after_suspend_is_discarded() {
        let backend = FakeBackend::new(ROOM);
        backend.store_message("them", "history");
        let mut h = Harness::open(backend);
        h.until(|e| matches!(e, SessionEvent::TimelineReplaced { .. })).await;

        h.backend.set_fetch_delay(Duration::from_secs(1));
        h.backend.store_message("them", "late");

        // Tick at 2s starts a fetch that completes at 3s.
        sleep(Duration::from_millis(2500)).await;
        h.session.suspend().unwrap();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(h.drain(), vec![]);
        assert_eq!(h.session.view().await.unwrap().messages.len(), 1);
        assert!(h.recorder.haptics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_skip_ticks() {
        let backend = FakeBackend::new(ROOM);
        backend.set_fetch_delay(Duration::from_secs(5));
        let _h = Harness::open(backend.clone());

        // Fetches start at 0s and 6s; the ticks at 2s, 4s and 8s are skipped.
        sleep(Duration::from_secs(9)).await;
        assert_eq!(backend.message_fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn send_appends_locally_and_never_self_notifies() {
        let backend = FakeBackend::new(ROOM);
        let mut h = Harness::open(backend);
        h.backend.wait_for_subscriber().await;

        let sent = h.session.send("  hello  ").await.unwrap();
        assert_eq!(sent.content, "hello");
        assert_eq!(sent.author_id, h.me.user_id);

        sleep(Duration::from_secs(5)).await;
        let events = h.drain();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SessionEvent::MessageAppended(_)))
                .count(),
            1
        );
        assert_eq!(novel_count(&events), 0);
        assert_eq!(h.recorder.haptics(), vec![HapticPattern::Success]);
        assert_eq!(h.session.view().await.unwrap().messages, vec![sent]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_fires_error_effect() {
        let backend = FakeBackend::new(ROOM);
        backend.fail_sends(true);
        let h = Harness::open(backend);

        let err = h.session.send("hello").await.unwrap_err();
        assert!(matches!(err, ClientError::Send(_)));
        assert_eq!(h.recorder.haptics(), vec![HapticPattern::Error]);
        assert!(h.session.view().await.unwrap().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_send_is_rejected_before_the_backend() {
        let backend = FakeBackend::new(ROOM);
        let h = Harness::open(backend);

        let err = h.session.send(" \n\t ").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
        assert_eq!(h.backend.message_count(), 0);
        assert!(h.recorder.haptics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn later_joins_knock() {
        let backend = FakeBackend::new(ROOM);
        backend.add_member(1, "me");
        let mut h = Harness::open(backend);
        h.until(|e| matches!(e, SessionEvent::MembersChanged { .. })).await;

        let bob = h.backend.add_member(2, "bob");
        let events = h.until(|e| matches!(e, SessionEvent::MemberJoined(_))).await;

        assert!(events.contains(&SessionEvent::MembersChanged {
            members: h.backend.members(),
            joined: vec![bob.clone()],
            left: vec![],
        }));
        assert_eq!(events.last(), Some(&SessionEvent::MemberJoined(bob)));
        assert_eq!(h.recorder.haptics(), vec![HapticPattern::DoorKnock]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_ends_the_session() {
        let backend = FakeBackend::new(ROOM);
        let mut h = Harness::open(backend);
        h.backend.wait_for_subscriber().await;

        h.session.close();
        assert_eq!(timeout(Duration::from_secs(5), h.events.recv()).await.unwrap(), None);
        assert!(h.session.is_closed());
        assert!(matches!(h.session.send("hi").await, Err(ClientError::SessionClosed)));
        assert_eq!(h.backend.live_subscribers(), 0);
    }
}
