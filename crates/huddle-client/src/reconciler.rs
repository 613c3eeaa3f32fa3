use std::collections::HashSet;

use uuid::Uuid;

use huddle_types::{Member, Message};

/// Result of feeding messages to the [`Reconciler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Nothing visible changed.
    Unchanged,
    /// The timeline was swapped for a snapshot.
    Replaced { novel: Vec<Message> },
    /// One stream message was appended at the tail.
    Appended { novel: Option<Message> },
}

impl MessageOutcome {
    /// Messages to surface to the side-effect dispatcher, each exactly once.
    pub fn novel(&self) -> &[Message] {
        match self {
            Self::Unchanged => &[],
            Self::Replaced { novel } => novel,
            Self::Appended { novel } => novel.as_slice(),
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDiff {
    pub joined: Vec<Member>,
    pub left: Vec<Member>,
    /// Remote joins seen after the first member snapshot.
    pub novel: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    Unchanged,
    Replaced(MemberDiff),
}

/// Authoritative timeline and member set of one open room.
///
/// Snapshots replace state when their length or tail id differs from what is
/// held; stream events are appended if their id is absent. A message is
/// surfaced as novel at most once per session no matter which channel sees
/// it first, and never when the local user wrote it. The first message
/// snapshot is history and surfaces nothing.
#[derive(Debug)]
pub struct Reconciler {
    room_id: Uuid,
    me: Uuid,

    timeline: Vec<Message>,
    timeline_ids: HashSet<Uuid>,
    /// Every id ever seen this session; never pruned, cleared only when the session ends.
    surfaced: HashSet<Uuid>,
    has_baseline: bool,

    members: Vec<Member>,
    member_ids: HashSet<Uuid>,
    has_member_baseline: bool,
}

impl Reconciler {
    pub fn new(room_id: Uuid, me: Uuid) -> Self {
        Self {
            room_id,
            me,
            timeline: Vec::new(),
            timeline_ids: HashSet::new(),
            surfaced: HashSet::new(),
            has_baseline: false,
            members: Vec::new(),
            member_ids: HashSet::new(),
            has_member_baseline: false,
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn tail_id(&self) -> Option<Uuid> {
        self.timeline.last().map(|m| m.id)
    }

    /// Replace-or-grow with a full snapshot, already in timeline order.
    pub fn apply_snapshot(&mut self, messages: Vec<Message>) -> MessageOutcome {
        let messages = dedup_by_id(messages, |m| m.id);
        let baseline = !self.has_baseline;
        self.has_baseline = true;

        let incoming_tail = messages.last().map(|m| m.id);
        if messages.len() == self.timeline.len() && incoming_tail == self.tail_id() {
            return MessageOutcome::Unchanged;
        }

        let mut novel = Vec::new();
        for message in &messages {
            if self.surfaced.insert(message.id) && !baseline && message.author_id != self.me {
                novel.push(message.clone());
            }
        }

        self.timeline_ids = messages.iter().map(|m| m.id).collect();
        self.timeline = messages;
        MessageOutcome::Replaced { novel }
    }

    /// Append-if-absent for one pushed message. Order is not corrected.
    pub fn apply_stream_event(&mut self, message: Message) -> MessageOutcome {
        if message.room_id != self.room_id || !self.timeline_ids.insert(message.id) {
            return MessageOutcome::Unchanged;
        }

        let novel = self.surfaced.insert(message.id) && message.author_id != self.me;
        self.timeline.push(message.clone());
        MessageOutcome::Appended {
            novel: novel.then_some(message),
        }
    }

    /// Replace the member set when the count differs or an unseen id appears.
    pub fn apply_member_snapshot(&mut self, members: Vec<Member>) -> MemberOutcome {
        let members = dedup_by_id(members, |m| m.id);
        let baseline = !self.has_member_baseline;
        self.has_member_baseline = true;

        let incoming: HashSet<Uuid> = members.iter().map(|m| m.id).collect();
        let has_new_id = !incoming.is_subset(&self.member_ids);
        if members.len() == self.members.len() && !has_new_id {
            return MemberOutcome::Unchanged;
        }

        let joined: Vec<Member> = members
            .iter()
            .filter(|m| !self.member_ids.contains(&m.id))
            .cloned()
            .collect();
        let left: Vec<Member> = self
            .members
            .iter()
            .filter(|m| !incoming.contains(&m.id))
            .cloned()
            .collect();
        let novel = if baseline {
            Vec::new()
        } else {
            joined.iter().filter(|m| m.user_id != self.me).cloned().collect()
        };

        self.member_ids = incoming;
        self.members = members;
        MemberOutcome::Replaced(MemberDiff { joined, left, novel })
    }
}

fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> Uuid) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(id(item))).collect()
}
