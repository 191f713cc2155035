use std::{collections::HashMap, fmt::Display, sync::Arc};

use parking_lot::{Mutex, MutexGuard};
use syncwatch_core::{
    random_string, ChatLog, ChatMessage, Config, ConnectionId, CoordinatorError, MediaId, Member,
    PlaybackState, Result, Timestamp,
};

/// The opaque, generated identifier of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

/// A named synchronization domain, owning its playback state, members and chat.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    owner: String,
    created_at: Timestamp,
    /// Position in the registry's insertion order
    sequence: u64,
    state: Mutex<SessionState>,
}

/// The mutable part of a session, guarded by the session's own lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub playback: PlaybackState,
    /// Raw member storage. May still contain dead members that weren't swept yet.
    pub members: HashMap<ConnectionId, Member>,
    pub chat: ChatLog,
    pub updated_at: Timestamp,
    /// Incremented for every snapshot taken
    pub revision: u64,
}

/// A short description of a session, for lobby views.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub owner: String,
    /// Members passing the liveness check
    pub member_count: usize,
    pub media: Option<MediaId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The full view of a session sent to its members.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: SessionSummary,
    pub playback: PlaybackState,
    /// Where playback is estimated to be at `taken_at`, in seconds
    pub position: f64,
    /// Live members, ordered by join time
    pub members: Vec<Member>,
    pub chat: Vec<ChatMessage>,
    pub taken_at: Timestamp,
    /// Orders snapshots of the same session. Later snapshots have higher revisions.
    pub revision: u64,
}

impl SessionId {
    pub fn generate(length: usize) -> Self {
        Self(random_string(length))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        name: String,
        owner: String,
        sequence: u64,
        config: &Config,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            owner,
            created_at: now,
            sequence,
            state: Mutex::new(SessionState {
                playback: PlaybackState::new(now),
                members: HashMap::new(),
                chat: ChatLog::new(config.chat_retention),
                updated_at: now,
                revision: 0,
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The principal id of the creator
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// A copy of the current playback state.
    pub fn playback(&self) -> PlaybackState {
        self.lock().playback.clone()
    }

    /// Returns every stored member, dead or alive.
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.lock().members.keys().copied().collect()
    }

    /// The number of stored members, including ones that haven't been swept yet.
    pub fn stored_member_count(&self) -> usize {
        self.lock().members.len()
    }

    pub fn member(&self, connection: ConnectionId) -> Option<Member> {
        self.lock().members.get(&connection).cloned()
    }

    /// Members that passed the liveness check at `now`, ordered by join time.
    pub fn active_members(&self, config: &Config, now: Timestamp) -> Vec<Member> {
        self.lock().active_members(config, now)
    }

    /// Posts a chat message on behalf of a member.
    pub fn post_chat(
        &self,
        connection: ConnectionId,
        text: &str,
        config: &Config,
        now: Timestamp,
    ) -> Result<ChatMessage> {
        let mut state = self.lock();

        let member = state
            .members
            .get_mut(&connection)
            .ok_or(CoordinatorError::NotMember)?;

        let message = ChatMessage::new(
            member.display_name.clone(),
            connection,
            text,
            config.chat_max_length,
            now,
        )?;

        member.touch(now);
        state.chat.push(message.clone());
        state.updated_at = now;

        Ok(message)
    }

    /// Returns up to `limit` recent chat messages.
    pub fn recent_chat(&self, limit: usize) -> Vec<ChatMessage> {
        self.lock().chat.recent(limit)
    }

    pub fn summary(&self, config: &Config, now: Timestamp) -> SessionSummary {
        let state = self.lock();
        self.summary_of(&state, config, now)
    }

    /// Takes a consistent snapshot of the whole session under a single lock.
    pub fn snapshot(&self, config: &Config, now: Timestamp) -> SessionSnapshot {
        let mut state = self.lock();
        state.revision += 1;

        SessionSnapshot {
            session: self.summary_of(&state, config, now),
            playback: state.playback.clone(),
            position: state.playback.position_at(now),
            members: state.active_members(config, now),
            chat: state.chat.recent(config.chat_history_limit),
            taken_at: now,
            revision: state.revision,
        }
    }

    /// Returns true if the session has had no members and no activity for longer than `ttl`.
    pub(crate) fn is_idle(&self, ttl: chrono::Duration, now: Timestamp) -> bool {
        let state = self.lock();
        state.members.is_empty() && now - state.updated_at > ttl
    }

    fn summary_of(&self, state: &SessionState, config: &Config, now: Timestamp) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            member_count: state.active_count(config, now),
            media: state.playback.media().map(str::to_string),
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }
}

impl SessionState {
    pub fn active_members(&self, config: &Config, now: Timestamp) -> Vec<Member> {
        let window = config.liveness_window();

        let mut members: Vec<_> = self
            .members
            .values()
            .filter(|m| m.is_alive(now, window))
            .cloned()
            .collect();

        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then(a.connection.value().cmp(&b.connection.value()))
        });

        members
    }

    pub fn active_count(&self, config: &Config, now: Timestamp) -> usize {
        let window = config.liveness_window();
        self.members.values().filter(|m| m.is_alive(now, window)).count()
    }
}

/// Helper to hand out sessions as shared references.
pub type ArcedSession = Arc<Session>;
