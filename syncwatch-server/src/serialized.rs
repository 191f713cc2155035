//! All schemas that are exposed from endpoints and the gateway are defined here
//! along with the ToSerialized impls

use std::sync::Arc;

use serde::Serialize;
use syncwatch_collab::{SessionSnapshot, SessionSummary};
use syncwatch_core::{ChatMessage as CoreChatMessage, Member as CoreMember, PlaybackState, Timestamp};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    name: String,
    owner: String,
    /// Members that are currently alive
    member_count: usize,
    media: Option<String>,
    /// Milliseconds since the unix epoch
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    media: Option<String>,
    /// Position in seconds at `updatedAt`
    position: f64,
    playing: bool,
    rate: f64,
    volume: f64,
    muted: bool,
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The connection id, used to kick the member
    id: u64,
    principal: String,
    display_name: String,
    joined_at: i64,
    last_heartbeat: i64,
    position: f64,
    buffering: bool,
    ready: bool,
    volume: f64,
    rate: f64,
    latency_ms: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    id: u64,
    author: String,
    member_id: u64,
    text: String,
    sent_at: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    session: Session,
    playback: Playback,
    /// Estimated position in seconds at `takenAt`
    position: f64,
    members: Vec<Member>,
    chat: Vec<ChatMessage>,
    taken_at: i64,
    revision: u64,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<I, O> ToSerialized<O> for Arc<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> O {
        self.as_ref().to_serialized()
    }
}

impl ToSerialized<Session> for SessionSummary {
    fn to_serialized(&self) -> Session {
        Session {
            id: self.id.to_string(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            member_count: self.member_count,
            media: self.media.clone(),
            created_at: millis(self.created_at),
            updated_at: millis(self.updated_at),
        }
    }
}

impl ToSerialized<Playback> for PlaybackState {
    fn to_serialized(&self) -> Playback {
        Playback {
            media: self.media().map(str::to_string),
            position: self.position(),
            playing: self.is_playing(),
            rate: self.rate(),
            volume: self.volume(),
            muted: self.is_muted(),
            updated_at: millis(self.updated_at()),
        }
    }
}

impl ToSerialized<Member> for CoreMember {
    fn to_serialized(&self) -> Member {
        Member {
            id: self.connection.value(),
            principal: self.principal.clone(),
            display_name: self.display_name.clone(),
            joined_at: millis(self.joined_at),
            last_heartbeat: millis(self.last_heartbeat),
            position: self.position,
            buffering: self.buffering,
            ready: self.ready,
            volume: self.volume,
            rate: self.rate,
            latency_ms: self.latency_ms,
        }
    }
}

impl ToSerialized<ChatMessage> for CoreChatMessage {
    fn to_serialized(&self) -> ChatMessage {
        ChatMessage {
            id: self.id.value(),
            author: self.author.clone(),
            member_id: self.connection.value(),
            text: self.text.clone(),
            sent_at: millis(self.sent_at),
        }
    }
}

impl ToSerialized<Snapshot> for SessionSnapshot {
    fn to_serialized(&self) -> Snapshot {
        Snapshot {
            session: self.session.to_serialized(),
            playback: self.playback.to_serialized(),
            position: self.position,
            members: self.members.to_serialized(),
            chat: self.chat.to_serialized(),
            taken_at: millis(self.taken_at),
            revision: self.revision,
        }
    }
}

/// Timestamps go over the wire as milliseconds since the unix epoch
pub fn millis(timestamp: Timestamp) -> i64 {
    timestamp.timestamp_millis()
}
