use std::sync::Arc;

use syncwatch_core::{
    ConnectionId, CoordinatorError, MediaId, Member, MemberUpdate, Timestamp, TransportCommand,
};

use crate::{SessionId, SessionSnapshot, SessionSummary};

/// Commands a connection can issue to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateSession {
        name: String,
    },
    ListSessions,
    JoinSession {
        session_id: SessionId,
        /// The display name to join with. A generated one is used if absent.
        name: Option<String>,
    },
    LeaveSession,
    DeleteSession {
        session_id: SessionId,
    },
    /// Shorthand for a media selection, announced to members as [Outbound::MediaSelected]
    SelectMedia {
        media_id: MediaId,
    },
    Transport(TransportCommand),
    Heartbeat,
    /// The answer to a heartbeat the coordinator sent, carrying its timestamp back
    HeartbeatAck {
        sent_at: Timestamp,
    },
    UpdateMemberState(MemberUpdate),
    SendChat {
        text: String,
    },
    KickMember {
        session_id: SessionId,
        member_id: ConnectionId,
    },
}

/// The kind of a [Command], used to correlate acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    CreateSession,
    ListSessions,
    JoinSession,
    LeaveSession,
    DeleteSession,
    SelectMedia,
    Transport,
    Heartbeat,
    HeartbeatAck,
    UpdateMemberState,
    SendChat,
    KickMember,
}

/// Everything the coordinator sends to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// The latest full state of the connection's session
    SessionSnapshot(Arc<SessionSnapshot>),
    /// The latest summary of every session
    SessionList(Arc<Vec<SessionSummary>>),
    MediaSelected {
        session_id: SessionId,
        media_id: MediaId,
    },
    /// The connection was removed from a session without asking for it
    Kicked {
        session_id: SessionId,
        reason: String,
    },
    /// A liveness probe. Clients answer with [Command::HeartbeatAck].
    Heartbeat {
        sent_at: Timestamp,
    },
    /// The result of a request command
    Ack {
        command: CommandKind,
        result: Result<Reply, CoordinatorError>,
    },
    /// A frame that couldn't be understood
    Rejected {
        reason: String,
    },
}

/// The successful payload of an acknowledged request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    None,
    Session(SessionSummary),
    Sessions(Vec<SessionSummary>),
    Joined {
        member: Member,
        snapshot: Arc<SessionSnapshot>,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateSession { .. } => CommandKind::CreateSession,
            Self::ListSessions => CommandKind::ListSessions,
            Self::JoinSession { .. } => CommandKind::JoinSession,
            Self::LeaveSession => CommandKind::LeaveSession,
            Self::DeleteSession { .. } => CommandKind::DeleteSession,
            Self::SelectMedia { .. } => CommandKind::SelectMedia,
            Self::Transport(_) => CommandKind::Transport,
            Self::Heartbeat => CommandKind::Heartbeat,
            Self::HeartbeatAck { .. } => CommandKind::HeartbeatAck,
            Self::UpdateMemberState(_) => CommandKind::UpdateMemberState,
            Self::SendChat { .. } => CommandKind::SendChat,
            Self::KickMember { .. } => CommandKind::KickMember,
        }
    }
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSession => "create-session",
            Self::ListSessions => "list-sessions",
            Self::JoinSession => "join-session",
            Self::LeaveSession => "leave-session",
            Self::DeleteSession => "delete-session",
            Self::SelectMedia => "select-media",
            Self::Transport => "transport-command",
            Self::Heartbeat => "heartbeat",
            Self::HeartbeatAck => "heartbeat-ack",
            Self::UpdateMemberState => "update-member-state",
            Self::SendChat => "send-chat",
            Self::KickMember => "kick-member",
        }
    }

    /// Requests are acknowledged with an [Outbound::Ack].
    /// Everything else is fire-and-forget, and its state change is the answer.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::CreateSession
                | Self::ListSessions
                | Self::JoinSession
                | Self::LeaveSession
                | Self::DeleteSession
                | Self::KickMember
        )
    }
}

