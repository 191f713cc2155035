//! The JSON frames exchanged over the gateway.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use syncwatch_collab::{Command, Outbound, Reply};
use syncwatch_core::{ConnectionId, MemberUpdate, TransportCommand};

use crate::serialized::{millis, Member, Session, Snapshot, ToSerialized};

/// A frame sent by a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        name: String,
    },
    ListSessions,
    JoinSession {
        session_id: String,
        #[serde(default)]
        name: Option<String>,
    },
    LeaveSession,
    DeleteSession {
        session_id: String,
    },
    KickMember {
        session_id: String,
        member_id: u64,
    },
    SelectMedia {
        media_id: String,
    },
    TransportCommand {
        command: TransportSchema,
    },
    Heartbeat,
    HeartbeatAck {
        /// The `sentAt` of the heartbeat being answered
        sent_at: i64,
    },
    UpdateMemberState(MemberStateSchema),
    SendChat {
        text: String,
    },
}

/// A playback action, for example `{"type": "seek", "value": 42.5}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum TransportSchema {
    Play,
    Pause,
    Seek(f64),
    Rate(f64),
    Volume(f64),
    Mute(bool),
    Select(String),
}

/// What a member reports about its local player. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStateSchema {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub buffering: Option<bool>,
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
}

/// A frame sent to a client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    SessionSnapshot(Snapshot),
    SessionList {
        sessions: Vec<Session>,
    },
    MediaSelected {
        session_id: String,
        media_id: String,
    },
    Kicked {
        session_id: String,
        reason: String,
    },
    Heartbeat {
        sent_at: i64,
    },
    Ack {
        command: &'static str,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<AckData>,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AckData {
    Session(Session),
    Sessions(Vec<Session>),
    Joined { member: Member, snapshot: Snapshot },
}

/// The command name used to answer frames that couldn't be parsed.
pub const UNKNOWN_COMMAND: &str = "unknown";

impl ClientMessage {
    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Malformed frame: {e}"))
    }
}

impl TryFrom<ClientMessage> for Command {
    type Error = String;

    fn try_from(value: ClientMessage) -> Result<Self, Self::Error> {
        let command = match value {
            ClientMessage::CreateSession { name } => Command::CreateSession { name },
            ClientMessage::ListSessions => Command::ListSessions,
            ClientMessage::JoinSession { session_id, name } => Command::JoinSession {
                session_id: session_id.into(),
                name,
            },
            ClientMessage::LeaveSession => Command::LeaveSession,
            ClientMessage::DeleteSession { session_id } => Command::DeleteSession {
                session_id: session_id.into(),
            },
            ClientMessage::KickMember {
                session_id,
                member_id,
            } => Command::KickMember {
                session_id: session_id.into(),
                member_id: ConnectionId::from_value(member_id),
            },
            ClientMessage::SelectMedia { media_id } => Command::SelectMedia { media_id },
            ClientMessage::TransportCommand { command } => Command::Transport(command.into()),
            ClientMessage::Heartbeat => Command::Heartbeat,
            ClientMessage::HeartbeatAck { sent_at } => {
                let sent_at = DateTime::from_timestamp_millis(sent_at)
                    .ok_or_else(|| format!("{sent_at} is not a valid timestamp"))?;

                Command::HeartbeatAck { sent_at }
            }
            ClientMessage::UpdateMemberState(state) => Command::UpdateMemberState(state.into()),
            ClientMessage::SendChat { text } => Command::SendChat { text },
        };

        Ok(command)
    }
}

impl From<TransportSchema> for TransportCommand {
    fn from(value: TransportSchema) -> Self {
        match value {
            TransportSchema::Play => Self::SetPlaying(true),
            TransportSchema::Pause => Self::SetPlaying(false),
            TransportSchema::Seek(position) => Self::Seek(position),
            TransportSchema::Rate(rate) => Self::SetRate(rate),
            TransportSchema::Volume(volume) => Self::SetVolume(volume),
            TransportSchema::Mute(muted) => Self::SetMuted(muted),
            TransportSchema::Select(media) => Self::SelectMedia(media),
        }
    }
}

impl From<MemberStateSchema> for MemberUpdate {
    fn from(value: MemberStateSchema) -> Self {
        Self {
            display_name: value.display_name,
            position: value.position,
            buffering: value.buffering,
            ready: value.ready,
            volume: value.volume,
            rate: value.rate,
            // Latency is measured by the server, never reported
            latency_ms: None,
        }
    }
}

impl From<Outbound> for ServerMessage {
    fn from(value: Outbound) -> Self {
        match value {
            Outbound::SessionSnapshot(snapshot) => Self::SessionSnapshot(snapshot.to_serialized()),
            Outbound::SessionList(sessions) => Self::SessionList {
                sessions: sessions.to_serialized(),
            },
            Outbound::MediaSelected {
                session_id,
                media_id,
            } => Self::MediaSelected {
                session_id: session_id.to_string(),
                media_id,
            },
            Outbound::Kicked { session_id, reason } => Self::Kicked {
                session_id: session_id.to_string(),
                reason,
            },
            Outbound::Heartbeat { sent_at } => Self::Heartbeat {
                sent_at: millis(sent_at),
            },
            Outbound::Ack { command, result } => match result {
                Ok(reply) => Self::Ack {
                    command: command.as_str(),
                    ok: true,
                    error: None,
                    data: AckData::from_reply(reply),
                },
                Err(error) => Self::Ack {
                    command: command.as_str(),
                    ok: false,
                    error: Some(error.to_string()),
                    data: None,
                },
            },
            Outbound::Rejected { reason } => Self::Ack {
                command: UNKNOWN_COMMAND,
                ok: false,
                error: Some(reason),
                data: None,
            },
        }
    }
}

impl AckData {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::None => None,
            Reply::Session(session) => Some(Self::Session(session.to_serialized())),
            Reply::Sessions(sessions) => Some(Self::Sessions(sessions.to_serialized())),
            Reply::Joined { member, snapshot } => Some(Self::Joined {
                member: member.to_serialized(),
                snapshot: snapshot.to_serialized(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;
    use syncwatch_collab::{Command, CommandKind, Outbound, Reply, SessionSummary};
    use syncwatch_core::{CoordinatorError, TransportCommand};

    use super::{ClientMessage, ServerMessage};

    fn command(value: serde_json::Value) -> Command {
        let message = ClientMessage::parse(&value.to_string()).unwrap();
        Command::try_from(message).unwrap()
    }

    fn encode(outbound: Outbound) -> serde_json::Value {
        serde_json::to_value(ServerMessage::from(outbound)).unwrap()
    }

    #[test]
    fn requests_decode_with_camel_case_fields() {
        assert_eq!(
            command(json!({ "type": "join-session", "sessionId": "abc123xyz", "name": "Alice" })),
            Command::JoinSession {
                session_id: "abc123xyz".into(),
                name: Some("Alice".into()),
            }
        );

        assert_eq!(
            command(json!({ "type": "join-session", "sessionId": "abc123xyz" })),
            Command::JoinSession {
                session_id: "abc123xyz".into(),
                name: None,
            }
        );

        assert_eq!(command(json!({ "type": "list-sessions" })), Command::ListSessions);
    }

    #[test]
    fn transport_commands_decode() {
        assert_eq!(
            command(json!({ "type": "transport-command", "command": { "type": "play" } })),
            Command::Transport(TransportCommand::SetPlaying(true))
        );

        assert_eq!(
            command(json!({
                "type": "transport-command",
                "command": { "type": "seek", "value": 42.5 }
            })),
            Command::Transport(TransportCommand::Seek(42.5))
        );

        assert_eq!(
            command(json!({
                "type": "transport-command",
                "command": { "type": "mute", "value": true }
            })),
            Command::Transport(TransportCommand::SetMuted(true))
        );
    }

    #[test]
    fn member_state_updates_decode_partially() {
        let decoded = command(json!({
            "type": "update-member-state",
            "position": 12.0,
            "buffering": true
        }));

        let update = match decoded {
            Command::UpdateMemberState(update) => update,
            other => panic!("expected a member state update, got {other:?}"),
        };

        assert_eq!(update.position, Some(12.0));
        assert_eq!(update.buffering, Some(true));
        assert_eq!(update.volume, None);
        assert_eq!(update.latency_ms, None);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{ "type": "dance" }"#).is_err());
        assert!(ClientMessage::parse(r#"{ "type": "send-chat" }"#).is_err());
    }

    #[test]
    fn acks_carry_the_command_name() {
        let ok = encode(Outbound::Ack {
            command: CommandKind::LeaveSession,
            result: Ok(Reply::None),
        });
        assert_eq!(ok, json!({ "type": "ack", "command": "leave-session", "ok": true }));

        let failed = encode(Outbound::Ack {
            command: CommandKind::DeleteSession,
            result: Err(CoordinatorError::NotAuthorized {
                action: "delete this session",
            }),
        });
        assert_eq!(failed["ok"], json!(false));
        assert_eq!(failed["error"], json!("Not authorized to delete this session"));

        let rejected = encode(Outbound::Rejected {
            reason: "Malformed frame".into(),
        });
        assert_eq!(rejected["command"], json!("unknown"));
    }

    #[test]
    fn session_lists_are_camel_case() {
        let now = Utc::now();
        let summary = SessionSummary {
            id: "abc123xyz".into(),
            name: "movie-night".into(),
            owner: "alice".into(),
            member_count: 2,
            media: None,
            created_at: now,
            updated_at: now,
        };

        let value = encode(Outbound::SessionList(Arc::new(vec![summary])));

        assert_eq!(value["type"], json!("session-list"));
        assert_eq!(value["sessions"][0]["memberCount"], json!(2));
        assert_eq!(value["sessions"][0]["createdAt"], json!(now.timestamp_millis()));
    }
}
