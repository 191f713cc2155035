use std::sync::Arc;

use log::{debug, info, warn};
use syncwatch_core::{
    ConnectionId, CoordinatorError, Member, MemberUpdate, Principal, Result, Timestamp,
    TransportCommand,
};

use crate::{
    Command, CoordinatorContext, HeartbeatOutcome, OutboxReceiver, Outbound, Reply, Session,
    SessionId, SessionSummary,
};

const SESSION_CLOSED: &str = "session closed";
const KICKED_BY_OWNER: &str = "kicked by owner";
const TIMED_OUT: &str = "connection timed out";

/// A handle to a connection, which when dropped disconnects it.
///
/// A connection is in at most one session at a time. Every command it issues goes
/// through [ConnectionHandle::handle], and everything the coordinator sends it
/// arrives through its outbox.
pub struct ConnectionHandle {
    id: ConnectionId,
    principal: Principal,
    context: CoordinatorContext,
    outbox: Option<OutboxReceiver>,
}

impl ConnectionHandle {
    pub(crate) fn new(context: &CoordinatorContext, identity: Option<&str>) -> Self {
        let id = ConnectionId::new();
        let principal = Principal::resolve(identity, id, &context.config);
        let outbox = context.broadcaster.attach(id);

        info!("Connection {} opened for {}", id, principal.id);

        let list = Arc::new(context.sessions.list(context.clock.now()));
        context.broadcaster.deliver_list(id, list);

        Self {
            id,
            principal,
            context: context.clone(),
            outbox: Some(outbox),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The session this connection is currently in.
    pub fn session(&self) -> Option<SessionId> {
        self.context.presence.session_of(self.id)
    }

    /// Handles a command issued by this connection.
    pub fn handle(&self, command: Command) {
        self.context.dispatch(self.id, &self.principal, command)
    }

    /// Answers a frame that couldn't be turned into a command.
    pub fn reject(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!("Rejected frame from connection {}: {}", self.id, reason);

        self.context
            .broadcaster
            .send(self.id, Outbound::Rejected { reason });
    }

    /// Takes the receiving side of the outbox, so it can be drained by a separate writer task.
    pub fn take_outbox(&mut self) -> Option<OutboxReceiver> {
        self.outbox.take()
    }

    /// Everything that is ready to be sent right now.
    pub fn drain(&mut self) -> Vec<Outbound> {
        self.outbox
            .as_mut()
            .map(|outbox| outbox.drain())
            .unwrap_or_default()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.context.disconnect(self.id)
    }
}

impl CoordinatorContext {
    /// Routes a command to the component that owns it. Requests are always acknowledged,
    /// failures of fire-and-forget commands are only logged.
    pub(crate) fn dispatch(&self, connection: ConnectionId, principal: &Principal, command: Command) {
        let now = self.clock.now();
        let kind = command.kind();

        // Any activity counts as a sign of life
        if let Some(current) = self.presence.session_of(connection) {
            match self.presence.heartbeat(&current, connection, now) {
                Ok(HeartbeatOutcome::Revived) => self.publish(&current),
                Ok(_) => {}
                Err(error) => debug!("Heartbeat for connection {} skipped: {}", connection, error),
            }
        }

        let result = self.execute(connection, principal, command, now);

        if kind.is_request() {
            self.broadcaster
                .send(connection, Outbound::Ack { command: kind, result });
            return;
        }

        if let Err(error) = result {
            if error.is_benign() {
                debug!("{} from connection {} failed: {}", kind.as_str(), connection, error);
            } else {
                warn!("{} from connection {} failed: {}", kind.as_str(), connection, error);
            }
        }
    }

    fn execute(
        &self,
        connection: ConnectionId,
        principal: &Principal,
        command: Command,
        now: Timestamp,
    ) -> Result<Reply> {
        match command {
            Command::CreateSession { name } => {
                let summary = self.create_session(&name, principal)?;
                Ok(Reply::Session(summary))
            }
            Command::ListSessions => Ok(Reply::Sessions(self.sessions.list(now))),
            Command::JoinSession { session_id, name } => {
                let member = self.join(connection, principal, &session_id, name.as_deref())?;
                let snapshot = self.snapshot(&session_id)?;

                Ok(Reply::Joined { member, snapshot })
            }
            Command::LeaveSession => {
                self.leave(connection, now);
                Ok(Reply::None)
            }
            Command::DeleteSession { session_id } => {
                self.delete_session(&session_id, principal)?;
                Ok(Reply::None)
            }
            Command::KickMember {
                session_id,
                member_id,
            } => {
                self.kick(&session_id, principal, member_id)?;
                Ok(Reply::None)
            }
            Command::SelectMedia { media_id } => {
                let session_id = self.current_session(connection)?;
                self.select_media(&session_id, media_id, now)?;
                Ok(Reply::None)
            }
            Command::Transport(TransportCommand::SelectMedia(media_id)) => {
                let session_id = self.current_session(connection)?;
                self.select_media(&session_id, media_id, now)?;
                Ok(Reply::None)
            }
            Command::Transport(transport) => {
                let session_id = self.current_session(connection)?;
                self.playback.apply(&session_id, transport, now)?;
                self.publish_session(&session_id);
                Ok(Reply::None)
            }
            Command::Heartbeat => {
                // Answered so the client can measure the round trip
                self.broadcaster
                    .send(connection, Outbound::Heartbeat { sent_at: now });
                Ok(Reply::None)
            }
            Command::HeartbeatAck { sent_at } => {
                let session_id = self.current_session(connection)?;
                let latency = (now - sent_at).num_milliseconds().clamp(0, u32::MAX as i64) as u32;

                self.presence
                    .record_latency(&session_id, connection, latency, now)?;
                self.publish_session(&session_id);
                Ok(Reply::None)
            }
            Command::UpdateMemberState(update) => {
                let session_id = self.current_session(connection)?;
                self.presence
                    .update_state(&session_id, connection, update, now)?;
                self.publish_session(&session_id);
                Ok(Reply::None)
            }
            Command::SendChat { text } => {
                let session_id = self.current_session(connection)?;
                let session = self.sessions.get(&session_id)?;

                session.post_chat(connection, &text, &self.config, now)?;
                self.publish_session(&session_id);
                Ok(Reply::None)
            }
        }
    }

    /// Creates a session and announces it in the session list.
    pub fn create_session(&self, name: &str, owner: &Principal) -> Result<SessionSummary> {
        let now = self.clock.now();
        let session = self.sessions.create(name, owner, now)?;

        self.publish_global_list();
        Ok(session.summary(&self.config, now))
    }

    /// Deletes a session, telling every connection in it that it was closed.
    pub fn delete_session(&self, session_id: &SessionId, requester: &Principal) -> Result<()> {
        let session = self.sessions.delete(session_id, requester)?;

        self.close(&session);
        self.publish_global_list();
        Ok(())
    }

    /// Tells the remaining members of a removed session that it was closed.
    fn close(&self, session: &Session) {
        let members = session.member_ids();

        for connection in &members {
            self.presence.release(*connection, session.id());
            self.broadcaster.clear_snapshot(*connection);
        }

        self.broadcaster.send_all(
            members,
            &Outbound::Kicked {
                session_id: session.id().clone(),
                reason: SESSION_CLOSED.to_string(),
            },
        );
    }

    /// Removes a member from a session on behalf of its owner or an administrator.
    pub fn kick(
        &self,
        session_id: &SessionId,
        requester: &Principal,
        target: ConnectionId,
    ) -> Result<Member> {
        let member = self
            .presence
            .kick(session_id, requester, target, self.clock.now())?;

        self.broadcaster.clear_snapshot(target);
        self.broadcaster.send(
            target,
            Outbound::Kicked {
                session_id: session_id.clone(),
                reason: KICKED_BY_OWNER.to_string(),
            },
        );

        self.publish(session_id);
        Ok(member)
    }

    /// Runs one liveness sweep, telling evicted connections and publishing what changed.
    pub fn sweep(&self) -> usize {
        let evictions = self.presence.sweep_liveness(self.clock.now());

        if evictions.is_empty() {
            return 0;
        }

        let mut affected: Vec<SessionId> = vec![];

        for eviction in &evictions {
            let connection = eviction.member.connection;

            self.broadcaster.clear_snapshot(connection);
            self.broadcaster.send(
                connection,
                Outbound::Kicked {
                    session_id: eviction.session_id.clone(),
                    reason: TIMED_OUT.to_string(),
                },
            );

            if !affected.contains(&eviction.session_id) {
                affected.push(eviction.session_id.clone());
            }
        }

        for session_id in &affected {
            self.publish_session(session_id);
        }

        self.publish_global_list();
        evictions.len()
    }

    /// Removes sessions that have had no members for longer than the configured TTL.
    pub fn reap_idle_sessions(&self) -> usize {
        let Some(ttl) = self.config.idle_session_ttl() else {
            return 0;
        };

        let now = self.clock.now();
        let reaped: Vec<_> = self
            .sessions
            .all()
            .into_iter()
            .filter(|s| s.is_idle(ttl, now))
            .filter_map(|s| self.sessions.remove_if_idle(s.id(), ttl, now))
            .collect();

        for session in &reaped {
            self.close(session);
            info!("Reaped idle session {} ({})", session.name(), session.id());
        }

        if !reaped.is_empty() {
            self.publish_global_list();
        }

        reaped.len()
    }

    /// Tears down a connection. Safe to call more than once.
    pub fn disconnect(&self, connection: ConnectionId) {
        let attached = self.broadcaster.detach(connection);
        let now = self.clock.now();

        if let Some(session_id) = self.presence.session_of(connection) {
            self.presence.leave(&session_id, connection, now);
            self.publish(&session_id);
        }

        if attached {
            info!("Connection {} closed", connection);
        }
    }

    fn join(
        &self,
        connection: ConnectionId,
        principal: &Principal,
        session_id: &SessionId,
        display_name: Option<&str>,
    ) -> Result<Member> {
        let now = self.clock.now();

        let outcome = match self
            .presence
            .join(session_id, connection, principal, display_name, now)
        {
            Ok(outcome) => outcome,
            Err(CoordinatorError::AlreadyMember(_)) => {
                // Joining again only renames the member
                let update = MemberUpdate {
                    display_name: display_name
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(String::from),
                    ..Default::default()
                };

                let member = self
                    .presence
                    .update_state(session_id, connection, update, now)?;

                self.publish(session_id);
                return Ok(member);
            }
            Err(error) => return Err(error),
        };

        if let Some(previous) = &outcome.previous {
            self.publish_session(previous);
        }

        self.publish(session_id);
        Ok(outcome.member)
    }

    fn leave(&self, connection: ConnectionId, now: Timestamp) {
        let Some(session_id) = self.presence.session_of(connection) else {
            return;
        };

        self.presence.leave(&session_id, connection, now);
        self.broadcaster.clear_snapshot(connection);
        self.publish(&session_id);
    }

    fn select_media(&self, session_id: &SessionId, media_id: String, now: Timestamp) -> Result<()> {
        let state = self.playback.select_media(session_id, media_id, now)?;
        let session = self.sessions.get(session_id)?;

        if let Some(media_id) = state.media() {
            self.broadcaster.send_all(
                session.member_ids(),
                &Outbound::MediaSelected {
                    session_id: session_id.clone(),
                    media_id: media_id.to_string(),
                },
            );
        }

        self.publish(session_id);
        Ok(())
    }

    fn current_session(&self, connection: ConnectionId) -> Result<SessionId> {
        self.presence
            .session_of(connection)
            .ok_or(CoordinatorError::NotMember)
    }
}
