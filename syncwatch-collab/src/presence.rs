use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, info};
use syncwatch_core::{
    display_name_or_default, Config, ConnectionId, CoordinatorError, Member, MemberUpdate,
    Principal, Result, Timestamp,
};

use crate::{Session, SessionId, SessionRegistry};

/// Tracks which connection is in which session, and whether its members are still alive.
///
/// Lock order is always the membership entry first, then the session lock.
/// Nothing takes a membership entry while holding a session lock.
pub struct PresenceTracker {
    config: Arc<Config>,
    sessions: Arc<SessionRegistry>,
    /// The one session each connection currently belongs to
    memberships: DashMap<ConnectionId, SessionId>,
}

/// The result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub member: Member,
    /// The session the connection was moved out of, if any
    pub previous: Option<SessionId>,
}

/// What a heartbeat did to the member it was sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The connection has no member record in the session
    Ignored,
    Refreshed,
    /// The member had lapsed past the liveness window, but had not been swept yet
    Revived,
}

/// A member removed by a liveness sweep.
#[derive(Debug, Clone)]
pub struct Eviction {
    pub session_id: SessionId,
    pub member: Member,
}

impl PresenceTracker {
    pub fn new(config: Arc<Config>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            sessions,
            memberships: Default::default(),
        }
    }

    /// Adds the connection to a session, moving it out of any session it was in before.
    /// Joining the session the connection is already in fails with
    /// [CoordinatorError::AlreadyMember] and leaves the member untouched.
    ///
    /// If the target session doesn't exist, the connection keeps its current membership.
    pub fn join(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
        principal: &Principal,
        display_name: Option<&str>,
        now: Timestamp,
    ) -> Result<JoinOutcome> {
        let session = self.sessions.get(session_id)?;
        let display_name = display_name_or_default(display_name, &self.config);

        let membership = self.memberships.entry(connection);

        let previous = match &membership {
            Entry::Occupied(entry) if entry.get() == session_id => {
                return Err(CoordinatorError::AlreadyMember(connection.value()));
            }
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(_) => None,
        };

        if let Some(previous) = &previous {
            if let Ok(old_session) = self.sessions.get(previous) {
                let mut state = old_session.lock();

                if state.members.remove(&connection).is_some() {
                    state.updated_at = now;
                }
            }
        }

        let member = {
            let mut state = session.lock();

            let member = state
                .members
                .entry(connection)
                .and_modify(|m| {
                    m.display_name.clone_from(&display_name);
                    m.touch(now);
                })
                .or_insert_with(|| {
                    Member::new(connection, principal.id.as_str(), display_name, now)
                })
                .clone();

            state.updated_at = now;
            member
        };

        drop(membership.insert(session_id.clone()));

        // The session may have been deleted between the lookup and the insert
        if !self.sessions.contains(session_id) {
            self.remove_member(&session, connection, now, |_| true);
            return Err(CoordinatorError::session_not_found(session_id));
        }

        info!(
            "{} joined session {} on connection {}",
            member.display_name,
            session.name(),
            connection
        );

        Ok(JoinOutcome { member, previous })
    }

    /// Refreshes the member's heartbeat. A member that no longer exists is ignored.
    pub fn heartbeat(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
        now: Timestamp,
    ) -> Result<HeartbeatOutcome> {
        let session = self.sessions.get(session_id)?;
        let mut state = session.lock();

        let Some(member) = state.members.get_mut(&connection) else {
            return Ok(HeartbeatOutcome::Ignored);
        };

        let lapsed = !member.is_alive(now, self.config.liveness_window());
        member.touch(now);

        if lapsed {
            // It counts as active again, so the session has changed
            state.updated_at = now;
            Ok(HeartbeatOutcome::Revived)
        } else {
            Ok(HeartbeatOutcome::Refreshed)
        }
    }

    /// Records the round trip time of a heartbeat the member answered.
    pub fn record_latency(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
        latency_ms: u32,
        now: Timestamp,
    ) -> Result<Member> {
        self.update_state(
            session_id,
            connection,
            MemberUpdate {
                latency_ms: Some(latency_ms),
                ..Default::default()
            },
            now,
        )
    }

    /// Merges a partial update into the member and refreshes its heartbeat.
    pub fn update_state(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
        update: MemberUpdate,
        now: Timestamp,
    ) -> Result<Member> {
        let session = self.sessions.get(session_id)?;
        let mut state = session.lock();

        let member = state
            .members
            .get_mut(&connection)
            .ok_or(CoordinatorError::NotMember)?;

        member.merge(update, &self.config, now)?;
        let member = member.clone();

        state.updated_at = now;
        Ok(member)
    }

    /// Removes the connection from the session. Leaving twice, or leaving a session
    /// that has been deleted in the meantime, is not an error.
    pub fn leave(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
        now: Timestamp,
    ) -> Option<Member> {
        match self.sessions.get(session_id) {
            Ok(session) => {
                let member = self.remove_member(&session, connection, now, |_| true);

                if let Some(member) = &member {
                    info!("{} left session {}", member.display_name, session.name());
                }

                member
            }
            Err(_) => {
                self.release(connection, session_id);
                None
            }
        }
    }

    /// Removes another member from the session. Only the owner or an administrator may do this.
    pub fn kick(
        &self,
        session_id: &SessionId,
        requester: &Principal,
        target: ConnectionId,
        now: Timestamp,
    ) -> Result<Member> {
        let session = self.sessions.get(session_id)?;

        if !requester.can_manage(session.owner()) {
            return Err(CoordinatorError::NotAuthorized {
                action: "kick members from this session",
            });
        }

        let member = self
            .remove_member(&session, target, now, |_| true)
            .ok_or(CoordinatorError::NotMember)?;

        info!(
            "{} was kicked from session {} by {}",
            member.display_name,
            session.name(),
            requester.id
        );

        Ok(member)
    }

    /// Evicts members whose last heartbeat is older than the liveness window, in every session.
    /// Sessions deleted while the sweep runs are skipped.
    pub fn sweep_liveness(&self, now: Timestamp) -> Vec<Eviction> {
        let window = self.config.liveness_window();
        let mut evictions = vec![];

        for session in self.sessions.all() {
            if !self.sessions.contains(session.id()) {
                continue;
            }

            let stale: Vec<_> = session
                .lock()
                .members
                .values()
                .filter(|m| !m.is_alive(now, window))
                .map(|m| m.connection)
                .collect();

            for connection in stale {
                // A heartbeat may have arrived since the scan
                let removed =
                    self.remove_member(&session, connection, now, |m| !m.is_alive(now, window));

                if let Some(member) = removed {
                    debug!(
                        "Evicted {} from session {}, last heard from at {}",
                        member.display_name,
                        session.name(),
                        member.last_heartbeat
                    );

                    evictions.push(Eviction {
                        session_id: session.id().clone(),
                        member,
                    });
                }
            }
        }

        if !evictions.is_empty() {
            info!("Liveness sweep evicted {} member(s)", evictions.len());
        }

        evictions
    }

    /// Members of the session that pass the liveness check at `now`.
    pub fn active_members(&self, session_id: &SessionId, now: Timestamp) -> Result<Vec<Member>> {
        let session = self.sessions.get(session_id)?;
        Ok(session.active_members(&self.config, now))
    }

    /// The session the connection currently belongs to.
    pub fn session_of(&self, connection: ConnectionId) -> Option<SessionId> {
        self.memberships.get(&connection).map(|s| s.value().clone())
    }

    /// Forgets the connection's membership if it still points at the given session.
    pub fn release(&self, connection: ConnectionId, session_id: &SessionId) {
        self.memberships
            .remove_if(&connection, |_, current| current == session_id);
    }

    /// The number of connections that are in a session.
    pub fn membership_count(&self) -> usize {
        self.memberships.len()
    }

    /// The removal path shared by leave, kick, disconnect and the sweep.
    /// The member is only removed if `should_remove` agrees under the session lock.
    fn remove_member<F>(
        &self,
        session: &Session,
        connection: ConnectionId,
        now: Timestamp,
        should_remove: F,
    ) -> Option<Member>
    where
        F: FnOnce(&Member) -> bool,
    {
        let membership = self.memberships.entry(connection);

        let (removed, retained) = {
            let mut state = session.lock();

            match state.members.get(&connection) {
                Some(member) if !should_remove(member) => (None, true),
                Some(_) => {
                    state.updated_at = now;
                    (state.members.remove(&connection), false)
                }
                None => (None, false),
            }
        };

        if !retained {
            if let Entry::Occupied(entry) = membership {
                if entry.get() == session.id() {
                    entry.remove();
                }
            }
        }

        removed
    }
}
