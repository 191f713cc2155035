use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use syncwatch_core::{ConnectionId, Result};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};

use crate::{CoordinatorContext, Outbound, SessionId, SessionSnapshot, SessionSummary};

/// Empty while the connection is not in a session
type SnapshotCell = Option<Arc<SessionSnapshot>>;
type ListCell = Arc<Vec<SessionSummary>>;

/// Delivers state to connections without ever blocking the publisher.
///
/// Snapshots and the session list are latest-value cells, so a slow connection skips
/// straight to the newest state. Discrete events go through a bounded queue and are
/// dropped when it is full.
pub struct Broadcaster {
    capacity: usize,
    outboxes: DashMap<ConnectionId, Outbox>,
}

struct Outbox {
    snapshot: watch::Sender<SnapshotCell>,
    sessions: watch::Sender<ListCell>,
    events: mpsc::Sender<Outbound>,
}

/// The receiving side of a connection's outbox.
pub struct OutboxReceiver {
    snapshot: watch::Receiver<SnapshotCell>,
    sessions: watch::Receiver<ListCell>,
    events: mpsc::Receiver<Outbound>,
    snapshot_open: bool,
    sessions_open: bool,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            outboxes: Default::default(),
        }
    }

    /// Registers an outbox for the connection, replacing any previous one.
    pub fn attach(&self, connection: ConnectionId) -> OutboxReceiver {
        let (snapshot, snapshot_receiver) = watch::channel(None);
        let (sessions, sessions_receiver) = watch::channel(Arc::new(vec![]));
        let (events, events_receiver) = mpsc::channel(self.capacity);

        self.outboxes.insert(
            connection,
            Outbox {
                snapshot,
                sessions,
                events,
            },
        );

        OutboxReceiver {
            snapshot: snapshot_receiver,
            sessions: sessions_receiver,
            events: events_receiver,
            snapshot_open: true,
            sessions_open: true,
        }
    }

    /// Removes the connection's outbox. The receiver ends once it has drained its queue.
    pub fn detach(&self, connection: ConnectionId) -> bool {
        self.outboxes.remove(&connection).is_some()
    }

    /// Queues a discrete event for the connection. Returns false if it was dropped.
    pub fn send(&self, connection: ConnectionId, message: Outbound) -> bool {
        let Some(outbox) = self.outboxes.get(&connection) else {
            debug!("Dropping message for detached connection {}", connection);
            return false;
        };

        match outbox.events.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Outbox of connection {} is full, dropping {}",
                    connection,
                    discriminant_name(&message)
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbox of connection {} is closed", connection);
                false
            }
        }
    }

    /// Queues the same event for every given connection.
    pub fn send_all<I>(&self, connections: I, message: &Outbound)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        for connection in connections {
            self.send(connection, message.clone());
        }
    }

    /// Replaces the connection's snapshot, unless it already holds a newer one of the same session.
    /// `is_member` is asked under the outbox lock whether the connection is still in the snapshot's
    /// session, so a snapshot that was in flight while the connection moved on is discarded.
    /// Returns whether the snapshot was delivered.
    pub fn deliver_snapshot<F>(
        &self,
        connection: ConnectionId,
        snapshot: Arc<SessionSnapshot>,
        is_member: F,
    ) -> bool
    where
        F: FnOnce(&SessionId) -> bool,
    {
        let Some(outbox) = self.outboxes.get(&connection) else {
            return false;
        };

        outbox.snapshot.send_if_modified(|current| {
            if !is_member(&snapshot.session.id) {
                return false;
            }

            let is_stale = current.as_ref().is_some_and(|current| {
                current.session.id == snapshot.session.id && current.revision >= snapshot.revision
            });

            if is_stale {
                return false;
            }

            *current = Some(snapshot);
            true
        })
    }

    /// Forgets the connection's snapshot, for when it is no longer in a session.
    pub fn clear_snapshot(&self, connection: ConnectionId) {
        if let Some(outbox) = self.outboxes.get(&connection) {
            outbox.snapshot.send_if_modified(|current| current.take().is_some());
        }
    }

    /// Replaces the session list of a single connection.
    pub fn deliver_list(&self, connection: ConnectionId, list: ListCell) {
        if let Some(outbox) = self.outboxes.get(&connection) {
            outbox.sessions.send_replace(list);
        }
    }

    /// Replaces the session list of every connection.
    pub fn deliver_list_to_all(&self, list: ListCell) {
        for outbox in self.outboxes.iter() {
            outbox.sessions.send_replace(list.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }
}

impl OutboxReceiver {
    /// Waits for the next message. Discrete events are drained before state updates.
    /// Returns `None` once the connection has been detached and its queue is empty.
    pub async fn recv(&mut self) -> Option<Outbound> {
        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => return event,

                changed = self.snapshot.changed(), if self.snapshot_open => match changed {
                    Ok(()) => {
                        if let Some(snapshot) = self.snapshot.borrow_and_update().clone() {
                            return Some(Outbound::SessionSnapshot(snapshot));
                        }
                    }
                    Err(_) => self.snapshot_open = false,
                },

                changed = self.sessions.changed(), if self.sessions_open => match changed {
                    Ok(()) => {
                        let list = self.sessions.borrow_and_update().clone();
                        return Some(Outbound::SessionList(list));
                    }
                    Err(_) => self.sessions_open = false,
                },
            }
        }
    }

    /// Returns the next message if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        if let Ok(event) = self.events.try_recv() {
            return Some(event);
        }

        if self.snapshot.has_changed().unwrap_or(false) {
            if let Some(snapshot) = self.snapshot.borrow_and_update().clone() {
                return Some(Outbound::SessionSnapshot(snapshot));
            }
        }

        if self.sessions.has_changed().unwrap_or(false) {
            let list = self.sessions.borrow_and_update().clone();
            return Some(Outbound::SessionList(list));
        }

        None
    }

    /// Drains everything that is ready right now.
    pub fn drain(&mut self) -> Vec<Outbound> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl CoordinatorContext {
    /// Takes a snapshot of the session at the current time.
    pub fn snapshot(&self, session_id: &SessionId) -> Result<Arc<SessionSnapshot>> {
        let session = self.sessions.get(session_id)?;
        Ok(Arc::new(session.snapshot(&self.config, self.clock.now())))
    }

    /// Delivers a fresh snapshot to every member of the session, then the session list to everyone.
    pub fn publish(&self, session_id: &SessionId) {
        self.publish_session(session_id);
        self.publish_global_list();
    }

    /// Delivers a fresh snapshot to every member of the session.
    /// A session that no longer exists is skipped.
    pub fn publish_session(&self, session_id: &SessionId) {
        let Ok(session) = self.sessions.get(session_id) else {
            return;
        };

        let snapshot = Arc::new(session.snapshot(&self.config, self.clock.now()));

        for connection in session.member_ids() {
            self.deliver_snapshot(connection, snapshot.clone());
        }
    }

    /// Delivers a snapshot to the connection if it is still a member of that session.
    pub fn deliver_snapshot(&self, connection: ConnectionId, snapshot: Arc<SessionSnapshot>) -> bool {
        let presence = &self.presence;

        self.broadcaster.deliver_snapshot(connection, snapshot, |session_id| {
            presence.session_of(connection).as_ref() == Some(session_id)
        })
    }

    /// Delivers the summary of every session to every connection.
    pub fn publish_global_list(&self) {
        let list = Arc::new(self.sessions.list(self.clock.now()));
        self.broadcaster.deliver_list_to_all(list);
    }
}

fn discriminant_name(message: &Outbound) -> &'static str {
    match message {
        Outbound::SessionSnapshot(_) => "session-snapshot",
        Outbound::SessionList(_) => "session-list",
        Outbound::MediaSelected { .. } => "media-selected",
        Outbound::Kicked { .. } => "kicked",
        Outbound::Heartbeat { .. } => "heartbeat",
        Outbound::Ack { .. } => "ack",
        Outbound::Rejected { .. } => "rejected",
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::Utc;
    use syncwatch_core::{Clock, Config, ConnectionId, ManualClock, Principal};

    use super::Broadcaster;
    use crate::{Command, ConnectionHandle, Coordinator, Outbound, SessionSnapshot};

    #[test]
    fn full_queues_drop_instead_of_blocking() {
        let broadcaster = Broadcaster::new(2);
        let connection = ConnectionId::new();
        let mut receiver = broadcaster.attach(connection);

        let heartbeat = || Outbound::Heartbeat {
            sent_at: Utc::now(),
        };

        assert!(broadcaster.send(connection, heartbeat()));
        assert!(broadcaster.send(connection, heartbeat()));
        assert!(!broadcaster.send(connection, heartbeat()));

        assert_eq!(receiver.drain().len(), 2);
    }

    #[test]
    fn detached_connections_receive_nothing() {
        let broadcaster = Broadcaster::new(4);
        let connection = ConnectionId::new();
        let _receiver = broadcaster.attach(connection);

        assert!(broadcaster.detach(connection));
        assert!(!broadcaster.send(
            connection,
            Outbound::Rejected {
                reason: "gone".into()
            }
        ));
        assert!(!broadcaster.detach(connection));
    }

    fn snapshots(handle: &mut ConnectionHandle) -> Vec<Arc<SessionSnapshot>> {
        handle
            .drain()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::SessionSnapshot(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn a_slow_reader_only_sees_the_latest_snapshot() {
        let config = Config::default();
        let clock = Arc::new(ManualClock::default());
        let coordinator = Coordinator::with_clock(config.clone(), clock.clone());
        let alice = Principal::new("alice", &config);

        let session = coordinator
            .context()
            .create_session("movie-night", &alice)
            .unwrap();

        let mut handle = coordinator.connect(Some("alice"));
        let connection = handle.id();
        coordinator
            .context()
            .presence
            .join(&session.id, connection, &alice, None, clock.now())
            .unwrap();

        let context = coordinator.context();
        let stale = context.snapshot(&session.id).unwrap();

        for position in [10., 20., 30.] {
            context.playback.seek(&session.id, position, clock.now()).unwrap();
            context.publish_session(&session.id);
        }

        // An older snapshot arriving late must not replace a newer one
        assert!(!context.deliver_snapshot(connection, stale));

        let snapshots = snapshots(&mut handle);

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].playback.position(), 30.);
    }

    #[test]
    fn snapshots_of_a_previous_session_are_discarded() {
        let coordinator = Coordinator::new(Config::default());
        let context = coordinator.context();
        let mut alice = coordinator.connect(Some("alice"));
        let principal = Principal::new("alice", coordinator.config());

        let first = context.create_session("first", &principal).unwrap();
        let second = context.create_session("second", &principal).unwrap();

        for session_id in [&first.id, &second.id] {
            alice.handle(Command::JoinSession {
                session_id: session_id.clone(),
                name: None,
            });
        }
        alice.drain();

        // Taken while the connection was still in the first session
        let in_flight = context.snapshot(&first.id).unwrap();
        context.publish_session(&second.id);

        assert!(!context.deliver_snapshot(alice.id(), in_flight));

        let snapshots = snapshots(&mut alice);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].session.id, second.id);
    }

    #[test]
    fn nothing_is_delivered_after_leaving() {
        let coordinator = Coordinator::new(Config::default());
        let context = coordinator.context();
        let mut alice = coordinator.connect(Some("alice"));
        let principal = Principal::new("alice", coordinator.config());

        let session = context.create_session("movie-night", &principal).unwrap();
        alice.handle(Command::JoinSession {
            session_id: session.id.clone(),
            name: None,
        });

        let in_flight = context.snapshot(&session.id).unwrap();
        alice.handle(Command::LeaveSession);
        alice.drain();

        assert!(!context.deliver_snapshot(alice.id(), in_flight));
        assert!(snapshots(&mut alice).is_empty());
    }
}
