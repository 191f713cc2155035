use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use dashmap::{mapref::entry::Entry, DashMap};
use log::{info, warn};
use syncwatch_core::{normalize_text, Config, CoordinatorError, Principal, Result, Timestamp};

use crate::{ArcedSession, Session, SessionId, SessionSummary};

type IdGenerator = Box<dyn Fn() -> SessionId + Send + Sync>;

/// Owns every session. Lookups only lock the shard holding the requested session,
/// and sessions are inserted fully constructed, so readers never see a partial one.
pub struct SessionRegistry {
    config: Arc<Config>,
    sessions: DashMap<SessionId, ArcedSession>,
    sequence: AtomicCell<u64>,
    generate_id: IdGenerator,
}

impl SessionRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        let length = config.session_id_length;
        Self::with_id_generator(config, move || SessionId::generate(length))
    }

    /// Creates a registry with a custom id source.
    pub fn with_id_generator<F>(config: Arc<Config>, generate_id: F) -> Self
    where
        F: Fn() -> SessionId + Send + Sync + 'static,
    {
        Self {
            config,
            sessions: Default::default(),
            sequence: AtomicCell::new(0),
            generate_id: Box::new(generate_id),
        }
    }

    /// Creates a new session owned by the principal.
    pub fn create(&self, name: &str, owner: &Principal, now: Timestamp) -> Result<ArcedSession> {
        let name = normalize_text(name, self.config.session_name_max_length).ok_or_else(|| {
            CoordinatorError::invalid(format!(
                "session name must be between 1 and {} characters",
                self.config.session_name_max_length
            ))
        })?;

        for _ in 0..self.config.max_id_attempts {
            let id = (self.generate_id)();

            match self.sessions.entry(id) {
                Entry::Occupied(entry) => {
                    warn!("Session id {} is taken, generating another", entry.key());
                }
                Entry::Vacant(entry) => {
                    let session = Arc::new(Session::new(
                        entry.key().clone(),
                        name,
                        owner.id.clone(),
                        self.sequence.fetch_add(1),
                        &self.config,
                        now,
                    ));

                    entry.insert(session.clone());
                    info!("Session {} ({}) created by {}", session.name(), session.id(), owner.id);

                    return Ok(session);
                }
            }
        }

        Err(CoordinatorError::IdExhausted(self.config.max_id_attempts))
    }

    pub fn get(&self, id: &SessionId) -> Result<ArcedSession> {
        self.sessions
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| CoordinatorError::session_not_found(id))
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Every session, in insertion order.
    pub fn all(&self) -> Vec<ArcedSession> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by_key(|s| s.sequence());

        sessions
    }

    /// Summaries of every session, in insertion order.
    pub fn list(&self, now: Timestamp) -> Vec<SessionSummary> {
        self.all()
            .iter()
            .map(|s| s.summary(&self.config, now))
            .collect()
    }

    /// Deletes a session. Only its owner or an administrator may do this.
    pub fn delete(&self, id: &SessionId, requester: &Principal) -> Result<ArcedSession> {
        let session = self.get(id)?;

        if !requester.can_manage(session.owner()) {
            return Err(CoordinatorError::NotAuthorized {
                action: "delete this session",
            });
        }

        let (_, removed) = self
            .sessions
            .remove(id)
            .ok_or_else(|| CoordinatorError::session_not_found(id))?;

        info!("Session {} ({}) deleted by {}", removed.name(), id, requester.id);
        Ok(removed)
    }

    /// Removes the session if it is still idle once its shard is locked.
    /// A join that lands between the scan and the removal keeps the session alive.
    pub(crate) fn remove_if_idle(
        &self,
        id: &SessionId,
        ttl: chrono::Duration,
        now: Timestamp,
    ) -> Option<ArcedSession> {
        self.sessions
            .remove_if(id, |_, session| session.is_idle(ttl, now))
            .map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
