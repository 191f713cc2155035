use std::sync::Arc;

use log::debug;
use syncwatch_core::{Config, MediaId, PlaybackState, Result, Timestamp, TransportCommand};

use crate::{SessionId, SessionRegistry};

/// Applies transport commands to the authoritative playback state of sessions.
///
/// Commands are serialized per session by the session lock, so the last command
/// to acquire it wins for any field both commands touch.
pub struct PlaybackController {
    config: Arc<Config>,
    sessions: Arc<SessionRegistry>,
}

impl PlaybackController {
    pub fn new(config: Arc<Config>, sessions: Arc<SessionRegistry>) -> Self {
        Self { config, sessions }
    }

    /// Applies a transport command and returns the resulting state.
    /// A rejected command leaves the session untouched.
    pub fn apply(
        &self,
        session_id: &SessionId,
        command: TransportCommand,
        now: Timestamp,
    ) -> Result<PlaybackState> {
        let session = self.sessions.get(session_id)?;
        let mut state = session.lock();

        debug!("Applying {:?} to session {}", command, session.name());

        state.playback.apply(command, &self.config, now)?;
        state.updated_at = now;

        Ok(state.playback.clone())
    }

    pub fn select_media(
        &self,
        session_id: &SessionId,
        media: MediaId,
        now: Timestamp,
    ) -> Result<PlaybackState> {
        self.apply(session_id, TransportCommand::SelectMedia(media), now)
    }

    pub fn set_playing(
        &self,
        session_id: &SessionId,
        playing: bool,
        now: Timestamp,
    ) -> Result<PlaybackState> {
        self.apply(session_id, TransportCommand::SetPlaying(playing), now)
    }

    pub fn seek(&self, session_id: &SessionId, position: f64, now: Timestamp) -> Result<PlaybackState> {
        self.apply(session_id, TransportCommand::Seek(position), now)
    }

    pub fn set_rate(&self, session_id: &SessionId, rate: f64, now: Timestamp) -> Result<PlaybackState> {
        self.apply(session_id, TransportCommand::SetRate(rate), now)
    }

    pub fn set_volume(
        &self,
        session_id: &SessionId,
        volume: f64,
        now: Timestamp,
    ) -> Result<PlaybackState> {
        self.apply(session_id, TransportCommand::SetVolume(volume), now)
    }

    pub fn set_muted(&self, session_id: &SessionId, muted: bool, now: Timestamp) -> Result<PlaybackState> {
        self.apply(session_id, TransportCommand::SetMuted(muted), now)
    }

    /// The current playback state of a session.
    pub fn state(&self, session_id: &SessionId) -> Result<PlaybackState> {
        Ok(self.sessions.get(session_id)?.playback())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use syncwatch_core::{Config, CoordinatorError, Principal};

    use super::PlaybackController;
    use crate::SessionRegistry;

    fn controller() -> (PlaybackController, Arc<SessionRegistry>, Principal) {
        let config = Arc::new(Config::default());
        let sessions = Arc::new(SessionRegistry::new(config.clone()));
        let alice = Principal::new("alice", &config);

        (
            PlaybackController::new(config, sessions.clone()),
            sessions,
            alice,
        )
    }

    #[test]
    fn commands_update_the_session() {
        let (controller, sessions, alice) = controller();
        let session = sessions.create("movie-night", &alice, Utc::now()).unwrap();
        let now = Utc::now() + Duration::seconds(1);

        controller
            .select_media(session.id(), "clip.mp4".into(), now)
            .unwrap();
        controller.seek(session.id(), 12., now).unwrap();
        let state = controller.set_playing(session.id(), true, now).unwrap();

        assert_eq!(state.media(), Some("clip.mp4"));
        assert!(state.is_playing());
        assert_eq!(state.position(), 12.);
        assert_eq!(session.summary(&Config::default(), now).updated_at, now);
    }

    #[test]
    fn rejected_commands_change_nothing() {
        let (controller, sessions, alice) = controller();
        let session = sessions.create("movie-night", &alice, Utc::now()).unwrap();
        let before = controller.state(session.id()).unwrap();

        let result = controller.seek(session.id(), f64::NAN, Utc::now());

        assert!(matches!(result, Err(CoordinatorError::InvalidArgument(_))));
        assert_eq!(controller.state(session.id()).unwrap(), before);
    }

    #[test]
    fn concurrent_seeks_leave_one_of_the_requested_positions() {
        let (controller, sessions, alice) = controller();
        let session = sessions.create("movie-night", &alice, Utc::now()).unwrap();
        let now = Utc::now();
        let positions = [15., 30., 45., 60., 75., 90., 105., 120.];

        std::thread::scope(|scope| {
            for position in positions {
                let controller = &controller;
                let id = session.id();

                scope.spawn(move || {
                    for _ in 0..100 {
                        controller.seek(id, position, now).unwrap();
                    }
                });
            }
        });

        // Never a mix of two seeks, always exactly one of them
        let state = controller.state(session.id()).unwrap();
        assert!(positions.contains(&state.position()));
        assert!(!state.is_playing());
    }

    #[test]
    fn missing_sessions_are_not_found() {
        let (controller, _, _) = controller();

        let result = controller.set_muted(&"nope".into(), true, Utc::now());
        assert!(matches!(result, Err(CoordinatorError::NotFound { .. })));
    }
}
