//! The room coordination core: sessions, presence, synchronized playback and
//! the fan-out of state to every connection that watches along.

mod broadcast;
mod connection;
mod events;
mod playback;
mod presence;
mod registry;
mod session;
mod sweeper;

use std::sync::Arc;

pub use broadcast::*;
pub use connection::*;
pub use events::*;
pub use playback::*;
pub use presence::*;
pub use registry::*;
pub use session::*;
pub use sweeper::*;

use syncwatch_core::{Clock, Config, SystemClock, Timestamp};

/// The watch session coordinator, facilitating session management, presence and playback sync.
pub struct Coordinator {
    context: CoordinatorContext,
}

/// A type passed to the components of the coordinator, to access state and publish changes.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub playback: Arc<PlaybackController>,
    pub broadcaster: Arc<Broadcaster>,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a coordinator reading time from the given clock.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionRegistry::new(config.clone()));

        let context = CoordinatorContext {
            clock,
            presence: Arc::new(PresenceTracker::new(config.clone(), sessions.clone())),
            playback: Arc::new(PlaybackController::new(config.clone(), sessions.clone())),
            broadcaster: Arc::new(Broadcaster::new(config.outbound_buffer)),
            sessions,
            config,
        };

        Self { context }
    }

    /// Registers a new connection acting on behalf of the given identity.
    /// Connections without an identity get an anonymous principal.
    pub fn connect(&self, identity: Option<&str>) -> ConnectionHandle {
        ConnectionHandle::new(&self.context, identity)
    }

    /// Starts the background liveness sweep.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        SweeperHandle::spawn(&self.context)
    }

    /// Runs a liveness sweep right now, returning how many members were evicted.
    pub fn sweep(&self) -> usize {
        self.context.sweep()
    }

    /// The current time, as seen by the coordinator's clock.
    pub fn now(&self) -> Timestamp {
        self.context.clock.now()
    }

    pub fn context(&self) -> &CoordinatorContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.context.sessions
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.context.presence
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.context.playback
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.context.broadcaster
    }
}
