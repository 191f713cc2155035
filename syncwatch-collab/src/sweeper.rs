use log::{debug, info};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::CoordinatorContext;

/// A handle to the background sweep, which stops it when dropped.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Spawns the sweep onto the current tokio runtime.
    pub(crate) fn spawn(context: &CoordinatorContext) -> Self {
        let (shutdown, mut stop) = oneshot::channel();
        let context = context.clone();
        let period = context.config.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Sweeping for dead members every {:?}, evicting after {} missed heartbeats",
                period,
                context.config.tolerated_missed_heartbeats()
            );

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        let evicted = context.sweep();
                        let reaped = context.reap_idle_sessions();

                        if evicted + reaped > 0 {
                            debug!("Sweep evicted {} member(s) and reaped {} session(s)", evicted, reaped);
                        }
                    }
                }
            }

            info!("Sweeper stopped");
        });

        Self {
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Stops the sweep and waits for the task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use syncwatch_core::{Config, ManualClock};

    use crate::{Command, Coordinator};

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_silent_members_on_its_own() {
        let clock = Arc::new(ManualClock::default());
        let coordinator = Coordinator::with_clock(Config::default(), clock.clone());

        let alice = coordinator.connect(Some("alice"));
        alice.handle(Command::CreateSession {
            name: "movie-night".into(),
        });
        let session = coordinator.sessions().all()[0].clone();

        alice.handle(Command::JoinSession {
            session_id: session.id().clone(),
            name: Some("Alice".into()),
        });
        assert_eq!(session.stored_member_count(), 1);

        let sweeper = coordinator.spawn_sweeper();

        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(session.stored_member_count(), 0);
        assert_eq!(coordinator.presence().session_of(alice.id()), None);

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_reaped_when_configured() {
        let clock = Arc::new(ManualClock::default());
        let config = Config {
            idle_session_ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let coordinator = Coordinator::with_clock(config, clock.clone());

        let alice = coordinator.connect(Some("alice"));
        alice.handle(Command::CreateSession {
            name: "abandoned".into(),
        });
        assert_eq!(coordinator.sessions().len(), 1);

        let sweeper = coordinator.spawn_sweeper();

        clock.advance(Duration::from_secs(61));
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(coordinator.sessions().is_empty());
        assert!(sweeper.is_running());

        drop(sweeper);
    }
}
