use std::time::Duration;

/// What happens to the playback position when a session switches media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Selecting a different media id rewinds to the start.
    /// Re-selecting the current media keeps the position.
    #[default]
    Reset,
    /// The position is never touched by a media switch.
    Resume,
}

/// The configuration of the coordination core
#[derive(Debug, Clone)]
pub struct Config {
    /// How often clients are expected to send a heartbeat
    pub heartbeat_interval: Duration,
    /// How long a member may stay silent before it is considered dead
    pub liveness_window: Duration,
    /// How often the background sweep evicts dead members
    pub sweep_interval: Duration,
    /// How many chat messages a session keeps before evicting the oldest
    pub chat_retention: usize,
    /// How many chat messages are included in a snapshot
    pub chat_history_limit: usize,
    /// Maximum length of a chat message, in characters
    pub chat_max_length: usize,
    /// Maximum length of a session name, in characters
    pub session_name_max_length: usize,
    /// Maximum length of a display name, in characters
    pub display_name_max_length: usize,
    /// Lowest accepted playback rate
    pub min_rate: f64,
    /// Highest accepted playback rate
    pub max_rate: f64,
    /// Position handling when media changes
    pub resume_policy: ResumePolicy,
    /// Length of generated session ids
    pub session_id_length: usize,
    /// How many times id generation is retried on collision
    pub max_id_attempts: usize,
    /// Capacity of each connection's discrete event queue
    pub outbound_buffer: usize,
    /// Sessions without members are removed after this long, if set
    pub idle_session_ttl: Option<Duration>,
    /// Principal ids allowed to delete sessions and kick members anywhere
    pub admins: Vec<String>,
}

impl Config {
    /// The liveness window as a [chrono::Duration], for timestamp arithmetic
    pub fn liveness_window(&self) -> chrono::Duration {
        to_chrono(self.liveness_window)
    }

    /// The idle session TTL as a [chrono::Duration], if reaping is enabled
    pub fn idle_session_ttl(&self) -> Option<chrono::Duration> {
        self.idle_session_ttl.map(to_chrono)
    }

    /// How many heartbeats may be missed before a member is evicted
    pub fn tolerated_missed_heartbeats(&self) -> u32 {
        let interval = self.heartbeat_interval.as_millis().max(1);

        (self.liveness_window.as_millis() / interval).saturating_sub(1) as u32
    }

    /// Clamps a playback rate into the accepted range
    pub fn clamp_rate(&self, rate: f64) -> f64 {
        rate.clamp(self.min_rate, self.max_rate)
    }

    /// Returns true if the principal id is configured as an administrator
    pub fn is_admin(&self, principal_id: &str) -> bool {
        self.admins.iter().any(|a| a == principal_id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Clients ping every few seconds
            heartbeat_interval: Duration::from_secs(3),
            // Two missed beats are tolerated
            liveness_window: Duration::from_secs(9),
            sweep_interval: Duration::from_secs(5),
            chat_retention: 200,
            chat_history_limit: 50,
            chat_max_length: 1000,
            session_name_max_length: 128,
            display_name_max_length: 64,
            min_rate: 0.25,
            max_rate: 4.0,
            resume_policy: ResumePolicy::Reset,
            session_id_length: 9,
            max_id_attempts: 8,
            outbound_buffer: 64,
            // Empty sessions are kept until explicitly closed
            idle_session_ttl: None,
            admins: vec![],
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Config;

    #[test]
    fn default_window_tolerates_two_missed_beats() {
        let config = Config::default();

        assert_eq!(config.tolerated_missed_heartbeats(), 2);
        assert_eq!(config.liveness_window(), chrono::Duration::seconds(9));
    }

    #[test]
    fn rate_is_clamped_into_range() {
        let config = Config::default();

        assert_eq!(config.clamp_rate(10.0), 4.0);
        assert_eq!(config.clamp_rate(0.01), 0.25);
        assert_eq!(config.clamp_rate(1.5), 1.5);
    }

    #[test]
    fn admins_are_matched_by_id() {
        let config = Config {
            admins: vec!["root".into()],
            idle_session_ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        assert!(config.is_admin("root"));
        assert!(!config.is_admin("alice"));
        assert_eq!(config.idle_session_ttl(), Some(chrono::Duration::seconds(60)));
    }
}
