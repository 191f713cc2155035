use rand::{thread_rng, Rng};

use crate::{ensure_finite, normalize_text, Config, ConnectionId, CoordinatorError, Result, Timestamp};

/// One connection's presence within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub connection: ConnectionId,
    /// The principal the connection acts on behalf of
    pub principal: String,
    pub display_name: String,
    pub joined_at: Timestamp,
    pub last_heartbeat: Timestamp,
    /// The member's own idea of where playback is, in seconds. Not authoritative.
    pub position: f64,
    pub buffering: bool,
    pub ready: bool,
    pub volume: f64,
    pub rate: f64,
    /// Round trip time of the last heartbeat, in milliseconds
    pub latency_ms: Option<u32>,
}

/// A partial update a member reports about its local player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberUpdate {
    pub display_name: Option<String>,
    pub position: Option<f64>,
    pub buffering: Option<bool>,
    pub ready: Option<bool>,
    pub volume: Option<f64>,
    pub rate: Option<f64>,
    pub latency_ms: Option<u32>,
}

impl Member {
    pub fn new(
        connection: ConnectionId,
        principal: impl Into<String>,
        display_name: String,
        now: Timestamp,
    ) -> Self {
        Self {
            connection,
            principal: principal.into(),
            display_name,
            joined_at: now,
            last_heartbeat: now,
            position: 0.,
            buffering: false,
            ready: false,
            volume: 1.,
            rate: 1.,
            latency_ms: None,
        }
    }

    /// Refreshes the last heartbeat.
    pub fn touch(&mut self, now: Timestamp) {
        // Out of order delivery must not move the heartbeat backwards
        self.last_heartbeat = self.last_heartbeat.max(now);
    }

    /// Returns true if the member was heard from within the liveness window.
    pub fn is_alive(&self, now: Timestamp, window: chrono::Duration) -> bool {
        now - self.last_heartbeat <= window
    }

    /// Merges a partial update into the member and refreshes the heartbeat.
    /// All fields are validated before any of them is applied.
    pub fn merge(&mut self, update: MemberUpdate, config: &Config, now: Timestamp) -> Result<()> {
        let display_name = update
            .display_name
            .map(|name| {
                normalize_text(&name, config.display_name_max_length)
                    .ok_or_else(|| CoordinatorError::invalid("display name is empty or too long"))
            })
            .transpose()?;

        let position = update
            .position
            .map(|p| ensure_finite("position", p).map(|p| p.max(0.)))
            .transpose()?;

        let volume = update
            .volume
            .map(|v| ensure_finite("volume", v).map(|v| v.clamp(0., 1.)))
            .transpose()?;

        let rate = update
            .rate
            .map(|r| ensure_finite("rate", r).map(|r| config.clamp_rate(r)))
            .transpose()?;

        if let Some(display_name) = display_name {
            self.display_name = display_name;
        }
        if let Some(position) = position {
            self.position = position;
        }
        if let Some(volume) = volume {
            self.volume = volume;
        }
        if let Some(rate) = rate {
            self.rate = rate;
        }
        if let Some(buffering) = update.buffering {
            self.buffering = buffering;
        }
        if let Some(ready) = update.ready {
            self.ready = ready;
        }
        if let Some(latency) = update.latency_ms {
            self.latency_ms = Some(latency);
        }

        self.touch(now);
        Ok(())
    }
}

/// Picks the display name for a joining member, falling back to a generated `User1234` style name.
pub fn display_name_or_default(requested: Option<&str>, config: &Config) -> String {
    requested
        .and_then(|name| normalize_text(name, config.display_name_max_length))
        .unwrap_or_else(|| format!("User{}", thread_rng().gen_range(0..10000)))
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::{display_name_or_default, Member, MemberUpdate};
    use crate::{Config, ConnectionId};

    fn member() -> Member {
        Member::new(ConnectionId::new(), "alice", "Alice".into(), Utc::now())
    }

    #[test]
    fn liveness_follows_the_window() {
        let member = member();
        let window = Duration::seconds(9);

        assert!(member.is_alive(member.last_heartbeat + Duration::seconds(9), window));
        assert!(!member.is_alive(member.last_heartbeat + Duration::seconds(10), window));
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut member = member();
        let heartbeat = member.last_heartbeat;

        member.touch(heartbeat - Duration::seconds(3));
        assert_eq!(member.last_heartbeat, heartbeat);
    }

    #[test]
    fn merge_applies_fields_and_refreshes_heartbeat() {
        let config = Config::default();
        let mut member = member();
        let later = member.last_heartbeat + Duration::seconds(4);

        member
            .merge(
                MemberUpdate {
                    position: Some(12.5),
                    buffering: Some(true),
                    volume: Some(3.),
                    latency_ms: Some(40),
                    ..Default::default()
                },
                &config,
                later,
            )
            .unwrap();

        assert_eq!(member.position, 12.5);
        assert!(member.buffering);
        assert_eq!(member.volume, 1.);
        assert_eq!(member.latency_ms, Some(40));
        assert_eq!(member.last_heartbeat, later);
    }

    #[test]
    fn merge_is_all_or_nothing() {
        let config = Config::default();
        let mut member = member();
        let before = member.clone();

        let result = member.merge(
            MemberUpdate {
                position: Some(5.),
                rate: Some(f64::NAN),
                ..Default::default()
            },
            &config,
            Utc::now(),
        );

        assert!(result.is_err());
        assert_eq!(member, before);
    }

    #[test]
    fn blank_display_names_get_a_default() {
        let config = Config::default();

        assert_eq!(display_name_or_default(Some(" Bob "), &config), "Bob");
        assert!(display_name_or_default(Some(""), &config).starts_with("User"));
        assert!(display_name_or_default(None, &config).starts_with("User"));
    }
}
