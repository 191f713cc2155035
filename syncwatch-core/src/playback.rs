use crate::{ensure_finite, Config, CoordinatorError, ResumePolicy, Result, Timestamp};

/// An opaque reference to a playable asset. Resolving it is up to the media catalog.
pub type MediaId = String;

/// A single mutation of a session's transport state.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    SelectMedia(MediaId),
    SetPlaying(bool),
    /// Position in seconds.
    Seek(f64),
    SetRate(f64),
    SetVolume(f64),
    SetMuted(bool),
}

/// The authoritative transport state of a session.
///
/// Fields are private so that every mutation goes through a transport command,
/// which validates its input before touching anything and stamps `updated_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    media: Option<MediaId>,
    /// The position in seconds at `updated_at`.
    position: f64,
    playing: bool,
    rate: f64,
    volume: f64,
    muted: bool,
    updated_at: Timestamp,
}

impl PlaybackState {
    /// No media, paused at the start, normal speed, full volume, unmuted.
    pub fn new(now: Timestamp) -> Self {
        Self {
            media: None,
            position: 0.,
            playing: false,
            rate: 1.,
            volume: 1.,
            muted: false,
            updated_at: now,
        }
    }

    pub fn media(&self) -> Option<&str> {
        self.media.as_deref()
    }

    /// The stored position anchor, in seconds.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Estimates where playback is at `now`, in seconds.
    /// A paused session stays at its anchor.
    pub fn position_at(&self, now: Timestamp) -> f64 {
        if !self.playing {
            return self.position;
        }

        let elapsed = (now - self.updated_at).num_milliseconds().max(0) as f64 / 1000.;
        self.position + elapsed * self.rate
    }

    /// Applies a transport command. Either the whole command applies or nothing changes.
    pub fn apply(&mut self, command: TransportCommand, config: &Config, now: Timestamp) -> Result<()> {
        match command {
            TransportCommand::SelectMedia(media) => {
                self.select_media(media, config.resume_policy, now)
            }
            TransportCommand::SetPlaying(playing) => {
                self.set_playing(playing, now);
                Ok(())
            }
            TransportCommand::Seek(position) => self.seek(position, now),
            TransportCommand::SetRate(rate) => self.set_rate(rate, config, now),
            TransportCommand::SetVolume(volume) => self.set_volume(volume, now),
            TransportCommand::SetMuted(muted) => {
                self.set_muted(muted, now);
                Ok(())
            }
        }
    }

    /// Selects new media. Playback always stops so every member has to press play again.
    pub fn select_media(
        &mut self,
        media: MediaId,
        policy: ResumePolicy,
        now: Timestamp,
    ) -> Result<()> {
        let media = media.trim().to_string();

        if media.is_empty() {
            return Err(CoordinatorError::invalid("media id must not be empty"));
        }

        let is_switch = self.media.as_deref() != Some(media.as_str());

        if policy == ResumePolicy::Reset && is_switch {
            self.position = 0.;
        } else {
            self.position = self.position_at(now);
        }

        self.media = Some(media);
        self.playing = false;
        self.updated_at = now;

        Ok(())
    }

    pub fn set_playing(&mut self, playing: bool, now: Timestamp) {
        self.anchor(now);
        self.playing = playing;
    }

    /// Seeks to a position in seconds. Negative positions are clamped to the start.
    pub fn seek(&mut self, position: f64, now: Timestamp) -> Result<()> {
        let position = ensure_finite("position", position)?;

        self.position = position.max(0.);
        self.updated_at = now;

        Ok(())
    }

    pub fn set_rate(&mut self, rate: f64, config: &Config, now: Timestamp) -> Result<()> {
        let rate = config.clamp_rate(ensure_finite("rate", rate)?);

        self.anchor(now);
        self.rate = rate;

        Ok(())
    }

    /// Sets the volume, clamped to 0.0 - 1.0.
    pub fn set_volume(&mut self, volume: f64, now: Timestamp) -> Result<()> {
        let volume = ensure_finite("volume", volume)?.clamp(0., 1.);

        self.anchor(now);
        self.volume = volume;

        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool, now: Timestamp) {
        self.anchor(now);
        self.muted = muted;
    }

    /// Folds elapsed playback into the stored position, so a change of
    /// playing state or rate doesn't lose or invent progress.
    fn anchor(&mut self, now: Timestamp) {
        self.position = self.position_at(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::{PlaybackState, TransportCommand};
    use crate::{Config, CoordinatorError, ResumePolicy};

    #[test]
    fn new_state_is_fully_initialized() {
        let now = Utc::now();
        let state = PlaybackState::new(now);

        assert_eq!(state.media(), None);
        assert_eq!(state.position(), 0.);
        assert!(!state.is_playing());
        assert_eq!(state.rate(), 1.);
        assert_eq!(state.volume(), 1.);
        assert!(!state.is_muted());
        assert_eq!(state.updated_at(), now);
    }

    #[test]
    fn selecting_media_always_pauses() {
        let now = Utc::now();
        let config = Config::default();
        let mut state = PlaybackState::new(now);

        state.set_playing(true, now);
        state
            .apply(TransportCommand::SelectMedia("clip.mp4".into()), &config, now)
            .unwrap();

        assert!(!state.is_playing());
        assert_eq!(state.media(), Some("clip.mp4"));
    }

    #[test]
    fn reset_policy_rewinds_only_on_a_different_media() {
        let now = Utc::now();
        let mut state = PlaybackState::new(now);

        state.select_media("a.mp4".into(), ResumePolicy::Reset, now).unwrap();
        state.seek(42., now).unwrap();

        state.select_media("a.mp4".into(), ResumePolicy::Reset, now).unwrap();
        assert_eq!(state.position(), 42.);

        state.select_media("b.mp4".into(), ResumePolicy::Reset, now).unwrap();
        assert_eq!(state.position(), 0.);
    }

    #[test]
    fn resume_policy_keeps_position() {
        let now = Utc::now();
        let mut state = PlaybackState::new(now);

        state.seek(30., now).unwrap();
        state.select_media("b.mp4".into(), ResumePolicy::Resume, now).unwrap();

        assert_eq!(state.position(), 30.);
    }

    #[test]
    fn empty_media_is_rejected_without_changes() {
        let now = Utc::now();
        let mut state = PlaybackState::new(now);
        state.set_playing(true, now);

        let before = state.clone();
        let result = state.select_media("  ".into(), ResumePolicy::Reset, now + Duration::seconds(1));

        assert!(matches!(result, Err(CoordinatorError::InvalidArgument(_))));
        assert_eq!(state, before);
    }

    #[test]
    fn seek_clamps_negative_and_rejects_nan() {
        let now = Utc::now();
        let mut state = PlaybackState::new(now);

        state.seek(-5., now).unwrap();
        assert_eq!(state.position(), 0.);

        assert!(state.seek(f64::NAN, now).is_err());
        assert_eq!(state.position(), 0.);
    }

    #[test]
    fn later_seek_wins() {
        let now = Utc::now();
        let mut state = PlaybackState::new(now);

        state.seek(10., now).unwrap();
        state.seek(20., now).unwrap();

        assert_eq!(state.position(), 20.);
    }

    #[test]
    fn rate_and_volume_are_clamped() {
        let now = Utc::now();
        let config = Config::default();
        let mut state = PlaybackState::new(now);

        state.apply(TransportCommand::SetRate(10.), &config, now).unwrap();
        assert_eq!(state.rate(), config.max_rate);

        state.apply(TransportCommand::SetRate(-1.), &config, now).unwrap();
        assert_eq!(state.rate(), config.min_rate);

        state.apply(TransportCommand::SetVolume(1.7), &config, now).unwrap();
        assert_eq!(state.volume(), 1.);

        assert!(state
            .apply(TransportCommand::SetRate(f64::INFINITY), &config, now)
            .is_err());
    }

    #[test]
    fn playing_position_is_extrapolated_and_anchored_on_pause() {
        let start = Utc::now();
        let config = Config::default();
        let mut state = PlaybackState::new(start);

        state.seek(10., start).unwrap();
        state.set_rate(2., &config, start).unwrap();
        state.set_playing(true, start);

        let later = start + Duration::seconds(5);
        assert_eq!(state.position_at(later), 20.);
        // Reading never mutates
        assert_eq!(state.position(), 10.);

        state.set_playing(false, later);
        assert_eq!(state.position(), 20.);
        assert_eq!(state.position_at(later + Duration::seconds(30)), 20.);
    }
}
