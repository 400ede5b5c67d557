use serde::{Deserialize, Serialize};

/// Placeholder title published while a skip is in flight.
pub const LOADING_TITLE: &str = "…";

fn default_total_time() -> f64 {
    1.0
}

/// Raw snapshot returned by a provider on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingInfo {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub album: Option<String>,
    pub is_playing: bool,
    pub source_app_identity: Option<String>,
    #[serde(default = "default_total_time")]
    pub total_time: f64,
    #[serde(default)]
    pub current_time: f64,
}

impl NowPlayingInfo {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: None,
            is_playing: false,
            source_app_identity: None,
            total_time: default_total_time(),
            current_time: 0.0,
        }
    }
}

/// The published, authoritative state. Replaced wholesale on every publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingState {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub is_playing: bool,
    pub source_app_identity: Option<String>,
    pub total_time: f64,
    pub current_time: f64,
    pub artwork_id: Option<String>,
}

impl NowPlayingState {
    pub fn from_info(info: NowPlayingInfo, artwork_id: Option<String>) -> Self {
        Self {
            title: info.title,
            artist: info.artist,
            album: info.album,
            is_playing: info.is_playing,
            source_app_identity: info.source_app_identity,
            total_time: info.total_time,
            current_time: info.current_time,
            artwork_id,
        }
    }

    /// Same title, artist, album and source. Playback position and the
    /// playing flag are ignored.
    pub fn is_same_track(&self, info: &NowPlayingInfo) -> bool {
        self.title == info.title
            && self.artist == info.artist
            && self.album == info.album
            && self.source_app_identity == info.source_app_identity
    }

    pub fn is_paused(&self) -> bool {
        !self.is_playing
    }

    pub fn progress(&self) -> f64 {
        if self.total_time <= 0.0 {
            return 0.0;
        }
        (self.current_time / self.total_time).clamp(0.0, 1.0)
    }
}

/// User-initiated playback actions. Also the command vocabulary sent to
/// player executors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlaybackAction {
    TogglePlayPause,
    SkipNext,
    SkipPrevious,
    Seek(f64),
}

impl PlaybackAction {
    /// Parses the short command names used on the command line and stdin.
    pub fn parse(input: &str) -> Option<Self> {
        let mut parts = input.split_whitespace();
        let verb = parts.next()?;
        let action = match verb {
            "toggle" | "play-pause" | "playpause" => Self::TogglePlayPause,
            "next" => Self::SkipNext,
            "prev" | "previous" => Self::SkipPrevious,
            "seek" => {
                let secs: f64 = parts.next()?.parse().ok()?;
                if !secs.is_finite() || secs < 0.0 {
                    return None;
                }
                Self::Seek(secs)
            }
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(action)
    }
}
