use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const MIN_POLL_INTERVAL_SECS: f64 = 1.0;
pub const MAX_POLL_INTERVAL_SECS: f64 = 3_600.0;

fn default_schema_version() -> u32 {
    1
}

/// Clamps a configured poll interval into the supported range.
pub fn clamp_poll_interval(secs: f64) -> Duration {
    let secs = if secs.is_finite() {
        secs.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
    } else {
        MIN_POLL_INTERVAL_SECS
    };
    Duration::from_secs_f64(secs)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub show_app_icon: bool,
    pub show_music_indicator: bool,
    pub show_artist: bool,
    pub show_title: bool,
    pub hide_artist_when_paused: bool,
    pub hide_title_when_paused: bool,
    pub max_display_width: f64,
    pub separator: String,
    pub compact_mode: bool,
    pub poll_interval_secs: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_app_icon: true,
            show_music_indicator: true,
            show_artist: true,
            show_title: true,
            hide_artist_when_paused: false,
            hide_title_when_paused: false,
            max_display_width: 200.0,
            separator: " - ".to_string(),
            compact_mode: false,
            poll_interval_secs: 2.0,
        }
    }
}

impl Preferences {
    pub fn poll_interval(&self) -> Duration {
        clamp_poll_interval(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub reconcile_delay_ms: u64,
    pub max_artwork_attempts: u32,
    pub memory_cache_capacity: usize,
    pub cache_dir: Option<PathBuf>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            reconcile_delay_ms: 300,
            max_artwork_attempts: 2,
            memory_cache_capacity: 32,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub preferences: Preferences,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            log_level: default_log_level(),
            service: ServiceSettings::default(),
            preferences: Preferences::default(),
        }
    }
}
