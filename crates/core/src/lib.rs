pub mod config;
pub mod identity;
pub mod model;

pub use config::{clamp_poll_interval, AppConfig, Preferences, ServiceSettings};
pub use identity::PlayerIdentity;
pub use model::{NowPlayingInfo, NowPlayingState, PlaybackAction, LOADING_TITLE};
