use serde::{Deserialize, Serialize};

pub const SPOTIFY_BUNDLE_ID: &str = "com.spotify.client";
pub const APPLE_MUSIC_BUNDLE_ID: &str = "com.apple.Music";

const BROWSER_BUNDLE_IDS: &[&str] = &[
    "com.apple.Safari",
    "com.apple.SafariTechnologyPreview",
    "com.google.Chrome",
    "com.google.Chrome.canary",
    "org.mozilla.firefox",
    "org.mozilla.firefoxdeveloperedition",
    "com.microsoft.edgemac",
    "com.brave.Browser",
    "company.thebrowser.Browser",
    "com.operasoftware.Opera",
    "com.vivaldi.Vivaldi",
];

/// Which kind of application is producing the current media.
///
/// Derived from `source_app_identity` on every state; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerIdentity {
    Spotify,
    AppleMusic,
    Browser(String),
    Generic(String),
    None,
}

impl PlayerIdentity {
    pub fn classify(bundle_id: Option<&str>) -> Self {
        let Some(id) = bundle_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Self::None;
        };
        if id.eq_ignore_ascii_case(SPOTIFY_BUNDLE_ID) {
            Self::Spotify
        } else if id.eq_ignore_ascii_case(APPLE_MUSIC_BUNDLE_ID) {
            Self::AppleMusic
        } else if BROWSER_BUNDLE_IDS
            .iter()
            .any(|browser| id.eq_ignore_ascii_case(browser))
        {
            Self::Browser(id.to_string())
        } else {
            Self::Generic(id.to_string())
        }
    }

    /// Only the two scriptable players accept playback commands.
    pub fn is_controllable(&self) -> bool {
        matches!(self, Self::Spotify | Self::AppleMusic)
    }

    pub fn supports_artwork(&self) -> bool {
        self.is_controllable()
    }

    pub fn app_name(&self) -> Option<&'static str> {
        match self {
            Self::Spotify => Some("Spotify"),
            Self::AppleMusic => Some("Music"),
            _ => None,
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::AppleMusic => "music",
            Self::Browser(_) => "browser",
            Self::Generic(_) => "generic",
            Self::None => "none",
        }
    }
}
