//! Pure projection from published state + preferences to what the status
//! item shows.

use nowbar_core::{NowPlayingState, PlayerIdentity, Preferences};

pub const ELLIPSIS: &str = "…";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayOptions {
    pub show_icon: bool,
    pub show_music_indicator: bool,
    pub show_artist: bool,
    pub show_title: bool,
    pub show_text: bool,
}

pub fn compute_display_options(state: &NowPlayingState, prefs: &Preferences) -> DisplayOptions {
    let paused = state.is_paused();
    let show_music_indicator = prefs.show_music_indicator && state.is_playing;
    let show_artist = prefs.show_artist
        && !state.artist.is_empty()
        && !(paused && prefs.hide_artist_when_paused);
    let show_title =
        prefs.show_title && !state.title.is_empty() && !(paused && prefs.hide_title_when_paused);
    let has_text = !state.artist.is_empty() || !state.title.is_empty();
    let show_text = has_text && (show_artist || show_title);
    // Falls back to the icon so the item never renders empty.
    let show_icon = prefs.show_app_icon || (!show_music_indicator && !show_text);

    DisplayOptions {
        show_icon,
        show_music_indicator,
        show_artist,
        show_title,
        show_text,
    }
}

/// Joins artist and title and fits the result into `max_display_width`
/// as measured by `measure`.
pub fn build_text<F>(
    state: &NowPlayingState,
    options: &DisplayOptions,
    prefs: &Preferences,
    measure: F,
) -> String
where
    F: Fn(&str) -> f64,
{
    let mut parts: Vec<&str> = Vec::with_capacity(2);
    if options.show_artist && !state.artist.is_empty() {
        parts.push(&state.artist);
    }
    if options.show_title && !state.title.is_empty() {
        parts.push(&state.title);
    }
    let text = parts.join(prefs.separator.as_str());
    truncate_to_width(&text, prefs.max_display_width, &prefs.separator, measure)
}

pub fn truncate_to_width<F>(text: &str, max_width: f64, separator: &str, measure: F) -> String
where
    F: Fn(&str) -> f64,
{
    if measure(text) <= max_width {
        return text.to_string();
    }

    let mut cut = text.to_string();
    while !cut.is_empty() && measure(&format!("{cut}{ELLIPSIS}")) > max_width {
        cut.pop();
    }

    let mut cut = cut.trim_end().to_string();
    if let Some(dangling) = separator.trim().chars().next() {
        if cut.ends_with(dangling) {
            cut.pop();
            cut = cut.trim_end().to_string();
        }
    }
    cut.push_str(ELLIPSIS);
    cut
}

/// Width function for fixed-pitch rendering, e.g. a terminal.
pub fn monospace_width(char_width: f64) -> impl Fn(&str) -> f64 {
    move |s: &str| s.chars().count() as f64 * char_width
}

/// Everything a status item needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub icon: Option<&'static str>,
    pub indicator: bool,
    pub text: Option<String>,
    pub compact: bool,
}

impl StatusLine {
    pub fn idle() -> Self {
        Self {
            icon: Some(PlayerIdentity::None.icon_name()),
            indicator: false,
            text: None,
            compact: false,
        }
    }

    pub fn project<F>(state: Option<&NowPlayingState>, prefs: &Preferences, measure: F) -> Self
    where
        F: Fn(&str) -> f64,
    {
        let Some(state) = state else {
            return Self {
                compact: prefs.compact_mode,
                ..Self::idle()
            };
        };

        let options = compute_display_options(state, prefs);
        let identity = PlayerIdentity::classify(state.source_app_identity.as_deref());
        Self {
            icon: options.show_icon.then(|| identity.icon_name()),
            indicator: options.show_music_indicator,
            text: options
                .show_text
                .then(|| build_text(state, &options, prefs, measure)),
            compact: prefs.compact_mode,
        }
    }

    /// Plain-text rendering used by the terminal front end.
    pub fn render(&self) -> String {
        let mut segments: Vec<String> = Vec::new();
        if let Some(icon) = self.icon {
            segments.push(format!("[{icon}]"));
        }
        if self.indicator {
            segments.push("♪".to_string());
        }
        if let Some(text) = &self.text {
            segments.push(text.clone());
        }
        segments.join(if self.compact { "" } else { " " })
    }
}
