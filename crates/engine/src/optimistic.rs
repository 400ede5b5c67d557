use nowbar_core::{NowPlayingState, PlaybackAction, LOADING_TITLE};

/// Predicts the state right after `action`, before the player confirms it.
pub fn apply_optimistic(state: &NowPlayingState, action: PlaybackAction) -> NowPlayingState {
    let mut next = state.clone();
    match action {
        PlaybackAction::TogglePlayPause => {
            next.is_playing = !state.is_playing;
        }
        PlaybackAction::SkipNext | PlaybackAction::SkipPrevious => {
            next.title = LOADING_TITLE.to_string();
            next.artist = String::new();
            next.album = None;
            next.artwork_id = None;
            next.current_time = 0.0;
            next.total_time = 1.0;
        }
        PlaybackAction::Seek(secs) => {
            next.current_time = secs.max(0.0);
        }
    }
    next
}
