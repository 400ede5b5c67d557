//! Script sources and output parsing for the osascript-backed players.
//!
//! Kept free of process handling so it can be exercised on every platform.

use anyhow::{anyhow, bail, Context, Result};
use nowbar_core::{NowPlayingInfo, PlaybackAction, PlayerIdentity};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// JXA program printing one JSON object describing the active player.
/// A playing source wins over a paused one.
pub const NOW_PLAYING_JXA: &str = r#"
function run() {
  const se = Application('System Events');
  const players = [['Spotify', 'com.spotify.client', 1000], ['Music', 'com.apple.Music', 1]];
  let paused = null;
  for (const [name, bundle, durationScale] of players) {
    if (se.processes.whose({ name: name }).length === 0) continue;
    const app = Application(name);
    const state = String(app.playerState());
    if (state !== 'playing' && state !== 'paused') continue;
    const track = app.currentTrack;
    const info = {
      state: state,
      title: track.name(),
      artist: track.artist(),
      album: track.album(),
      bundleId: bundle,
      duration: track.duration() / durationScale,
      position: app.playerPosition()
    };
    if (state === 'playing') return JSON.stringify(info);
    if (paused === null) paused = info;
  }
  return JSON.stringify(paused || { state: 'stopped' });
}
"#;

#[derive(Debug, Deserialize)]
struct JxaNowPlaying {
    state: String,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    #[serde(rename = "bundleId")]
    bundle_id: Option<String>,
    duration: Option<f64>,
    position: Option<f64>,
    error: Option<String>,
}

/// Parses the JSON printed by [`NOW_PLAYING_JXA`].
pub fn parse_now_playing(stdout: &str) -> Result<Option<NowPlayingInfo>> {
    let parsed: JxaNowPlaying =
        serde_json::from_str(stdout.trim()).context("invalid JSON from jxa script")?;

    if let Some(err) = parsed.error {
        bail!("jxa script reported: {err}");
    }

    let is_playing = match parsed.state.as_str() {
        "playing" => true,
        "paused" => false,
        _ => return Ok(None),
    };

    let Some(title) = parsed.title.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    let total_time = parsed
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(1.0);

    Ok(Some(NowPlayingInfo {
        title,
        artist: parsed.artist.unwrap_or_default(),
        album: parsed.album.filter(|a| !a.is_empty()),
        is_playing,
        source_app_identity: parsed.bundle_id,
        total_time,
        current_time: parsed.position.filter(|p| p.is_finite()).unwrap_or(0.0).max(0.0),
    }))
}

/// AppleScript that exports the current Music artwork to `path` and prints
/// the path, or prints nothing when the track has no artwork.
pub fn music_artwork_script(path: &str) -> String {
    format!(
        r#"tell application "Music"
  if (count of artworks of current track) is 0 then return ""
  set artData to raw data of artwork 1 of current track
end tell
set outFile to open for access (POSIX file "{path}") with write permission
try
  set eof outFile to 0
  write artData to outFile
  close access outFile
on error
  close access outFile
  return ""
end try
return "{path}""#
    )
}

/// Reads the file written by [`music_artwork_script`] and removes it,
/// whether or not the read succeeded. An empty export counts as no artwork.
pub async fn take_exported_artwork(path: &Path) -> Result<Option<Vec<u8>>> {
    let read = tokio::fs::read(path).await;
    if let Err(err) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %err, "failed to remove exported artwork");
    }
    let bytes =
        read.with_context(|| format!("failed to read exported artwork {}", path.display()))?;
    Ok(Some(bytes).filter(|b| !b.is_empty()))
}

pub const SPOTIFY_ARTWORK_URL_SCRIPT: &str =
    r#"tell application "Spotify" to return artwork url of current track"#;

/// AppleScript statement performing `action` against the bound player.
pub fn command_script(action: PlaybackAction, target: &PlayerIdentity) -> Result<String> {
    let app = target
        .app_name()
        .ok_or_else(|| anyhow!("{target:?} does not accept playback commands"))?;

    let verb = match action {
        PlaybackAction::TogglePlayPause => "playpause".to_string(),
        PlaybackAction::SkipNext => "next track".to_string(),
        PlaybackAction::SkipPrevious => "previous track".to_string(),
        PlaybackAction::Seek(secs) => format!("set player position to {:.3}", secs.max(0.0)),
    };

    Ok(format!(r#"tell application "{app}" to {verb}"#))
}

#[cfg(test)]
mod tests {
    use super::{command_script, parse_now_playing, take_exported_artwork};
    use nowbar_core::{PlaybackAction, PlayerIdentity};

    #[test]
    fn parses_playing_spotify() {
        let info = parse_now_playing(
            r#"{"state":"playing","title":"Karma Police","artist":"Radiohead","album":"OK Computer","bundleId":"com.spotify.client","duration":264.0,"position":31.5}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(info.title, "Karma Police");
        assert!(info.is_playing);
        assert_eq!(info.source_app_identity.as_deref(), Some("com.spotify.client"));
        assert_eq!(info.total_time, 264.0);
        assert_eq!(info.current_time, 31.5);
    }

    #[test]
    fn stopped_or_untitled_is_nothing() {
        assert!(parse_now_playing(r#"{"state":"stopped"}"#).unwrap().is_none());
        assert!(parse_now_playing(r#"{"state":"paused","title":""}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn zero_duration_falls_back_to_one_second() {
        let info = parse_now_playing(
            r#"{"state":"paused","title":"Live","album":"","duration":0,"position":-3}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(info.total_time, 1.0);
        assert_eq!(info.current_time, 0.0);
        assert!(info.album.is_none());
        assert!(!info.is_playing);
    }

    #[test]
    fn script_errors_surface() {
        assert!(parse_now_playing(r#"{"state":"error","error":"not authorized"}"#).is_err());
        assert!(parse_now_playing("garbage").is_err());
    }

    #[test]
    fn builds_player_commands() {
        assert_eq!(
            command_script(PlaybackAction::SkipNext, &PlayerIdentity::AppleMusic).unwrap(),
            r#"tell application "Music" to next track"#
        );
        assert_eq!(
            command_script(PlaybackAction::Seek(12.0), &PlayerIdentity::Spotify).unwrap(),
            r#"tell application "Spotify" to set player position to 12.000"#
        );
        assert!(command_script(
            PlaybackAction::TogglePlayPause,
            &PlayerIdentity::Browser("com.apple.Safari".into())
        )
        .is_err());
    }

    #[tokio::test]
    async fn exported_artwork_is_always_removed() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("art.bin");
        std::fs::write(&path, b"\x89PNG").unwrap();
        let bytes = take_exported_artwork(&path).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"\x89PNG"[..]));
        assert!(!path.exists());

        std::fs::write(&path, b"").unwrap();
        assert!(take_exported_artwork(&path).await.unwrap().is_none());
        assert!(!path.exists());

        let missing = dir.path().join("missing.bin");
        assert!(take_exported_artwork(&missing).await.is_err());
    }
}
