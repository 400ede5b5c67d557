use crate::script::{self, NOW_PLAYING_JXA, SPOTIFY_ARTWORK_URL_SCRIPT};
use crate::{CommandExecutor, NowPlayingProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use nowbar_core::{NowPlayingInfo, PlaybackAction, PlayerIdentity};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);
const ARTWORK_DOWNLOAD_TIMEOUT_SECS: u32 = 5;

async fn run_checked(mut cmd: Command, what: &str) -> Result<Vec<u8>> {
    let output = tokio::time::timeout(SCRIPT_TIMEOUT, cmd.kill_on_drop(true).output())
        .await
        .map_err(|_| anyhow!("{what} timed out"))?
        .with_context(|| format!("failed to run {what}"))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{what} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(output.stdout)
}

async fn osascript(lang: Option<&str>, source: &str) -> Result<String> {
    let mut cmd = Command::new("osascript");
    if let Some(lang) = lang {
        cmd.arg("-l").arg(lang);
    }
    cmd.arg("-e").arg(source);
    let stdout = run_checked(cmd, "osascript").await?;
    String::from_utf8(stdout).context("invalid UTF-8 from osascript")
}

#[derive(Default)]
pub struct ScriptedProvider;

impl ScriptedProvider {
    pub fn new() -> Self {
        Self
    }

    fn artwork_path() -> PathBuf {
        std::env::temp_dir().join(format!("nowbar-artwork-{}.bin", std::process::id()))
    }

    async fn music_artwork(&self) -> Result<Option<Vec<u8>>> {
        let path = Self::artwork_path();
        let path_str = path.to_string_lossy().into_owned();
        let printed = osascript(None, &script::music_artwork_script(&path_str)).await?;
        if printed.trim().is_empty() {
            return Ok(None);
        }
        script::take_exported_artwork(&path).await
    }

    async fn spotify_artwork(&self) -> Result<Option<Vec<u8>>> {
        let url = osascript(None, SPOTIFY_ARTWORK_URL_SCRIPT).await?;
        let url = url.trim();
        if !url.starts_with("https://") {
            return Ok(None);
        }
        let mut cmd = Command::new("curl");
        cmd.arg("-sfL")
            .arg("--max-time")
            .arg(ARTWORK_DOWNLOAD_TIMEOUT_SECS.to_string())
            .arg(url);
        let bytes = run_checked(cmd, "curl").await?;
        Ok(Some(bytes).filter(|b| !b.is_empty()))
    }
}

#[async_trait]
impl NowPlayingProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "osascript"
    }

    async fn fetch_now_playing(&self) -> Result<Option<NowPlayingInfo>> {
        let stdout = osascript(Some("JavaScript"), NOW_PLAYING_JXA).await?;
        script::parse_now_playing(&stdout)
    }

    async fn fetch_artwork(&self, identity: &PlayerIdentity) -> Result<Option<Vec<u8>>> {
        match identity {
            PlayerIdentity::AppleMusic => self.music_artwork().await,
            PlayerIdentity::Spotify => self.spotify_artwork().await,
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct ScriptedExecutor;

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    fn name(&self) -> &'static str {
        "osascript"
    }

    async fn send(&self, action: PlaybackAction, target: &PlayerIdentity) -> Result<()> {
        let source = script::command_script(action, target)?;
        debug!(?action, ?target, "sending player command");
        osascript(None, &source).await.map(|_| ())
    }
}
