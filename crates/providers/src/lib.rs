use anyhow::{bail, Result};
use async_trait::async_trait;
use nowbar_core::{NowPlayingInfo, PlaybackAction, PlayerIdentity};
use std::sync::Arc;
use tracing::debug;

/// Source of now-playing metadata and artwork.
///
/// Returning `Ok(None)` or `Err` are both treated as "nothing playing" by
/// the aggregator; implementations must tolerate being polled indefinitely.
#[async_trait]
pub trait NowPlayingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_now_playing(&self) -> Result<Option<NowPlayingInfo>>;
    async fn fetch_artwork(&self, identity: &PlayerIdentity) -> Result<Option<Vec<u8>>>;
}

/// Sends playback commands to one concrete player application.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, action: PlaybackAction, target: &PlayerIdentity) -> Result<()>;
}

pub fn build_provider() -> Arc<dyn NowPlayingProvider> {
    platform::provider().unwrap_or_else(|| Arc::new(NullProvider))
}

pub fn build_executor() -> Arc<dyn CommandExecutor> {
    platform::executor().unwrap_or_else(|| Arc::new(NullExecutor))
}

/// Never reports anything playing. Used where no platform integration exists.
pub struct NullProvider;

#[async_trait]
impl NowPlayingProvider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn fetch_now_playing(&self) -> Result<Option<NowPlayingInfo>> {
        Ok(None)
    }

    async fn fetch_artwork(&self, _identity: &PlayerIdentity) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

pub struct NullExecutor;

#[async_trait]
impl CommandExecutor for NullExecutor {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn send(&self, action: PlaybackAction, target: &PlayerIdentity) -> Result<()> {
        debug!(?action, ?target, "no command executor on this platform");
        bail!("playback control is not supported on this platform")
    }
}

mod platform {
    use super::{CommandExecutor, NowPlayingProvider};
    use std::sync::Arc;

    #[cfg(target_os = "macos")]
    pub fn provider() -> Option<Arc<dyn NowPlayingProvider>> {
        Some(Arc::new(crate::macos::ScriptedProvider::new()))
    }

    #[cfg(not(target_os = "macos"))]
    pub fn provider() -> Option<Arc<dyn NowPlayingProvider>> {
        None
    }

    #[cfg(target_os = "macos")]
    pub fn executor() -> Option<Arc<dyn CommandExecutor>> {
        Some(Arc::new(crate::macos::ScriptedExecutor::new()))
    }

    #[cfg(not(target_os = "macos"))]
    pub fn executor() -> Option<Arc<dyn CommandExecutor>> {
        None
    }
}

pub mod script;

#[cfg(target_os = "macos")]
mod macos;
