use crate::service::NowPlayingService;
use nowbar_core::{PlaybackAction, PlayerIdentity};
use nowbar_providers::CommandExecutor;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct Dispatched {
    pub target: PlayerIdentity,
    pub command: JoinHandle<()>,
    pub reconcile: JoinHandle<()>,
}

/// Routes user actions to whichever player the latest state came from.
///
/// The target is re-derived from the published state on every call, so a
/// source switch between polls is picked up by the next action.
#[derive(Clone)]
pub struct PlayerControls {
    service: NowPlayingService,
    executor: Arc<dyn CommandExecutor>,
}

impl PlayerControls {
    pub fn new(service: NowPlayingService, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { service, executor }
    }

    pub fn target(&self) -> PlayerIdentity {
        let current = self.service.current();
        PlayerIdentity::classify(
            current
                .as_ref()
                .and_then(|state| state.source_app_identity.as_deref()),
        )
    }

    pub fn can_control(&self) -> bool {
        self.target().is_controllable()
    }

    /// Sends `action` to the bound player and lets the service publish the
    /// optimistic state. Returns `None` when nothing controllable is bound.
    pub fn dispatch(&self, action: PlaybackAction) -> Option<Dispatched> {
        let target = self.target();
        if !target.is_controllable() {
            debug!(?action, ?target, "ignoring action for uncontrollable source");
            return None;
        }

        let executor = Arc::clone(&self.executor);
        let command_target = target.clone();
        let command = tokio::spawn(async move {
            if let Err(err) = executor.send(action, &command_target).await {
                warn!(executor = executor.name(), ?action, target = ?command_target, error = %err, "player command failed");
            }
        });
        let reconcile = self.service.perform(action);

        Some(Dispatched {
            target,
            command,
            reconcile,
        })
    }
}
