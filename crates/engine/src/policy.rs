use nowbar_core::{NowPlayingInfo, NowPlayingState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkDecision {
    /// Ask the provider for artwork. Carries the attempt number (1-based).
    Fetch { attempt: u32 },
    /// Keep whatever the previous state had.
    Reuse(Option<String>),
}

/// Bounds artwork requests per track.
///
/// A new track resets the counter. The same track is retried only while it
/// still has no artwork and fewer than `max_attempts` requests were made.
#[derive(Debug, Clone)]
pub struct ArtworkFetchTracker {
    max_attempts: u32,
    attempts: u32,
}

impl ArtworkFetchTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    pub fn decide(
        &mut self,
        previous: Option<&NowPlayingState>,
        incoming: &NowPlayingInfo,
    ) -> ArtworkDecision {
        match previous {
            Some(prev) if prev.is_same_track(incoming) => {
                if prev.artwork_id.is_some() || self.attempts >= self.max_attempts {
                    return ArtworkDecision::Reuse(prev.artwork_id.clone());
                }
            }
            _ => self.attempts = 0,
        }
        self.attempts += 1;
        ArtworkDecision::Fetch {
            attempt: self.attempts,
        }
    }
}
