pub mod artwork_cache;
pub mod controls;
pub mod display;
pub mod latest;
pub mod optimistic;
pub mod policy;
pub mod service;

pub use artwork_cache::{artwork_key, Artwork, ArtworkCache, CacheError};
pub use controls::{Dispatched, PlayerControls};
pub use display::{
    build_text, compute_display_options, monospace_width, truncate_to_width, DisplayOptions,
    StatusLine, ELLIPSIS,
};
pub use latest::LatestValue;
pub use optimistic::apply_optimistic;
pub use policy::{ArtworkDecision, ArtworkFetchTracker};
pub use service::{NowPlayingService, ServiceConfig};
