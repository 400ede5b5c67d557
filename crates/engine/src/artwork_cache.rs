//! Content-addressed artwork store.
//!
//! Two tiers: a bounded in-memory map of decoded artwork and one file per
//! key under the cache directory. Files are written to a temporary name and
//! renamed into place, so a reader sees either the old file or the new one.

use nowbar_core::NowPlayingInfo;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("artwork cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artwork bytes are not a decodable image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Deterministic cache key: SHA-256 hex of `title|artist|album|source`.
pub fn artwork_key(info: &NowPlayingInfo) -> String {
    let joined = format!(
        "{}|{}|{}|{}",
        info.title,
        info.artist,
        info.album.as_deref().unwrap_or(""),
        info.source_app_identity.as_deref().unwrap_or("")
    );
    format!("{:x}", Sha256::digest(joined.as_bytes()))
}

/// Decoded artwork held by the memory tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl Artwork {
    pub fn decode(bytes: Vec<u8>) -> Result<Self, CacheError> {
        let image = image::load_from_memory(&bytes)?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            bytes: bytes.into(),
        })
    }
}

struct MemoryTier {
    capacity: usize,
    entries: HashMap<String, Artwork>,
    order: VecDeque<String>,
}

impl MemoryTier {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, key: String, artwork: Artwork) {
        if self.entries.insert(key.clone(), artwork).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

pub struct ArtworkCache {
    dir: PathBuf,
    memory: Mutex<MemoryTier>,
    tmp_seq: AtomicU64,
}

impl ArtworkCache {
    pub fn new(dir: impl Into<PathBuf>, memory_capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            memory: Mutex::new(MemoryTier::new(memory_capacity)),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Memory first, then the backing file. Missing or undecodable entries
    /// read as `None`.
    pub async fn get(&self, key: &str) -> Option<Artwork> {
        if let Some(hit) = self.memory.lock().entries.get(key).cloned() {
            return Some(hit);
        }

        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(key, error = %err, "artwork file unreadable");
                }
                return None;
            }
        };

        let artwork = match tokio::task::spawn_blocking(move || Artwork::decode(bytes)).await {
            Ok(Ok(artwork)) => artwork,
            Ok(Err(err)) => {
                debug!(key, error = %err, "cached artwork failed to decode");
                return None;
            }
            Err(err) => {
                debug!(key, error = %err, "artwork decode task failed");
                return None;
            }
        };

        self.memory.lock().insert(key.to_string(), artwork.clone());
        Some(artwork)
    }

    /// Persists `bytes` under `key` via write-temp-then-rename. The memory
    /// tier is filled by the next `get`.
    pub async fn put(&self, bytes: &[u8], key: &str) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            self.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(source) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Io { path: tmp, source });
        }

        if tokio::fs::rename(&tmp, &target).await.is_err() {
            // Platforms that refuse to rename over an existing file.
            let _ = tokio::fs::remove_file(&target).await;
            if let Err(source) = tokio::fs::rename(&tmp, &target).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(CacheError::Io {
                    path: target,
                    source,
                });
            }
        }

        debug!(key, bytes = bytes.len(), "artwork stored");
        Ok(())
    }

    pub fn clear_memory(&self) {
        self.memory.lock().clear();
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().entries.len()
    }
}
