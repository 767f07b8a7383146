//! Artwork fetching and change detection.
//!
//! Artwork bytes are read from the provider in fixed-size chunks, validated
//! as a decodable image, and content-hashed so that repeated reports of the
//! same image never reach subscribers.

use tracing::warn;

use crate::error::{ProviderError, Result};
use crate::provider::ArtworkSource;

const CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on accepted artwork. Anything larger is discarded rather than
/// buffered.
const MAX_ARTWORK_BYTES: usize = 16 * 1024 * 1024;

/// Drains an artwork stream into memory, one fixed-size chunk at a time.
pub(crate) fn fetch_bytes<A: ArtworkSource>(source: &mut A) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let read = source.read_chunk(&mut chunk)?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() > MAX_ARTWORK_BYTES {
            return Err(ProviderError::Os(format!(
                "artwork stream exceeds {MAX_ARTWORK_BYTES} bytes"
            )));
        }
    }

    Ok(buffer)
}

/// 128-bit content digest as lowercase hex. Used only for change detection.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Suppresses redundant artwork propagation.
///
/// Holds the digest of the last admitted artwork; byte-identical images are
/// reported once. Lives on the reconciler's control thread.
#[derive(Debug, Default)]
pub struct ArtworkCache {
    last_hash: Option<String>,
}

impl ArtworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `bytes` and returns the digest when the artwork actually
    /// changed. Undecodable bytes are rejected and leave the cache untouched.
    pub fn admit(&mut self, bytes: &[u8]) -> Option<String> {
        if let Err(e) = image::load_from_memory(bytes) {
            warn!("discarding undecodable artwork ({} bytes): {e}", bytes.len());
            return None;
        }

        let hash = hash_bytes(bytes);
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            return None;
        }
        self.last_hash = Some(hash.clone());
        Some(hash)
    }

    /// Forgets the last digest, e.g. after publishing the empty snapshot.
    pub fn reset(&mut self) {
        self.last_hash = None;
    }
}
