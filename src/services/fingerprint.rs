use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;

/// Byte-level fingerprints for spotting a page that did not change.
///
/// Only identical files match. The controller compares each capture with the
/// one right before it, so a page revisited later in the book is not caught.
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub async fn fingerprint(path: &Path) -> Result<String> {
        let bytes = fs::read(path).await?;
        Ok(Self::fingerprint_bytes(&bytes))
    }

    pub fn fingerprint_bytes(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub fn is_repeat(previous: Option<&str>, current: &str) -> bool {
        previous == Some(current)
    }
}
