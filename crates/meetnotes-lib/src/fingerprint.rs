//! Content fingerprints for suppressing duplicate change notifications.
//!
//! Editors and sync tools often emit several modify events for one save, and
//! some emit events without touching the content at all. [`ChangeDetector`]
//! remembers a BLAKE3 digest per path and reports a change only when the
//! bytes differ from the last ones seen.
//!
//! The detector never reads files; callers hand it the bytes. It is mutated
//! through `&mut self` only, so a single owner (the dispatcher) serializes all
//! updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// BLAKE3 digest of one observed file content.
pub type Fingerprint = [u8; blake3::OUT_LEN];

pub fn fingerprint(content: &[u8]) -> Fingerprint {
    *blake3::hash(content).as_bytes()
}

/// Path -> last-seen digest, for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    seen: HashMap<PathBuf, Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `content` differs from what was last seen at `path`
    /// (or the path is new), recording the new digest. Returns `false` and
    /// leaves state untouched otherwise.
    pub fn detect(&mut self, path: &Path, content: &[u8]) -> bool {
        let digest = fingerprint(content);
        match self.seen.get(path) {
            Some(previous) if *previous == digest => false,
            _ => {
                self.seen.insert(path.to_path_buf(), digest);
                true
            }
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.seen.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
