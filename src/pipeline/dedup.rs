//! Admit-once membership guard.
//!
//! Listing URLs and item identifiers each get their own guard so that
//! page-walk admission never contends with fetch-time item admission.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Thread-safe set that admits each key exactly once.
#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: Mutex<HashSet<String>>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard pre-populated with keys admitted by an earlier run.
    pub fn with_seen<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: Mutex::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns `true` if `key` had not been seen, marking it seen.
    ///
    /// Check and insert happen under one lock acquisition.
    pub fn admit(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(key) {
            return false;
        }
        seen.insert(key.to_owned())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
