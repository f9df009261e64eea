// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU of recently accepted signatures.
//!
//! Signatures are deterministic, so the same signed request can be replayed
//! until its timestamp leaves the window. When enabled, the guard rejects a
//! signature it has already accepted while that signature is still fresh.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// Default number of signatures remembered.
pub const DEFAULT_REPLAY_CAPACITY: usize = 10_000;

/// In-process replay guard.
pub struct ReplayGuard {
    seen: Mutex<LruCache<String, i64>>,
    window_ms: i64,
}

impl ReplayGuard {
    /// Create a guard remembering up to `capacity` signatures for `window_ms`.
    pub fn new(capacity: usize, window_ms: i64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
            window_ms,
        }
    }

    /// Record `signature`; returns `false` if it was already used and is
    /// still inside the window.
    pub fn check_and_record(&self, signature: &str, timestamp_ms: i64, now_ms: i64) -> bool {
        let Ok(mut seen) = self.seen.lock() else {
            // A poisoned lock only loses replay history.
            return true;
        };

        if let Some(&first_seen) = seen.get(signature) {
            if now_ms.abs_diff(first_seen) <= self.window_ms.unsigned_abs() {
                return false;
            }
        }

        seen.put(signature.to_string(), timestamp_ms.max(now_ms));
        true
    }

    /// Number of signatures currently remembered.
    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
