// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process cache of decrypted private keys for authenticated sessions.
//!
//! Entries live only in this cache's memory for a bounded lifetime: a
//! sliding TTL (default 1 hour) that every read extends, an explicit clear
//! on logout, and wiping of the key material on eviction. Keys are never
//! serialized, persisted, or formatted into log records.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use zeroize::Zeroizing;

/// Default sliding TTL for a cached session key.
pub const DEFAULT_SESSION_KEY_TTL: Duration = Duration::from_secs(3600);

/// Default maximum number of concurrently cached session keys.
const DEFAULT_CAPACITY: usize = 4096;

/// A decrypted private key handed out by the cache. Wiped on drop.
pub struct SessionKey(Zeroizing<String>);

impl SessionKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Cached entry: key material + last-touched instant for the sliding TTL.
struct CacheEntry {
    key: Zeroizing<String>,
    touched_at: Instant,
}

/// TTL-bounded store of decrypted session keys, keyed by user id.
pub struct SessionKeyCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl SessionKeyCache {
    /// Create a cache with the given sliding TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    /// Cache the decrypted key for a user, replacing any previous entry.
    pub fn put(&self, user_id: &str, key: Zeroizing<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                user_id.to_string(),
                CacheEntry {
                    key,
                    touched_at: Instant::now(),
                },
            );
        }
    }

    /// Get the cached key for a user, extending its TTL on hit.
    ///
    /// Returns `None` after `clear` or once the TTL has elapsed.
    pub fn get(&self, user_id: &str) -> Option<SessionKey> {
        let mut entries = self.entries.lock().ok()?;
        if let Some(entry) = entries.get_mut(user_id) {
            if entry.touched_at.elapsed() < self.ttl {
                entry.touched_at = Instant::now();
                return Some(SessionKey(entry.key.clone()));
            }
            // Expired: drop the entry, wiping the key material.
            entries.pop(user_id);
        }
        None
    }

    /// Remove a user's cached key (logout).
    pub fn clear(&self, user_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(user_id);
        }
    }

    /// Remove every cached key (logout-all / shutdown).
    pub fn clear_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Whether a live entry exists for the user, without extending its TTL.
    pub fn exists(&self, user_id: &str) -> bool {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| {
                entries
                    .peek(user_id)
                    .map(|entry| entry.touched_at.elapsed() < self.ttl)
            })
            .unwrap_or(false)
    }
}
