//! Per-region signing-key cache
//!
//! Derived SigV4 signing keys are valid for a limited number of days
//! (currently 7 on the AWS side). Keys are expired here after one day, well
//! before that window closes, and re-derived on demand. One entry per region.

use crate::signer;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

const KEY_LIFETIME_SECS: i64 = 60 * 60 * 24;

/// A derived signing key together with its derivation time.
#[derive(Debug, Clone, Copy)]
pub struct SigningKeyEntry {
    pub key: [u8; 32],
    pub derived_at: DateTime<Utc>,
}

impl SigningKeyEntry {
    /// A key is fresh for ages in `[0, 24h)`. A negative age means the clock
    /// moved backwards, which also forces re-derivation.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.derived_at).num_seconds();
        (0..KEY_LIFETIME_SECS).contains(&age)
    }
}

/// Region-keyed signing-key cache. Reads take the shared lock; regeneration
/// takes the exclusive lock. Derivation is deterministic for a given
/// `(secret, date, region, service)` tuple, so a lost race costs at most one
/// redundant derivation.
#[derive(Debug, Default)]
pub struct SigningKeyCache {
    entries: RwLock<HashMap<String, SigningKeyEntry>>,
}

impl SigningKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the signing key for `region`, deriving a fresh one when the
    /// cached entry is missing or outside its validity window. The secret
    /// supplier is only invoked on the derivation path. The returned flag
    /// reports whether this call derived a key.
    pub fn ensure_key<F>(
        &self,
        region: &str,
        now: DateTime<Utc>,
        secret_access_key: F,
        service: &str,
    ) -> ([u8; 32], bool)
    where
        F: FnOnce() -> String,
    {
        {
            let entries = self.entries.read().expect("signing key lock poisoned");
            if let Some(entry) = entries.get(region) {
                if entry.is_fresh(now) {
                    return (entry.key, false);
                }
            }
        }

        let mut entries = self.entries.write().expect("signing key lock poisoned");
        // Another thread may have regenerated while we waited for the lock.
        if let Some(entry) = entries.get(region) {
            if entry.is_fresh(now) {
                return (entry.key, false);
            }
        }

        let key = signer::derive_signing_key(
            &secret_access_key(),
            &signer::format_date(&now),
            region,
            service,
        );
        tracing::debug!(region, "derived signing key");
        entries.insert(
            region.to_string(),
            SigningKeyEntry {
                key,
                derived_at: now,
            },
        );
        (key, true)
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .expect("signing key lock poisoned")
            .clear();
    }
}
