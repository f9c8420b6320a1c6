//! In-memory secret cache with TTL and clear-wins semantics.
//!
//! Used for decrypted long-term private keys and for session keys. Entries
//! live only in process memory and are zeroized when replaced, removed, or
//! found expired.
//!
//! A slow writer (password derivation, decapsulation) takes a [`CacheTicket`]
//! with [`SecretCache::begin`] before starting and presents it to
//! [`SecretCache::insert`]. A [`SecretCache::remove`] in between invalidates the
//! ticket, so a logout racing a login can never resurrect the entry.

use crate::utils::time::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

struct CachedSecret<V: Zeroize> {
    secret: Zeroizing<V>,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V: Zeroize> CachedSecret<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.cached_at + self.ttl
    }
}

struct Slot<V: Zeroize> {
    epoch: u64,
    entry: Option<CachedSecret<V>>,
    // One clone per live ticket
    writers: Arc<()>,
}

impl<V: Zeroize> Slot<V> {
    fn is_idle(&self) -> bool {
        self.entry.is_none() && Arc::strong_count(&self.writers) == 1
    }
}

/// Proof that no `remove` happened for a user since [`SecretCache::begin`].
#[derive(Debug)]
#[must_use]
pub struct CacheTicket {
    user_id: String,
    epoch: u64,
    _writer: Arc<()>,
}

impl CacheTicket {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

pub struct SecretCache<V: Zeroize + Clone> {
    slots: DashMap<String, Slot<V>>,
    next_epoch: AtomicU64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Zeroize + Clone> SecretCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            next_epoch: AtomicU64::new(1),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn fresh_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// Starts a write for `user_id`.
    pub fn begin(&self, user_id: &str) -> CacheTicket {
        let slot = self.slots.entry(user_id.to_string()).or_insert_with(|| Slot {
            epoch: self.fresh_epoch(),
            entry: None,
            writers: Arc::new(()),
        });

        CacheTicket {
            user_id: user_id.to_string(),
            epoch: slot.epoch,
            _writer: Arc::clone(&slot.writers),
        }
    }

    /// Stores `secret` with a fresh TTL, replacing any previous entry.
    ///
    /// Returns `false` (and drops the secret) if the user was removed after
    /// the ticket was taken.
    pub fn insert(&self, ticket: CacheTicket, secret: Zeroizing<V>) -> bool {
        let now = self.clock.now();
        match self.slots.get_mut(&ticket.user_id) {
            Some(mut slot) if slot.epoch == ticket.epoch => {
                slot.entry = Some(CachedSecret {
                    secret,
                    cached_at: now,
                    ttl: self.ttl,
                });
                true
            }
            _ => false,
        }
    }

    /// Unconditional insert, for callers with nothing slow between lookup and store.
    pub fn insert_now(&self, user_id: &str, secret: Zeroizing<V>) -> bool {
        let ticket = self.begin(user_id);
        self.insert(ticket, secret)
    }

    /// Returns a copy of the live secret. An expired entry is evicted here.
    pub fn get(&self, user_id: &str) -> Option<Zeroizing<V>> {
        let now = self.clock.now();
        let mut slot = self.slots.get_mut(user_id)?;

        let expired = slot.entry.as_ref()?.is_expired(now);
        if expired {
            slot.entry = None;
            return None;
        }
        slot.entry.as_ref().map(|cached| cached.secret.clone())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.get(user_id).is_some()
    }

    /// Drops the entry and invalidates outstanding tickets for `user_id`.
    ///
    /// The slot goes with it; a later `begin` opens a new one under a fresh
    /// epoch, which no earlier ticket can match.
    pub fn remove(&self, user_id: &str) {
        self.slots.remove(user_id);
    }

    /// Evicts every expired entry and forgets users with neither an entry nor
    /// a write in flight. Returns how many entries were evicted.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;

        self.slots.retain(|_, slot| {
            if slot.entry.as_ref().is_some_and(|cached| cached.is_expired(now)) {
                slot.entry = None;
                evicted += 1;
            }
            !slot.is_idle()
        });
        evicted
    }

    /// Live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.slots
            .iter()
            .filter(|slot| slot.entry.as_ref().is_some_and(|c| !c.is_expired(now)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Zeroize + Clone> fmt::Debug for SecretCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
