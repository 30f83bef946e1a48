use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{TicketStore, TicketStoreError, TicketSubject, TicketToken};

#[derive(Debug, Clone)]
struct Entry {
    subject: TicketSubject,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local ticket store.
///
/// A single mutex guards the map, so `take` is trivially atomic. Expired entries
/// are dropped lazily on access and by [`InMemoryTicketStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, TicketStoreError> {
        self.entries
            .lock()
            .map_err(|_| TicketStoreError::Unavailable("ticket map lock poisoned".to_string()))
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, TicketStoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    pub fn len(&self) -> Result<usize, TicketStoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TicketStoreError> {
        Ok(self.lock()?.is_empty())
    }
}

impl TicketStore for InMemoryTicketStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn insert_new(&self, token: &TicketToken, subject: &TicketSubject, ttl: Duration) -> Result<bool, TicketStoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        if entries.get(token.as_str()).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            token.as_str().to_string(),
            Entry {
                subject: subject.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    fn take(&self, token: &str) -> Result<Option<TicketSubject>, TicketStoreError> {
        let now = Instant::now();
        let entry = self.lock()?.remove(token);
        Ok(entry.filter(|e| e.is_live(now)).map(|e| e.subject))
    }
}
