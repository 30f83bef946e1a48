use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::{TicketStore, TicketStoreError, TicketSubject, TicketToken};

/// Fresh tokens tried before giving up on issuance.
const MAX_ISSUE_ATTEMPTS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// Unknown, already redeemed, expired, or malformed.
    #[error("ticket not found")]
    NotFound,

    #[error("ticket storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("ticket ttl must be positive")]
    InvalidTtl,
}

/// Issues and redeems exchange tickets over a [`TicketStore`].
///
/// Store calls run on the blocking pool. Once started they run to completion even
/// if the request that triggered them is dropped, so a ticket is never left
/// half-redeemed.
#[derive(Clone)]
pub struct TicketBroker {
    store: Arc<dyn TicketStore>,
    ttl: Duration,
}

impl core::fmt::Debug for TicketBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TicketBroker")
            .field("backend", &self.store.backend())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TicketBroker {
    pub fn new(store: Arc<dyn TicketStore>, ttl: Duration) -> Result<Self, TicketError> {
        if ttl.is_zero() {
            return Err(TicketError::InvalidTtl);
        }
        Ok(Self { store, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, subject: TicketSubject) -> Result<TicketToken, TicketError> {
        let broker = self.clone();
        tokio::task::spawn_blocking(move || broker.issue_blocking(&subject))
            .await
            .map_err(|e| TicketError::StorageUnavailable(format!("issue task failed: {e}")))?
    }

    pub async fn redeem(&self, token: &str) -> Result<TicketSubject, TicketError> {
        let broker = self.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || broker.redeem_blocking(&token))
            .await
            .map_err(|e| TicketError::StorageUnavailable(format!("redeem task failed: {e}")))?
    }

    pub fn issue_blocking(&self, subject: &TicketSubject) -> Result<TicketToken, TicketError> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = TicketToken::generate();
            match self.store.insert_new(&token, subject, self.ttl) {
                Ok(true) => {
                    tracing::debug!(backend = self.store.backend(), user_id = %subject.id, "ticket issued");
                    return Ok(token);
                }
                Ok(false) => {
                    tracing::warn!(backend = self.store.backend(), "ticket token collision; regenerating");
                }
                Err(err) => return Err(storage_error(self.store.backend(), err)),
            }
        }
        Err(TicketError::StorageUnavailable("could not allocate a unique ticket token".to_string()))
    }

    pub fn redeem_blocking(&self, token: &str) -> Result<TicketSubject, TicketError> {
        if !TicketToken::is_well_formed(token) {
            return Err(TicketError::NotFound);
        }
        match self.store.take(token) {
            Ok(Some(subject)) => {
                tracing::debug!(backend = self.store.backend(), user_id = %subject.id, "ticket redeemed");
                Ok(subject)
            }
            Ok(None) => Err(TicketError::NotFound),
            Err(TicketStoreError::Corrupt(reason)) => {
                tracing::warn!(backend = self.store.backend(), %reason, "discarding unreadable ticket");
                Err(TicketError::NotFound)
            }
            Err(err) => Err(storage_error(self.store.backend(), err)),
        }
    }
}

fn storage_error(backend: &'static str, err: TicketStoreError) -> TicketError {
    tracing::error!(backend, error = %err, "ticket store failure");
    TicketError::StorageUnavailable(err.to_string())
}
