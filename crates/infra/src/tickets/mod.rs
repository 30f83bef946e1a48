//! Single-use exchange tickets.
//!
//! A ticket binds a user identity to a random token for a short TTL. Storage is
//! pluggable ([`TicketStore`]); every backend guarantees that a ticket is handed
//! out by `take` at most once.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use tollgate_core::UserIdentity;

pub mod broker;
pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod token;

pub use broker::{TicketBroker, TicketError};
pub use in_memory::InMemoryTicketStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisTicketStore;
pub use token::TicketToken;

/// Identity a ticket is bound to.
pub type TicketSubject = UserIdentity;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketStoreError {
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),

    #[error("stored ticket payload unreadable: {0}")]
    Corrupt(String),
}

/// Storage behind the broker.
///
/// Implementations must make `take` atomic: of any number of concurrent callers
/// presenting the same token, at most one receives the subject.
pub trait TicketStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Store `subject` under `token` unless a live entry already holds the token.
    ///
    /// Returns `false` on collision.
    fn insert_new(&self, token: &TicketToken, subject: &TicketSubject, ttl: Duration) -> Result<bool, TicketStoreError>;

    /// Remove and return the subject bound to `token`. Expired entries are never returned.
    fn take(&self, token: &str) -> Result<Option<TicketSubject>, TicketStoreError>;
}

impl<S> TicketStore for Arc<S>
where
    S: TicketStore + ?Sized,
{
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn insert_new(&self, token: &TicketToken, subject: &TicketSubject, ttl: Duration) -> Result<bool, TicketStoreError> {
        (**self).insert_new(token, subject, ttl)
    }

    fn take(&self, token: &str) -> Result<Option<TicketSubject>, TicketStoreError> {
        (**self).take(token)
    }
}
