//! Redis-backed ticket store (optional).
//!
//! Issuance is `SET key value NX PX ttl`, so Redis enforces expiry and never
//! overwrites a live ticket. Redemption removes the key in the same command that
//! reads it: `GETDEL` on Redis 6.2+, or a server-side script on older servers.

use std::time::Duration;

use crate::config::RedisTakeMode;

use super::{TicketStore, TicketStoreError, TicketSubject, TicketToken};

const KEY_PREFIX: &str = "tollgate:ticket:";

const TAKE_SCRIPT: &str = r#"
local value = redis.call('GET', KEYS[1])
if value then
    redis.call('DEL', KEYS[1])
end
return value
"#;

#[derive(Debug, Clone)]
pub struct RedisTicketStore {
    client: redis::Client,
    take_mode: RedisTakeMode,
    timeout: Duration,
}

impl RedisTicketStore {
    pub fn new(redis_url: impl AsRef<str>, take_mode: RedisTakeMode, timeout: Duration) -> Result<Self, TicketStoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| TicketStoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            take_mode,
            timeout,
        })
    }

    fn connection(&self) -> Result<redis::Connection, TicketStoreError> {
        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(unavailable)?;
        conn.set_read_timeout(Some(self.timeout)).map_err(unavailable)?;
        conn.set_write_timeout(Some(self.timeout)).map_err(unavailable)?;
        Ok(conn)
    }

    /// Round-trip a `PING`; used at startup to fail fast on a bad URL.
    pub fn ping(&self) -> Result<(), TicketStoreError> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query(&mut conn).map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: redis::RedisError) -> TicketStoreError {
    TicketStoreError::Unavailable(err.to_string())
}

fn ticket_key(token: &str) -> String {
    format!("{KEY_PREFIX}{token}")
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn decode_subject(payload: &str) -> Result<TicketSubject, TicketStoreError> {
    serde_json::from_str(payload).map_err(|e| TicketStoreError::Corrupt(e.to_string()))
}

impl TicketStore for RedisTicketStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn insert_new(&self, token: &TicketToken, subject: &TicketSubject, ttl: Duration) -> Result<bool, TicketStoreError> {
        let payload = serde_json::to_string(subject).map_err(|e| TicketStoreError::Corrupt(e.to_string()))?;
        let mut conn = self.connection()?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(ticket_key(token.as_str()))
            .arg(payload)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query(&mut conn)
            .map_err(unavailable)?;

        Ok(reply.is_some())
    }

    fn take(&self, token: &str) -> Result<Option<TicketSubject>, TicketStoreError> {
        let key = ticket_key(token);
        let mut conn = self.connection()?;

        let payload: Option<String> = match self.take_mode {
            RedisTakeMode::GetDel => redis::cmd("GETDEL").arg(&key).query(&mut conn).map_err(unavailable)?,
            RedisTakeMode::Script => redis::Script::new(TAKE_SCRIPT)
                .key(&key)
                .invoke(&mut conn)
                .map_err(unavailable)?,
        };

        payload.as_deref().map(decode_subject).transpose()
    }
}
