//! Subscriber Roster Cache
//!
//! Redis-backed cache of server subscriber lists, consulted before the
//! membership tables when authorizing server-scope joins. The cache is an
//! explicit object owned by the application state, never a process-wide
//! singleton; every entry expires after a TTL and mutations go through
//! `invalidate`.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::shared::error::AppError;

/// Cache key prefixes for roster data
mod keys {
    pub const SERVER_SUBSCRIBERS: &str = "roster:server:";
}

/// Per-server subscriber roster cache
#[derive(Clone)]
pub struct RosterCache {
    redis: ConnectionManager,
    subscribers_ttl: u64,
}

impl RosterCache {
    /// Create a roster cache with the default 5 minute TTL.
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            subscribers_ttl: 5 * 60,
        }
    }

    /// Create with a custom TTL, for tests and tuning.
    pub fn with_ttl(redis: ConnectionManager, subscribers_ttl: u64) -> Self {
        Self {
            redis,
            subscribers_ttl,
        }
    }

    fn key(server_id: i64) -> String {
        format!("{}{}", keys::SERVER_SUBSCRIBERS, server_id)
    }

    /// Cache the subscriber id list for a server.
    pub async fn set_subscribers(
        &self,
        server_id: i64,
        subscriber_ids: &[i64],
    ) -> Result<(), AppError> {
        let value = serde_json::to_string(subscriber_ids)?;

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(Self::key(server_id), value, self.subscribers_ttl)
            .await?;

        Ok(())
    }

    /// Get the cached subscriber ids for a server, if present.
    pub async fn get_subscribers(&self, server_id: i64) -> Result<Option<Vec<i64>>, AppError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(Self::key(server_id)).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Check whether a user is a cached subscriber of a server.
    ///
    /// `Ok(None)` means cache miss; the caller must fall back to the
    /// membership tables.
    pub async fn is_subscriber(
        &self,
        server_id: i64,
        user_id: i64,
    ) -> Result<Option<bool>, AppError> {
        match self.get_subscribers(server_id).await? {
            Some(ids) => Ok(Some(ids.contains(&user_id))),
            None => Ok(None),
        }
    }

    /// Drop the cached roster for a server (on subscription changes).
    pub async fn invalidate(&self, server_id: i64) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(Self::key(server_id)).await?;
        Ok(())
    }
}
