//! Redis-backed sliding-window rate-limit store.
//!
//! Each policy+identifier pair maps to a sorted set of request timestamps
//! (millisecond scores). A check drops members older than the window,
//! counts the rest, and either records the new request or reports when the
//! oldest retained request will age out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Client, IntoConnectionInfo};
use uuid::Uuid;

use super::{RateLimitConfig, RateLimitDecision, RateLimitPolicy, RateLimitStore};
use crate::{Error, Result};

/// Distributed store sharing counters across service instances.
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect using the configured URL, injecting the auth token as the
    /// connection password when provided.
    pub async fn connect(config: &RateLimitConfig) -> Result<Self> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| Error::Configuration("RATE_LIMIT_REDIS_URL is not set".to_string()))?;

        let mut info = url.into_connection_info().map_err(Error::Cache)?;
        if let Some(token) = &config.redis_token {
            info.redis.password = Some(token.clone());
        }

        let client = Client::open(info).map_err(Error::Cache)?;
        let connection = ConnectionManager::new(client).await.map_err(Error::Cache)?;

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn full_key(prefix: &str, policy: RateLimitPolicy, identifier: &str) -> String {
    format!("{prefix}ratelimit:{}", policy.key(identifier))
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn check(
        &self,
        policy: RateLimitPolicy,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let limit = policy.max_requests();
        let window = policy.window();
        let window_ms = window.num_milliseconds();
        let now_ms = now.timestamp_millis();

        let key = full_key(&self.key_prefix, policy, identifier);
        let mut conn = self.conn();

        // Drop events that fell out of the window.
        let _: () = redis::cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg(0)
            .arg(now_ms - window_ms)
            .query_async(&mut conn)
            .await
            .map_err(Error::Cache)?;

        let count: u32 = redis::cmd("ZCARD")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(Error::Cache)?;

        if count >= limit {
            // The oldest retained event determines when a slot frees up.
            let oldest: Vec<(String, f64)> = redis::cmd("ZRANGE")
                .arg(&key)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await
                .map_err(Error::Cache)?;

            let reset = oldest
                .first()
                .and_then(|(_, score)| DateTime::from_timestamp_millis(*score as i64 + window_ms))
                .unwrap_or(now + window);

            return Ok(RateLimitDecision {
                success: false,
                limit,
                remaining: 0,
                reset,
            });
        }

        let member = format!("{now_ms}:{}", Uuid::new_v4());
        let _: () = redis::cmd("ZADD")
            .arg(&key)
            .arg(now_ms)
            .arg(&member)
            .query_async(&mut conn)
            .await
            .map_err(Error::Cache)?;

        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(window.num_seconds())
            .query_async(&mut conn)
            .await
            .map_err(Error::Cache)?;

        Ok(RateLimitDecision {
            success: true,
            limit,
            remaining: limit - count - 1,
            reset: now + window,
        })
    }
}
