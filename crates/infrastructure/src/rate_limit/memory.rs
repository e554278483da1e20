//! In-process fallback rate-limit store.
//!
//! Fixed-window counters in a process-local map, used when no Redis backend
//! is configured. Limits are per instance only; multi-instance deployments
//! need the Redis store for shared counters.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{RateLimitDecision, RateLimitPolicy, RateLimitStore};
use crate::Result;

#[derive(Debug, Clone, Copy)]
struct MemoryRecord {
    count: u32,
    reset: DateTime<Utc>,
}

/// Map of `{prefix}:{identifier}` to window counters. Expired records are
/// swept opportunistically on every check, so the map stays bounded by the
/// number of identifiers active within one window.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryRecord>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn check(
        &self,
        policy: RateLimitPolicy,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let limit = policy.max_requests();
        let window = policy.window();
        let key = policy.key(identifier);

        let mut entries = self.entries.lock();
        entries.retain(|_, record| record.reset > now);

        let decision = match entries.get_mut(&key) {
            Some(record) if record.count < limit => {
                record.count += 1;
                RateLimitDecision {
                    success: true,
                    limit,
                    remaining: limit - record.count,
                    reset: record.reset,
                }
            }
            Some(record) => RateLimitDecision {
                success: false,
                limit,
                remaining: 0,
                reset: record.reset,
            },
            None => {
                let reset = now + window;
                entries.insert(key, MemoryRecord { count: 1, reset });
                RateLimitDecision {
                    success: true,
                    limit,
                    remaining: limit - 1,
                    reset,
                }
            }
        };

        Ok(decision)
    }
}
