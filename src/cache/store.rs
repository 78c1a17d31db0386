use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};

/// Key-value store behind the response cache. Values are serialized JSON.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
    /// Deletes every key matching a glob pattern (`*`, `?`), returning how many went.
    async fn delete_by_pattern(&self, pattern: &str) -> anyhow::Result<u64>;
    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
struct CachedEntry {
    value: String,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process TTL cache. Expired entries are dropped when next touched.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CachedEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> anyhow::Result<u64> {
        let matcher = compile_pattern(pattern)?;
        let mut removed = 0u64;
        self.entries.retain(|key, entry| {
            if matcher.is_match(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Matcher for Redis-style key patterns (`*`, `?`).
pub fn compile_pattern(pattern: &str) -> anyhow::Result<GlobMatcher> {
    let matcher = Glob::new(pattern)
        .with_context(|| format!("invalid key pattern: {}", pattern))?
        .compile_matcher();
    Ok(matcher)
}
