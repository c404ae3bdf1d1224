//! Caching utilities for translated signature programs

use crate::platform::program::CipherProgram;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Translated programs keyed by the full client-script text
pub type ProgramCache = Cache<Arc<str>, Arc<CipherProgram>>;

/// Program cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of distinct scripts kept
    pub max_entries: u64,
    /// How long a translation stays valid
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 16,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Create a program cache
pub fn new_program_cache(config: &CacheConfig) -> ProgramCache {
    Cache::builder()
        .max_capacity(config.max_entries)
        .time_to_live(config.ttl)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::program::{Operation, Step};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_program_cache_roundtrip() {
        let cache = new_program_cache(&CacheConfig::default());
        let program = CipherProgram::new(
            "main:Ab",
            vec![Step::Builtin(Operation::Join)],
            HashMap::new(),
        )
        .unwrap();

        let key: Arc<str> = Arc::from("script text");
        cache.insert(key.clone(), Arc::new(program)).await;

        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached.entry(), "main:Ab");
        assert!(cache.get("other script").await.is_none());
    }

    #[tokio::test]
    async fn test_program_cache_expires() {
        let cache = new_program_cache(&CacheConfig {
            max_entries: 4,
            ttl: Duration::from_millis(50),
        });
        let program = CipherProgram::new("main:x", vec![], HashMap::new()).unwrap();
        let key: Arc<str> = Arc::from("s");
        cache.insert(key.clone(), Arc::new(program)).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&key).await.is_none());
    }
}
