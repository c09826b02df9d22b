//! Key-value store collaborator.
//!
//! The vector store and the cache only need a handful of Redis-like
//! operations. Every call is async and may fail; callers wrap each one in
//! [`with_timeout`] and degrade on error.

mod memory;

pub use memory::MemoryStore;

use crate::error::{KvError, KvResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> KvResult<()>;

    /// Stores a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> KvResult<()>;

    /// Removes a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Lists keys matching a glob pattern (`*` and `?` wildcards).
    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>>;

    /// Short backend label for stats output.
    fn backend_name(&self) -> &'static str {
        "kv"
    }
}

/// Runs a key-value call under a deadline, mapping expiry to [`KvError::Timeout`].
pub async fn with_timeout<T, F>(timeout: Duration, operation: &'static str, fut: F) -> KvResult<T>
where
    F: Future<Output = KvResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(KvError::Timeout { operation, timeout }),
    }
}

/// Glob match supporting `*` (any run) and `?` (any single char).
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_k = 0;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_k = k;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_k += 1;
            k = star_k;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("vector:test:*", "vector:test:doc_1"));
        assert!(!glob_match("vector:test:*", "vector:other:doc_1"));
        assert!(glob_match("cache:*", "cache:emb:abc"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*", ""));
        assert!(glob_match("*:*:x", "a:b:x"));
        assert!(!glob_match("index:test", "index:test2"));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: KvResult<()> = with_timeout(Duration::from_millis(5), "get", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(KvError::Timeout {
                operation: "get",
                ..
            })
        ));
    }
}
