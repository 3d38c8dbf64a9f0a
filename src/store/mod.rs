pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::StoreError;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Server-side figures reported by the health probe
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreInfo {
    pub used_memory_human: String,
    pub used_memory_peak_human: String,
    pub connected_clients: u64,
}

/// Command set of the shared fast store.
///
/// Each command is atomic on its own; nothing else is. List indices follow
/// Redis conventions: inclusive ranges, negative values count from the tail.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    /// Appends to the tail of a list, returning the new length
    async fn rpush(&self, key: &str, value: String) -> StoreResult<usize>;

    /// Prepends to the head of a list, returning the new length
    async fn lpush(&self, key: &str, value: String) -> StoreResult<usize>;

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    async fn lindex(&self, key: &str, index: isize) -> StoreResult<Option<String>>;

    /// Keeps only `start..=stop`; an empty result deletes the key
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()>;

    /// Sets a TTL; false when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Atomically renames a key; false when `from` does not exist
    async fn rename(&self, from: &str, to: &str) -> StoreResult<bool>;

    /// Publishes a message, returning the number of receivers
    async fn publish(&self, channel: &str, message: String) -> StoreResult<usize>;

    /// Lists keys matching a glob pattern (`*` and `?`)
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn info(&self) -> StoreResult<StoreInfo>;
}

/// Glob matching with `*` (any run) and `?` (any single char)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    // position of the last '*' and the text index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// A list length as a list index, saturating at `isize::MAX`
#[inline]
pub fn list_index(len: usize) -> isize {
    isize::try_from(len).unwrap_or(isize::MAX)
}

/// Redis-style human readable byte count (`1.50M`)
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.2}{}", value, unit)
}
