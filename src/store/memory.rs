use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{glob_match, human_bytes, KeyValueStore, StoreInfo, StoreResult};
use crate::core::error::StoreError;

#[derive(Debug)]
enum Value {
    List(VecDeque<String>),
    Str(String),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn list() -> Self {
        Self {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    fn approx_bytes(&self) -> u64 {
        match &self.value {
            Value::List(items) => items.iter().map(|s| s.len() as u64).sum(),
            Value::Str(s) => s.len() as u64,
        }
    }
}

/// A published message as seen by in-process subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

/// In-process implementation of the store command set.
///
/// Keys live in a sharded concurrent map; each command holds the shard
/// lock for its key only, which gives the same single-command atomicity
/// as the Redis backend. Expiry is lazy: an expired key is purged on the
/// next command that touches it.
#[derive(Debug)]
pub struct MemoryStore {
    data: DashMap<String, Entry>,
    channel: broadcast::Sender<PublishedMessage>,
    peak_bytes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(10_000);
        Self {
            data: DashMap::new(),
            channel,
            peak_bytes: AtomicU64::new(0),
        }
    }

    /// Receives every message published after this call, on all channels
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.channel.subscribe()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of a key, if it has one
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.purge_if_expired(key);
        let entry = self.data.get(key)?;
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Drops every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.data.len())
    }

    /// Removes `key` only if it still holds an empty list; a push that
    /// landed after the caller's trim keeps it alive
    fn remove_if_empty_list(&self, key: &str) {
        self.data
            .remove_if(key, |_, entry| matches!(&entry.value, Value::List(items) if items.is_empty()));
    }

    #[inline]
    fn purge_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.data.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn push(&self, key: &str, value: String, front: bool) -> StoreResult<usize> {
        self.purge_if_expired(key);
        let mut entry = self.data.entry(key.to_string()).or_insert_with(Entry::list);
        match &mut entry.value {
            Value::List(items) => {
                if front {
                    items.push_front(value);
                } else {
                    items.push_back(value);
                }
                Ok(items.len())
            }
            Value::Str(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn used_bytes(&self) -> u64 {
        let now = Instant::now();
        self.data
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.key().len() as u64 + e.value().approx_bytes())
            .sum()
    }
}

/// Resolves a Redis-style inclusive range against a list length
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn rpush(&self, key: &str, value: String) -> StoreResult<usize> {
        self.push(key, value, false)
    }

    async fn lpush(&self, key: &str, value: String) -> StoreResult<usize> {
        self.push(key, value, true)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.purge_if_expired(key);
        let Some(entry) = self.data.get(key) else {
            return Ok(Vec::new());
        };
        match &entry.value {
            Value::List(items) => Ok(match resolve_range(items.len(), start, stop) {
                Some((from, to)) => items.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Value::Str(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn lindex(&self, key: &str, index: isize) -> StoreResult<Option<String>> {
        self.purge_if_expired(key);
        let Some(entry) = self.data.get(key) else {
            return Ok(None);
        };
        match &entry.value {
            Value::List(items) => {
                let len = items.len() as isize;
                let idx = if index < 0 { len + index } else { index };
                if idx < 0 || idx >= len {
                    return Ok(None);
                }
                Ok(items.get(idx as usize).cloned())
            }
            Value::Str(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        self.purge_if_expired(key);
        if let Some(mut entry) = self.data.get_mut(key) {
            match &mut entry.value {
                Value::List(items) => match resolve_range(items.len(), start, stop) {
                    Some((from, to)) => {
                        items.truncate(to + 1);
                        items.drain(..from);
                    }
                    None => items.clear(),
                },
                Value::Str(_) => return Err(StoreError::WrongType(key.to_string())),
            }
        }
        self.remove_if_empty_list(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.purge_if_expired(key);
        match self.data.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.data.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.purge_if_expired(key);
        let Some(entry) = self.data.get(key) else {
            return Ok(None);
        };
        match &entry.value {
            Value::Str(s) => Ok(Some(s.clone())),
            Value::List(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.purge_if_expired(key);
        Ok(self.data.remove(key).is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<bool> {
        self.purge_if_expired(from);
        // Removal is the linearisation point: a push racing with this rename
        // either lands in the removed list or starts a fresh one under `from`.
        match self.data.remove(from) {
            Some((_, entry)) => {
                self.data.insert(to.to_string(), entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn publish(&self, channel: &str, message: String) -> StoreResult<usize> {
        let msg = PublishedMessage {
            channel: channel.to_string(),
            payload: message,
        };
        // No receivers is not an error for pub/sub
        Ok(self.channel.send(msg).unwrap_or(0))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        // full scan anyway, so drop dead entries on the way
        self.purge_expired();
        Ok(self
            .data
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        let used = self.used_bytes();
        let peak = self.peak_bytes.fetch_max(used, Ordering::Relaxed).max(used);
        Ok(StoreInfo {
            used_memory_human: human_bytes(used),
            used_memory_peak_human: human_bytes(peak),
            connected_clients: self.channel.receiver_count() as u64,
        })
    }
}
