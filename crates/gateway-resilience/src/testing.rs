//! In-process store doubles.

use crate::store::{PersistentStore, StoreError, StoreOp, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    ttls: HashMap<String, Duration>,
    hashes: HashMap<String, HashMap<String, i64>>,
    lists: HashMap<String, VecDeque<String>>,
}

impl Inner {
    fn apply(&mut self, op: StoreOp) -> StoreResult<()> {
        match op {
            StoreOp::Incr { key, delta } => {
                let current = parse_counter(self.values.get(&key))?;
                self.values.insert(key, (current + delta).to_string());
            }
            StoreOp::HashIncr { key, field, delta } => {
                *self.hashes.entry(key).or_default().entry(field).or_insert(0) += delta;
            }
            StoreOp::ListPush { key, value } => {
                self.lists.entry(key).or_default().push_front(value);
            }
            StoreOp::ListTrim { key, start, stop } => {
                if let Some(list) = self.lists.get_mut(&key) {
                    let kept = range(list, start, stop)
                        .map(|r| list.range(r).cloned().collect())
                        .unwrap_or_default();
                    *list = kept;
                }
            }
        }
        Ok(())
    }
}

fn parse_counter(value: Option<&String>) -> StoreResult<i64> {
    value.map_or(Ok(0), |v| {
        v.parse()
            .map_err(|_| StoreError::Decode(format!("not an integer: {v}")))
    })
}

/// Resolve an inclusive, possibly negative, index pair against `list`
fn range<T>(list: &VecDeque<T>, start: isize, stop: isize) -> Option<std::ops::Range<usize>> {
    let len = list.len() as isize;
    let resolve = |i: isize| if i < 0 { len + i } else { i };
    let start = resolve(start).max(0);
    let stop = resolve(stop).min(len - 1);
    (start <= stop).then(|| start as usize..stop as usize + 1)
}

/// Store that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL recorded for `key` by the last `set`
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.inner.lock().ttls.get(key).copied()
    }

    /// Raw list contents, head first
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_string(), value.to_string());
        match ttl {
            Some(ttl) => inner.ttls.insert(key.to_string(), ttl),
            None => inner.ttls.remove(key),
        };
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let inner = self.inner.lock();
        Ok(inner.values.contains_key(key)
            || inner.hashes.contains_key(key)
            || inner.lists.contains_key(key))
    }

    async fn get_counter(&self, key: &str) -> StoreResult<i64> {
        parse_counter(self.inner.lock().values.get(key))
    }

    async fn hash_counters(&self, key: &str) -> StoreResult<HashMap<String, i64>> {
        Ok(self.inner.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(range(list, start, stop)
            .map(|r| list.range(r).cloned().collect())
            .unwrap_or_default())
    }

    async fn execute_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        for op in ops {
            inner.apply(op)?;
        }
        Ok(())
    }

    async fn key_count(&self) -> StoreResult<u64> {
        let inner = self.inner.lock();
        Ok((inner.values.len() + inner.hashes.len() + inner.lists.len()) as u64)
    }

    async fn flush(&self) -> StoreResult<()> {
        *self.inner.lock() = Inner::default();
        Ok(())
    }
}

/// Store whose every call fails
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicU32,
}

impl FailingStore {
    /// Create a failing store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls received
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl PersistentStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
        self.fail()
    }

    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        self.fail()
    }

    async fn get_counter(&self, _key: &str) -> StoreResult<i64> {
        self.fail()
    }

    async fn hash_counters(&self, _key: &str) -> StoreResult<HashMap<String, i64>> {
        self.fail()
    }

    async fn list_range(&self, _key: &str, _start: isize, _stop: isize) -> StoreResult<Vec<String>> {
        self.fail()
    }

    async fn execute_batch(&self, _ops: Vec<StoreOp>) -> StoreResult<()> {
        self.fail()
    }

    async fn key_count(&self) -> StoreResult<u64> {
        self.fail()
    }

    async fn flush(&self) -> StoreResult<()> {
        self.fail()
    }
}
