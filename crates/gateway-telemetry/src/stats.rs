//! Usage statistics.
//!
//! Every request outcome is recorded twice: synchronously in process memory,
//! which is always consistent and immediately visible, and opportunistically
//! in the persistent store as one atomic batch. A store outage only makes
//! the two views diverge; it never fails the request being recorded.
//!
//! Persisted keys:
//!
//! | Key | Type |
//! |---|---|
//! | `stats:daily:<YYYY-MM-DD>` | counter |
//! | `stats:monthly:<YYYY-MM>` | counter |
//! | `stats:total` | counter |
//! | `stats:models` | hash of model name to count |
//! | `stats:logs` | list of JSON request logs, newest first |

use chrono::{DateTime, Utc};
use gateway_resilience::{best_effort, must_succeed, PersistentStore, RetryPolicy, StoreError, StoreOp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recent-activity log length
pub const LOG_LIMIT: usize = 50;

/// Prompt characters kept in a log preview
pub const PREVIEW_CHARS: usize = 50;

const TOTAL_KEY: &str = "stats:total";
const MODELS_KEY: &str = "stats:models";
const LOGS_KEY: &str = "stats:logs";

fn daily_key(day: &str) -> String {
    format!("stats:daily:{day}")
}

fn monthly_key(month: &str) -> String {
    format!("stats:monthly:{month}")
}

/// One recorded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLog {
    /// Random identifier
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Requested model
    pub model: String,
    /// Response status
    pub status: u16,
    /// Duration in milliseconds
    pub duration: u64,
    /// Answered from cache
    pub cached: bool,
    /// Prompt preview
    pub preview: String,
}

/// Aggregate counters plus the recent-activity log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Requests today (UTC)
    pub daily_requests: u64,
    /// Requests this month (UTC)
    pub monthly_requests: u64,
    /// Requests ever
    pub total_requests: u64,
    /// Requests per model
    pub requests_by_model: BTreeMap<String, u64>,
    /// Most recent requests, newest first
    pub logs: Vec<RequestLog>,
}

/// Approximate persistent-store size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DbUsage {
    /// Key count
    pub keys: u64,
}

/// Truncate a prompt for display
#[must_use]
pub fn preview(prompt: &str) -> String {
    match prompt.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &prompt[..idx]),
        None => prompt.to_string(),
    }
}

#[derive(Debug, Default)]
struct MemoryStats {
    daily: HashMap<String, u64>,
    monthly: HashMap<String, u64>,
    total: u64,
    by_model: BTreeMap<String, u64>,
    logs: VecDeque<RequestLog>,
}

impl MemoryStats {
    fn record(&mut self, day: &str, month: &str, log: RequestLog) {
        *self.daily.entry(day.to_string()).or_insert(0) += 1;
        *self.monthly.entry(month.to_string()).or_insert(0) += 1;
        self.total += 1;
        *self.by_model.entry(log.model.clone()).or_insert(0) += 1;
        self.logs.push_front(log);
        self.logs.truncate(LOG_LIMIT);
    }

    fn snapshot(&self, day: &str, month: &str) -> Stats {
        Stats {
            daily_requests: self.daily.get(day).copied().unwrap_or(0),
            monthly_requests: self.monthly.get(month).copied().unwrap_or(0),
            total_requests: self.total,
            requests_by_model: self.by_model.clone(),
            logs: self.logs.iter().cloned().collect(),
        }
    }
}

/// Clock used to key daily and monthly counters
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Dual-writing stats recorder
pub struct StatsRecorder {
    memory: Mutex<MemoryStats>,
    store: Option<Arc<dyn PersistentStore>>,
    clock: Clock,
}

impl StatsRecorder {
    /// Create a recorder, persisting to `store` when one is given
    #[must_use]
    pub fn new(store: Option<Arc<dyn PersistentStore>>) -> Self {
        Self {
            memory: Mutex::new(MemoryStats::default()),
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn period_keys(&self) -> (String, String) {
        let now = (self.clock)();
        (
            now.format("%Y-%m-%d").to_string(),
            now.format("%Y-%m").to_string(),
        )
    }

    /// Record one request outcome
    pub async fn increment_request(
        &self,
        model: &str,
        status: u16,
        duration_ms: u64,
        cached: bool,
        prompt: &str,
    ) -> RequestLog {
        let (day, month) = self.period_keys();
        let log = RequestLog {
            id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: (self.clock)().timestamp_millis(),
            model: model.to_string(),
            status,
            duration: duration_ms,
            cached,
            preview: preview(prompt),
        };

        self.memory.lock().record(&day, &month, log.clone());
        debug!(model = %model, status, cached, duration_ms, "Request recorded");

        if let Some(store) = &self.store {
            let ops = match serde_json::to_string(&log) {
                Ok(encoded) => vec![
                    StoreOp::Incr { key: daily_key(&day), delta: 1 },
                    StoreOp::Incr { key: monthly_key(&month), delta: 1 },
                    StoreOp::Incr { key: TOTAL_KEY.to_string(), delta: 1 },
                    StoreOp::HashIncr {
                        key: MODELS_KEY.to_string(),
                        field: model.to_string(),
                        delta: 1,
                    },
                    StoreOp::ListPush { key: LOGS_KEY.to_string(), value: encoded },
                    StoreOp::ListTrim {
                        key: LOGS_KEY.to_string(),
                        start: 0,
                        stop: LOG_LIMIT as isize - 1,
                    },
                ],
                Err(e) => {
                    warn!(error = %e, "Failed to encode request log");
                    return log;
                }
            };
            best_effort("stats.increment", &RetryPolicy::no_retry(), (), || {
                store.execute_batch(ops.clone())
            })
            .await;
        }

        log
    }

    /// Current aggregate. Reads the persistent view when a store is
    /// configured and falls back to memory on any read fault.
    pub async fn get_stats(&self) -> Stats {
        let (day, month) = self.period_keys();
        let memory = self.memory.lock().snapshot(&day, &month);

        let Some(store) = &self.store else {
            return memory;
        };

        let fallback = memory.clone();
        best_effort("stats.read", &RetryPolicy::no_retry(), fallback, || {
            read_persisted(store.as_ref(), &day, &month, &memory.logs)
        })
        .await
    }

    /// Approximate persistent key count; zero without a store or on failure
    pub async fn db_usage(&self) -> DbUsage {
        let Some(store) = &self.store else {
            return DbUsage::default();
        };
        let keys = best_effort("stats.db_usage", &RetryPolicy::no_retry(), 0, || {
            store.key_count()
        })
        .await;
        DbUsage { keys }
    }

    /// Clear both views. A persistent flush failure is returned and leaves
    /// the in-memory view untouched.
    ///
    /// # Errors
    /// Returns the store error if the persistent flush fails
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        info!("Flushing all stats");
        if let Some(store) = &self.store {
            must_succeed("stats.flush", || store.flush()).await?;
        }
        *self.memory.lock() = MemoryStats::default();
        Ok(())
    }

    /// Whether a persistent store is attached
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }
}

impl std::fmt::Debug for StatsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRecorder")
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

async fn read_persisted(
    store: &dyn PersistentStore,
    day: &str,
    month: &str,
    memory_logs: &[RequestLog],
) -> Result<Stats, StoreError> {
    let daily = daily_key(day);
    let monthly = monthly_key(month);
    let (daily, monthly, total, models, logs) = futures::try_join!(
        store.get_counter(&daily),
        store.get_counter(&monthly),
        store.get_counter(TOTAL_KEY),
        store.hash_counters(MODELS_KEY),
        store.list_range(LOGS_KEY, 0, LOG_LIMIT as isize - 1),
    )?;

    let parsed: Vec<RequestLog> = logs
        .iter()
        .filter_map(|raw| serde_json::from_str(raw).ok())
        .collect();

    let non_negative = |v: i64| u64::try_from(v).unwrap_or(0);
    Ok(Stats {
        daily_requests: non_negative(daily),
        monthly_requests: non_negative(monthly),
        total_requests: non_negative(total),
        requests_by_model: models
            .into_iter()
            .map(|(model, count)| (model, non_negative(count)))
            .collect(),
        logs: if parsed.is_empty() {
            memory_logs.to_vec()
        } else {
            parsed
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gateway_resilience::testing::{FailingStore, MemoryStore};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_fresh_recorder_is_empty() {
        let stats = StatsRecorder::new(None).get_stats().await;
        assert_eq!(stats, Stats::default());
        assert_eq!(
            serde_json::to_value(&stats).expect("serializes"),
            serde_json::json!({
                "dailyRequests": 0,
                "monthlyRequests": 0,
                "totalRequests": 0,
                "requestsByModel": {},
                "logs": []
            })
        );
    }

    #[tokio::test]
    async fn test_memory_counts_survive_store_outage() {
        let store = Arc::new(FailingStore::new());
        let recorder = StatsRecorder::new(Some(store.clone()));
        for _ in 0..7 {
            recorder.increment_request("x", 200, 10, false, "hi").await;
        }
        assert_eq!(store.calls(), 7);

        let stats = recorder.get_stats().await;
        assert_eq!(stats.requests_by_model.get("x"), Some(&7));
        assert_eq!(stats.total_requests, 7);
    }

    #[tokio::test]
    async fn test_read_fault_returns_memory_aggregate() {
        let store = Arc::new(FailingStore::new());
        let recorder = StatsRecorder::new(Some(store));
        recorder.increment_request("gpt", 500, 42, false, "boom").await;

        let expected = {
            let (day, month) = recorder.period_keys();
            recorder.memory.lock().snapshot(&day, &month)
        };
        assert_eq!(recorder.get_stats().await, expected);
        assert_eq!(recorder.db_usage().await, DbUsage { keys: 0 });
    }

    #[tokio::test]
    async fn test_concurrent_increments_have_distinct_ids() {
        let recorder = StatsRecorder::new(None);
        let (a, b) = tokio::join!(
            recorder.increment_request("gpt", 200, 120, false, "hello world"),
            recorder.increment_request("gpt", 200, 120, false, "hello world"),
        );
        assert_ne!(a.id, b.id);

        let stats = recorder.get_stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.requests_by_model.get("gpt"), Some(&2));
        assert_eq!(stats.logs.len(), 2);
        let ids: HashSet<_> = stats.logs.iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_log_is_bounded_newest_first() {
        let recorder = StatsRecorder::new(None);
        for i in 0..(LOG_LIMIT + 5) {
            recorder
                .increment_request("m", 200, i as u64, false, "p")
                .await;
        }
        let stats = recorder.get_stats().await;
        assert_eq!(stats.logs.len(), LOG_LIMIT);
        assert_eq!(stats.logs[0].duration, (LOG_LIMIT + 4) as u64);
        assert_eq!(stats.total_requests, (LOG_LIMIT + 5) as u64);
    }

    #[tokio::test]
    async fn test_persisted_view() {
        let store = Arc::new(MemoryStore::new());
        let recorder = StatsRecorder::new(Some(store.clone()));
        recorder.increment_request("gpt", 200, 5, true, "cached").await;
        recorder.increment_request("claude", 200, 9, false, "fresh").await;

        assert_eq!(store.list(LOGS_KEY).len(), 2);

        // A second recorder over the same store sees the persisted counts
        let other = StatsRecorder::new(Some(store));
        let stats = other.get_stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.daily_requests, 2);
        assert_eq!(stats.requests_by_model.get("claude"), Some(&1));
        assert_eq!(stats.logs[0].model, "claude");
        assert!(other.db_usage().await.keys >= 5);
    }

    #[tokio::test]
    async fn test_empty_persisted_logs_fall_back_to_memory() {
        let store = Arc::new(MemoryStore::new());
        let recorder = StatsRecorder::new(Some(store.clone()));
        recorder.increment_request("gpt", 200, 5, false, "kept").await;
        store
            .execute_batch(vec![StoreOp::ListTrim {
                key: LOGS_KEY.to_string(),
                start: 1,
                stop: 0,
            }])
            .await
            .expect("trim");

        let stats = recorder.get_stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.logs.len(), 1);
        assert_eq!(stats.logs[0].preview, "kept");
    }

    #[tokio::test]
    async fn test_daily_counter_rolls_over() {
        let now = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 0).unwrap()));
        let clock_now = Arc::clone(&now);
        let recorder =
            StatsRecorder::new(None).with_clock(Arc::new(move || *clock_now.lock()));

        recorder.increment_request("m", 200, 1, false, "a").await;
        *now.lock() = Utc.with_ymd_and_hms(2024, 4, 1, 0, 1, 0).unwrap();
        recorder.increment_request("m", 200, 1, false, "b").await;

        let stats = recorder.get_stats().await;
        assert_eq!(stats.daily_requests, 1);
        assert_eq!(stats.monthly_requests, 1);
        assert_eq!(stats.total_requests, 2);
    }

    #[tokio::test]
    async fn test_flush_all() {
        let store = Arc::new(MemoryStore::new());
        let recorder = StatsRecorder::new(Some(store.clone()));
        recorder.increment_request("gpt", 200, 5, false, "x").await;
        recorder.flush_all().await.expect("flushes");
        assert_eq!(recorder.get_stats().await, Stats::default());
        assert_eq!(recorder.db_usage().await.keys, 0);
    }

    #[tokio::test]
    async fn test_flush_failure_propagates_and_keeps_memory() {
        let recorder = StatsRecorder::new(Some(Arc::new(FailingStore::new())));
        recorder.increment_request("gpt", 200, 5, false, "x").await;
        assert!(recorder.flush_all().await.is_err());
        assert_eq!(recorder.get_stats().await.total_requests, 1);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short"), "short");
        let long = "a".repeat(60);
        assert_eq!(preview(&long), format!("{}...", "a".repeat(50)));
        assert_eq!(preview(&"é".repeat(50)), "é".repeat(50));
    }
}
