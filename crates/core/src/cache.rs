use crate::error::GenerationFailure;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Exact-match cache key: document fingerprint, normalized query text and
/// the retrieved chunk id set (sorted, so ordering differences in retrieval
/// output cannot split the key). No fuzzy reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub document_id: String,
    pub query: String,
    pub chunk_ids: Vec<String>,
}

impl CacheKey {
    pub fn new(
        document_id: impl Into<String>,
        normalized_query: impl Into<String>,
        mut chunk_ids: Vec<String>,
    ) -> Self {
        chunk_ids.sort_unstable();
        Self {
            document_id: document_id.into(),
            query: normalized_query.into(),
            chunk_ids,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub answer_text: String,
    pub cited_chunk_ids: Vec<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

struct Stored {
    entry: CacheEntry,
    inserted_at: Instant,
    last_used: Instant,
}

type FlightCell = Arc<OnceCell<Result<CacheEntry, GenerationFailure>>>;

/// Process-wide answer cache shared across sessions. TTL plus LRU-bounded,
/// with single-writer-per-key semantics: concurrent misses on one key
/// coalesce into a single computation and every waiter receives that
/// flight's result, success or failure.
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, Stored>>,
    inflight: Mutex<HashMap<CacheKey, FlightCell>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, stored| stored.inserted_at.elapsed() <= ttl);
        entries.get_mut(key).map(|stored| {
            stored.last_used = Instant::now();
            stored.entry.clone()
        })
    }

    pub async fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, stored| stored.inserted_at.elapsed() <= ttl);

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, stored)| stored.last_used)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&victim);
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            Stored {
                entry,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns the cached entry for `key`, or runs `compute` exactly once
    /// across all concurrent callers for that key. The in-flight marker is
    /// the only per-key exclusivity; no lock is held while `compute` runs
    /// for other keys.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<(CacheEntry, bool), GenerationFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, GenerationFailure>>,
    {
        if let Some(entry) = self.get(&key).await {
            debug!(query = %key.query, "cache hit");
            return Ok((entry, true));
        }

        let cell: FlightCell = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key.clone()).or_default())
        };

        let result = cell
            .get_or_init(|| async {
                // Someone may have completed a previous flight between our
                // miss and acquiring the cell.
                if let Some(entry) = self.get(&key).await {
                    return Ok(entry);
                }
                compute().await
            })
            .await
            .clone();

        {
            let mut inflight = self.inflight.lock().await;
            if let Some(current) = inflight.get(&key) {
                if Arc::ptr_eq(current, &cell) {
                    inflight.remove(&key);
                }
            }
        }

        match result {
            Ok(entry) => {
                self.put(key, entry.clone()).await;
                Ok((entry, false))
            }
            Err(failure) => Err(failure),
        }
    }
}
