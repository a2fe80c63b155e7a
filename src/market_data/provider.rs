// =============================================================================
// Market Data Provider boundary
// =============================================================================
//
// The engine consumes exactly one capability from its environment: fetching
// raw OHLCV history for a ticker.  Providers never raise; an outage, a rate
// limit or an unknown ticker all come back as `None`, which callers treat as
// "no data" rather than as an error.
//
// `CachedProvider` memoizes fetches per coarse time bucket.  Caching lives
// here at the boundary; indicator and optimizer code stay cache-free.
// =============================================================================

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::market_data::RawTable;

/// Source of raw price history.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// `period` / `interval` are opaque provider strings such as `"2y"` /
    /// `"1d"` or `"5d"` / `"5m"`.
    async fn fetch_history(&self, ticker: &str, period: &str, interval: &str)
        -> Option<RawTable>;
}

/// Composite key for one cached fetch.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct FetchKey {
    ticker: String,
    period: String,
    interval: String,
}

impl std::fmt::Display for FetchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.ticker, self.period, self.interval)
    }
}

/// Wraps a provider and reuses results fetched within the same
/// `ttl_secs`-wide time bucket.  Empty results are never cached.
pub struct CachedProvider<P> {
    inner: P,
    ttl_secs: u64,
    entries: RwLock<HashMap<FetchKey, (u64, RawTable)>>,
}

impl<P: HistoryProvider> CachedProvider<P> {
    /// `ttl_secs == 0` disables caching.
    pub fn new(inner: P, ttl_secs: u64) -> Self {
        Self {
            inner,
            ttl_secs,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn bucket(&self) -> Option<u64> {
        if self.ttl_secs == 0 {
            return None;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Some(now / self.ttl_secs)
    }
}

#[async_trait]
impl<P: HistoryProvider> HistoryProvider for CachedProvider<P> {
    async fn fetch_history(
        &self,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Option<RawTable> {
        let Some(bucket) = self.bucket() else {
            return self.inner.fetch_history(ticker, period, interval).await;
        };
        let key = FetchKey {
            ticker: ticker.to_uppercase(),
            period: period.to_string(),
            interval: interval.to_string(),
        };

        let cached = self
            .entries
            .read()
            .get(&key)
            .filter(|(b, _)| *b == bucket)
            .map(|(_, table)| table.clone());
        if let Some(table) = cached {
            debug!(key = %key, "history cache hit");
            return Some(table);
        }

        let table = self.inner.fetch_history(ticker, period, interval).await?;

        let mut map = self.entries.write();
        map.retain(|_, (b, _)| *b == bucket);
        map.insert(key, (bucket, table.clone()));
        Some(table)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Provider that serves one fixed table (or nothing) and counts calls.
    pub struct StaticProvider {
        pub table: Option<RawTable>,
        pub calls: AtomicUsize,
    }

    impl StaticProvider {
        pub fn new(table: Option<RawTable>) -> Self {
            Self {
                table,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistoryProvider for StaticProvider {
        async fn fetch_history(&self, _: &str, _: &str, _: &str) -> Option<RawTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::StaticProvider;
    use super::*;
    use serde_json::json;

    fn table() -> RawTable {
        RawTable::new(Some(vec![json!(1)])).with_column("close", vec![json!(1.0)])
    }

    #[tokio::test]
    async fn repeated_fetch_hits_cache() {
        let cached = CachedProvider::new(StaticProvider::new(Some(table())), 1_000_000_000);
        assert!(cached.fetch_history("aapl", "2y", "1d").await.is_some());
        assert!(cached.fetch_history("AAPL", "2y", "1d").await.is_some());
        assert_eq!(cached.inner.calls(), 1);
        assert_eq!(cached.entries.read().len(), 1);
    }

    #[tokio::test]
    async fn different_windows_are_separate_entries() {
        let cached = CachedProvider::new(StaticProvider::new(Some(table())), 1_000_000_000);
        cached.fetch_history("AAPL", "2y", "1d").await;
        cached.fetch_history("AAPL", "5d", "5m").await;
        assert_eq!(cached.inner.calls(), 2);
        assert_eq!(cached.entries.read().len(), 2);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let cached = CachedProvider::new(StaticProvider::new(None), 1_000_000_000);
        assert!(cached.fetch_history("ZZZZ", "2y", "1d").await.is_none());
        assert!(cached.fetch_history("ZZZZ", "2y", "1d").await.is_none());
        assert_eq!(cached.inner.calls(), 2);
        assert!(cached.entries.read().is_empty());
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let cached = CachedProvider::new(StaticProvider::new(Some(table())), 0);
        cached.fetch_history("AAPL", "2y", "1d").await;
        cached.fetch_history("AAPL", "2y", "1d").await;
        assert_eq!(cached.inner.calls(), 2);
    }
}
