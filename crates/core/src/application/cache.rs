//! Time-boxed cache with single-flight background refresh
//!
//! Serves an expensive listing with bounded staleness. On access past the
//! TTL exactly one refresh is dispatched to a dedicated task; callers wait at
//! most `refresh_wait` for it and otherwise get the stale value.

use super::worker::constants::{DEFAULT_CACHE_REFRESH_WAIT, DEFAULT_CACHE_TTL};
use crate::error::Result;
use crate::port::TimeProvider;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age after which an entry is refreshed
    pub ttl: Duration,
    /// Longest a caller waits for an outstanding refresh
    pub refresh_wait: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            refresh_wait: DEFAULT_CACHE_REFRESH_WAIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub cached: bool,
    pub age_ms: Option<i64>,
    pub refreshes: u64,
    pub failures: u64,
}

type Producer<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

struct Entry<V> {
    value: V,
    captured_at: i64,
}

struct Shared<V> {
    entry: RwLock<Option<Entry<V>>>,
    enabled: AtomicBool,
    in_flight: AtomicBool,
    /// No refresh is dispatched before this instant (set after a failure)
    next_attempt_at: AtomicI64,
    /// Bumped whenever a refresh finishes, successfully or not
    generation: watch::Sender<u64>,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

pub struct RefreshableCache<V> {
    shared: Arc<Shared<V>>,
    producer: Producer<V>,
    config: CacheConfig,
    time_provider: Arc<dyn TimeProvider>,
    refresh_tx: mpsc::Sender<()>,
}

impl<V> RefreshableCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create the cache and start its refresh task
    ///
    /// Must be called inside a Tokio runtime. The refresh task ends when the
    /// cache is dropped.
    pub fn new<F, Fut>(producer: F, config: CacheConfig, time_provider: Arc<dyn TimeProvider>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let producer: Producer<V> = Arc::new(move || producer().boxed());
        let (generation, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            entry: RwLock::new(None),
            enabled: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            next_attempt_at: AtomicI64::new(i64::MIN),
            generation,
            refreshes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        tokio::spawn(refresh_loop(
            Arc::clone(&shared),
            Arc::clone(&producer),
            Arc::clone(&time_provider),
            config.ttl,
            refresh_rx,
        ));

        Self {
            shared,
            producer,
            config,
            time_provider,
            refresh_tx,
        }
    }

    /// Cached value, refreshed in the background once expired
    ///
    /// Returns `None` when nothing is cached or the cache is disabled. The
    /// flag is `true` whenever the value came from the cache.
    pub async fn get_or_refresh(&self) -> Option<(V, bool)> {
        if !self.is_enabled() {
            return None;
        }

        let (value, stale) = self.snapshot()?;
        if !stale {
            return Some((value, true));
        }

        let now = self.time_provider.now_millis();
        if now < self.shared.next_attempt_at.load(Ordering::SeqCst) {
            return Some((value, true));
        }

        // Subscribe before dispatching so the completion cannot be missed
        let mut finished = self.shared.generation.subscribe();
        if !self.dispatch_refresh() {
            let (current, _) = self.snapshot().unwrap_or((value, true));
            return Some((current, true));
        }

        match timeout(self.config.refresh_wait, finished.changed()).await {
            Ok(Ok(())) => match self.snapshot() {
                Some((latest, _)) => Some((latest, true)),
                None => Some((value, true)),
            },
            _ => {
                debug!("Cache refresh still running, serving stale value");
                Some((value, true))
            }
        }
    }

    /// Cached value, or a fresh one computed on the caller
    ///
    /// A computed value is stored while the cache is enabled.
    pub async fn get_or_compute(&self) -> Result<V> {
        if let Some((value, _)) = self.get_or_refresh().await {
            return Ok(value);
        }

        let value = (self.producer)().await?;
        let mut entry = self.shared.entry.write();
        if self.is_enabled() {
            *entry = Some(Entry {
                value: value.clone(),
                captured_at: self.time_provider.now_millis(),
            });
        }
        Ok(value)
    }

    /// Enable or disable caching; disabling drops the held entry immediately
    pub fn set_enabled(&self, enabled: bool) {
        // Entry writers check the flag under this lock
        let mut entry = self.shared.entry.write();
        self.shared.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            entry.take();
        }
        drop(entry);
        info!(enabled, "Cache toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Drop the held entry
    pub fn invalidate(&self) {
        self.shared.entry.write().take();
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.time_provider.now_millis();
        let age_ms = self
            .shared
            .entry
            .read()
            .as_ref()
            .map(|entry| now - entry.captured_at);
        CacheStats {
            enabled: self.is_enabled(),
            cached: age_ms.is_some(),
            age_ms,
            refreshes: self.shared.refreshes.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }

    /// Current value and whether it is past the TTL
    fn snapshot(&self) -> Option<(V, bool)> {
        let now = self.time_provider.now_millis();
        let ttl_ms = self.config.ttl.as_millis() as i64;
        self.shared
            .entry
            .read()
            .as_ref()
            .map(|entry| (entry.value.clone(), now - entry.captured_at >= ttl_ms))
    }

    /// Start a refresh unless one is already in flight
    ///
    /// Returns `false` when no refresh is running or due: the entry was
    /// refreshed meanwhile, a failure deferred the next attempt, or the
    /// refresh task is gone. The refresh task records both the entry and the
    /// deferral before clearing `in_flight`, so they are re-read after
    /// claiming it.
    fn dispatch_refresh(&self) -> bool {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        let deferred =
            self.time_provider.now_millis() < self.shared.next_attempt_at.load(Ordering::SeqCst);
        let fresh = matches!(self.snapshot(), Some((_, false)));
        if deferred || fresh {
            self.shared.in_flight.store(false, Ordering::SeqCst);
            return false;
        }

        if self.refresh_tx.try_send(()).is_err() {
            self.shared.in_flight.store(false, Ordering::SeqCst);
            warn!("Cache refresh task unavailable");
            return false;
        }
        debug!("Cache refresh dispatched");
        true
    }
}

async fn refresh_loop<V>(
    shared: Arc<Shared<V>>,
    producer: Producer<V>,
    time_provider: Arc<dyn TimeProvider>,
    ttl: Duration,
    mut requests: mpsc::Receiver<()>,
) where
    V: Send + Sync + 'static,
{
    while requests.recv().await.is_some() {
        let outcome = AssertUnwindSafe(producer()).catch_unwind().await;
        let now = time_provider.now_millis();

        match outcome {
            Ok(Ok(value)) => {
                let mut entry = shared.entry.write();
                if shared.enabled.load(Ordering::SeqCst) {
                    *entry = Some(Entry {
                        value,
                        captured_at: now,
                    });
                }
                drop(entry);
                shared.refreshes.fetch_add(1, Ordering::Relaxed);
                debug!("Cache refreshed");
            }
            Ok(Err(e)) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                shared
                    .next_attempt_at
                    .store(now + ttl.as_millis() as i64, Ordering::SeqCst);
                warn!(error = %e, "Cache refresh failed, keeping previous value");
            }
            Err(_) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                shared
                    .next_attempt_at
                    .store(now + ttl.as_millis() as i64, Ordering::SeqCst);
                warn!("Cache refresh panicked, keeping previous value");
            }
        }

        shared.in_flight.store(false, Ordering::SeqCst);
        shared.generation.send_modify(|generation| *generation += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(300);

    fn config(refresh_wait: Duration) -> CacheConfig {
        CacheConfig {
            ttl: TTL,
            refresh_wait,
        }
    }

    /// Producer returning 1, 2, 3... after `delay`; fails on the calls in `fail_on`
    fn counting(
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail_on: &'static [usize],
    ) -> impl Fn() -> BoxFuture<'static, Result<usize>> + Send + Sync + 'static {
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                if fail_on.contains(&n) {
                    return Err(AppError::Internal("inventory unavailable".to_string()));
                }
                Ok(n)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_empty_cache_falls_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::ZERO, &[]),
            config(Duration::from_secs(1)),
            clock,
        );

        assert!(cache.get_or_refresh().await.is_none());
        assert_eq!(cache.get_or_compute().await.unwrap(), 1);
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_triggers_exactly_one_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = Arc::new(RefreshableCache::new(
            counting(calls.clone(), Duration::from_millis(50), &[]),
            config(Duration::from_secs(5)),
            clock.clone(),
        ));
        assert_eq!(cache.get_or_compute().await.unwrap(), 1);

        clock.advance_millis(TTL.as_millis() as i64);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_or_refresh().await }));
        }
        for handle in handles {
            let (value, cached) = handle.await.unwrap().unwrap();
            assert!(cached);
            assert!(value == 1 || value == 2);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_or_refresh().await, Some((2, true)));
        assert_eq!(cache.stats().refreshes, 1);
    }

    #[tokio::test]
    async fn test_slow_refresh_serves_stale_after_bounded_wait() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::from_millis(300), &[]),
            config(Duration::from_millis(20)),
            clock.clone(),
        );
        // Seed directly through the caller path (300ms)
        assert_eq!(cache.get_or_compute().await.unwrap(), 1);

        clock.advance_millis(TTL.as_millis() as i64);
        let started = std::time::Instant::now();
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        assert!(started.elapsed() < Duration::from_millis(250));

        // A second caller coalesces onto the same refresh
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_value_and_defers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::ZERO, &[2]),
            config(Duration::from_secs(5)),
            clock.clone(),
        );
        assert_eq!(cache.get_or_compute().await.unwrap(), 1);

        clock.advance_millis(TTL.as_millis() as i64);
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().failures, 1);

        // Next attempt waits a full TTL
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        clock.advance_millis(TTL.as_millis() as i64);
        assert_eq!(cache.get_or_refresh().await, Some((3, true)));
    }

    #[tokio::test]
    async fn test_disable_drops_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::ZERO, &[]),
            config(Duration::from_secs(1)),
            clock,
        );
        cache.get_or_compute().await.unwrap();
        assert!(cache.stats().cached);

        cache.set_enabled(false);
        assert!(cache.get_or_refresh().await.is_none());
        assert!(!cache.stats().cached);

        // Computed but not stored while disabled
        assert_eq!(cache.get_or_compute().await.unwrap(), 2);
        assert!(!cache.stats().cached);

        cache.set_enabled(true);
        assert!(cache.get_or_refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(0));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::ZERO, &[]),
            config(Duration::from_secs(1)),
            clock,
        );
        cache.get_or_compute().await.unwrap();
        cache.invalidate();
        assert!(cache.get_or_refresh().await.is_none());
        assert_eq!(cache.get_or_compute().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_dispatch_inside_deferral_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::ZERO, &[2]),
            config(Duration::from_secs(5)),
            clock.clone(),
        );
        assert_eq!(cache.get_or_compute().await.unwrap(), 1);
        clock.advance_millis(TTL.as_millis() as i64);
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        assert_eq!(cache.stats().failures, 1);

        // A caller that passed the deferral check before the failure was
        // recorded reaches dispatch only after `in_flight` is cleared
        assert!(!cache.dispatch_refresh());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.shared.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_dispatch_when_already_fresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::ZERO, &[]),
            config(Duration::from_secs(5)),
            clock,
        );
        cache.get_or_compute().await.unwrap();

        assert!(!cache.dispatch_refresh());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_finishing_after_disable_stores_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let cache = RefreshableCache::new(
            counting(calls.clone(), Duration::from_millis(100), &[]),
            config(Duration::from_millis(10)),
            clock.clone(),
        );
        cache.get_or_compute().await.unwrap();
        clock.advance_millis(TTL.as_millis() as i64);

        // Refresh is left running past the wait
        assert_eq!(cache.get_or_refresh().await, Some((1, true)));
        cache.set_enabled(false);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.stats().refreshes, 1);

        cache.set_enabled(true);
        assert!(!cache.stats().cached);
        assert!(cache.get_or_refresh().await.is_none());
    }
}
