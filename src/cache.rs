//! In-memory analysis cache keyed by a cheap image fingerprint.
//! Entries expire 30 minutes after creation and are evicted lazily on lookup.
//! There is no capacity bound.

use crate::input::split_data_url;
use crate::result::AnalysisResult;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;

pub const FINGERPRINT_SAMPLES: usize = 100;

/// Source of "now" for expiry checks and result timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Samples evenly spaced characters of a textual payload (base64 or data
/// URL). The data-URL header is ignored.
pub fn fingerprint_text(payload: &str) -> String {
    let (body, _) = split_data_url(payload.trim());
    sample(body.as_bytes())
        .map(|byte| byte as char)
        .collect()
}

/// Samples evenly spaced bytes of a binary payload, hex encoded.
pub fn fingerprint_bytes(payload: &[u8]) -> String {
    sample(payload).fold(String::with_capacity(FINGERPRINT_SAMPLES * 2), |mut key, byte| {
        let _ = write!(key, "{byte:02x}");
        key
    })
}

fn sample(payload: &[u8]) -> impl Iterator<Item = u8> + '_ {
    let len = payload.len();
    let step = (len / FINGERPRINT_SAMPLES).max(1);
    let count = if len == 0 { 0 } else { FINGERPRINT_SAMPLES };
    (0..count).map(move |i| payload[(i * step) % len])
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
}

pub struct AnalysisCache<C: Clock = SystemClock> {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: C,
}

impl AnalysisCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for AnalysisCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> AnalysisCache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(30),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a fresh cached result, evicting the entry if it has expired.
    pub fn get(&self, fingerprint: &str) -> Option<AnalysisResult> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(fingerprint) {
            if now - entry.created_at < self.ttl {
                return Some(entry.result.clone());
            }
            debug!("Cache entry expired, evicting");
            entries.remove(fingerprint);
        }
        None
    }

    pub fn insert(&self, fingerprint: String, result: AnalysisResult) {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            result,
            created_at: self.clock.now(),
        };
        self.entries.lock().insert(fingerprint, entry);
    }

    /// Serves `fingerprint` from the cache or runs `compute` and stores its
    /// result. Errors are returned as-is and not cached. The lock is not held
    /// while computing, so concurrent misses may compute twice.
    pub fn get_or_compute<E>(
        &self,
        fingerprint: &str,
        compute: impl FnOnce() -> Result<AnalysisResult, E>,
    ) -> Result<AnalysisResult, E> {
        if let Some(result) = self.get(fingerprint) {
            info!("Using cached analysis result");
            return Ok(result);
        }
        let result = compute()?;
        self.insert(fingerprint.to_string(), result.clone());
        Ok(result)
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.created_at < self.ttl);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ThreatClassifier;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to.
    #[derive(Default)]
    struct ManualClock {
        offset_secs: AtomicI64,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.offset_secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
                + Duration::seconds(self.offset_secs.load(Ordering::SeqCst))
        }
    }

    fn classify_now(cache: &AnalysisCache<ManualClock>) -> Result<AnalysisResult, ()> {
        Ok(ThreatClassifier::default().classify_at("hello", cache.clock().now()))
    }

    #[test]
    fn fingerprint_ignores_data_url_header() {
        let body = "iVBORw0KGgo".repeat(40);
        assert_eq!(
            fingerprint_text(&body),
            fingerprint_text(&format!("data:image/png;base64,{body}"))
        );
        assert_eq!(fingerprint_text(&body).len(), FINGERPRINT_SAMPLES);
    }

    #[test]
    fn fingerprint_handles_short_and_empty_payloads() {
        assert_eq!(fingerprint_text(""), "");
        assert_eq!(fingerprint_bytes(&[]), "");
        assert_eq!(fingerprint_text("abc").len(), FINGERPRINT_SAMPLES);
        assert_eq!(fingerprint_bytes(&[1, 2, 3]).len(), FINGERPRINT_SAMPLES * 2);
    }

    #[test]
    fn fingerprint_samples_evenly() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let key = fingerprint_bytes(&payload);
        assert!(key.starts_with("000a141e"));
    }

    #[test]
    fn second_lookup_within_window_is_served_from_cache() {
        let cache = AnalysisCache::with_clock(ManualClock::default());
        let mut computed = 0;
        let first = cache
            .get_or_compute("key", || {
                computed += 1;
                classify_now(&cache)
            })
            .unwrap();
        cache.clock().advance(Duration::minutes(29));
        let second = cache
            .get_or_compute("key", || {
                computed += 1;
                classify_now(&cache)
            })
            .unwrap();
        assert_eq!(computed, 1);
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(first, second);
    }

    #[test]
    fn expired_entries_are_recomputed() {
        let cache = AnalysisCache::with_clock(ManualClock::default());
        let first = cache.get_or_compute("key", || classify_now(&cache)).unwrap();
        cache.clock().advance(Duration::minutes(30));
        assert!(cache.get("key").is_none());
        assert!(cache.is_empty());
        let second = cache.get_or_compute("key", || classify_now(&cache)).unwrap();
        assert_ne!(first.timestamp, second.timestamp);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = AnalysisCache::with_clock(ManualClock::default());
        let failed: Result<AnalysisResult, &str> = cache.get_or_compute("key", || Err("boom"));
        assert_eq!(failed.unwrap_err(), "boom");
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let cache = AnalysisCache::with_clock(ManualClock::default());
        cache.insert("old".into(), classify_now(&cache).unwrap());
        cache.clock().advance(Duration::minutes(20));
        cache.insert("new".into(), classify_now(&cache).unwrap());
        cache.clock().advance(Duration::minutes(15));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get("new").is_some());
    }
}
