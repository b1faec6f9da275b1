//! Bounded in-memory cache for catalog GET responses.
//!
//! The cache acts as a private HTTP cache: it stores response bodies keyed by
//! request URL and follows the `Cache-Control` directives and validators the
//! catalog sends. The total size of stored bodies never exceeds the configured
//! capacity; least recently used entries are evicted first.

use std::time::{Duration, Instant};

use http::header::{self, HeaderMap, HeaderValue};
use lru::LruCache;
use tracing::trace;

/// The `Cache-Control` directives relevant to a private cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CacheDirectives {
    pub(crate) no_store: bool,
    pub(crate) no_cache: bool,
    pub(crate) max_age: Option<Duration>,
}

impl CacheDirectives {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        let mut directives = CacheDirectives::default();

        let values = headers
            .get_all(header::CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok());

        for directive in values.flat_map(|value| value.split(',')) {
            let directive = directive.trim().to_ascii_lowercase();
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive.as_str(), None),
            };

            match (name, argument) {
                ("no-store", _) => directives.no_store = true,
                ("no-cache", _) => directives.no_cache = true,
                ("max-age", Some(seconds)) => {
                    // Invalid values make the response stale rather than fresh forever.
                    let seconds = seconds.parse::<u64>().unwrap_or(0);
                    directives.max_age = Some(Duration::from_secs(seconds));
                },
                _ => {},
            }
        }

        directives
    }
}

/// A stored response body together with what is needed to decide on its freshness.
#[derive(Debug, Clone)]
pub(crate) struct CachedResponse {
    body: Vec<u8>,
    stored_at: Instant,
    fresh_for: Duration,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl CachedResponse {
    /// Build a cache entry for a successful response,
    /// or `None` if the response must not or need not be stored.
    pub(crate) fn from_response(headers: &HeaderMap, body: Vec<u8>, now: Instant) -> Option<Self> {
        let directives = CacheDirectives::from_headers(headers);
        if directives.no_store {
            return None;
        }

        let fresh_for = if directives.no_cache {
            Duration::ZERO
        } else {
            directives.max_age.unwrap_or(Duration::ZERO)
        };

        let entry = CachedResponse {
            body,
            stored_at: now,
            fresh_for,
            etag: headers.get(header::ETAG).cloned(),
            last_modified: headers.get(header::LAST_MODIFIED).cloned(),
        };

        // Without a freshness lifetime or a validator the entry could never be reused.
        if entry.fresh_for.is_zero() && !entry.has_validator() {
            return None;
        }
        Some(entry)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.fresh_for
    }

    fn has_validator(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// Headers turning a request into a conditional request for this entry.
    fn conditional_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(etag) = &self.etag {
            headers.insert(header::IF_NONE_MATCH, etag.clone());
        }
        if let Some(last_modified) = &self.last_modified {
            headers.insert(header::IF_MODIFIED_SINCE, last_modified.clone());
        }
        headers
    }

    fn size(&self) -> usize {
        self.body.len()
    }
}

/// Result of looking up a URL in the cache.
#[derive(Debug)]
pub(crate) enum Lookup {
    /// A fresh body that can be used without contacting the server.
    Fresh(Vec<u8>),
    /// A stale body that may be reused if the server answers
    /// the conditional request built from `validators` with `304 Not Modified`.
    Stale {
        body: Vec<u8>,
        validators: HeaderMap,
    },
    Miss,
}

#[derive(Debug)]
pub(crate) struct ResponseCache {
    entries: LruCache<String, CachedResponse>,
    capacity_bytes: usize,
    used_bytes: usize,
}

impl ResponseCache {
    pub(crate) fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity_bytes,
            used_bytes: 0,
        }
    }

    pub(crate) fn lookup(&mut self, key: &str, now: Instant) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Miss;
        };

        if entry.is_fresh(now) {
            return Lookup::Fresh(entry.body.clone());
        }

        if entry.has_validator() {
            return Lookup::Stale {
                body: entry.body.clone(),
                validators: entry.conditional_headers(),
            };
        }

        self.remove(key);
        Lookup::Miss
    }

    pub(crate) fn insert(&mut self, key: String, entry: CachedResponse) {
        self.remove(&key);

        if entry.size() > self.capacity_bytes {
            trace!(key, size = entry.size(), "response too large to cache");
            return;
        }

        self.used_bytes += entry.size();
        self.entries.put(key, entry);

        while self.used_bytes > self.capacity_bytes {
            let Some((evicted_key, evicted)) = self.entries.pop_lru() else {
                break;
            };
            trace!(key = %evicted_key, "evicting cached response");
            self.used_bytes -= evicted.size();
        }
    }

    /// Restart the freshness lifetime of an entry after a `304 Not Modified`.
    pub(crate) fn refresh(&mut self, key: &str, headers: &HeaderMap, now: Instant) {
        let directives = CacheDirectives::from_headers(headers);
        if directives.no_store {
            self.remove(key);
            return;
        }
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.stored_at = now;
        if directives.no_cache {
            entry.fresh_for = Duration::ZERO;
        } else if let Some(max_age) = directives.max_age {
            entry.fresh_for = max_age;
        }
        if let Some(etag) = headers.get(header::ETAG) {
            entry.etag = Some(etag.clone());
        }
    }

    pub(crate) fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.pop(key) {
            self.used_bytes -= entry.size();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    fn entry(max_age: &'static str, body: &[u8], now: Instant) -> CachedResponse {
        CachedResponse::from_response(
            &headers(&[(header::CACHE_CONTROL, max_age)]),
            body.to_vec(),
            now,
        )
        .expect("response should be storable")
    }

    #[test]
    fn parses_directives() {
        let directives = CacheDirectives::from_headers(&headers(&[(
            header::CACHE_CONTROL,
            "public, Max-Age=\"300\", no-cache",
        )]));
        assert_eq!(directives, CacheDirectives {
            no_store: false,
            no_cache: true,
            max_age: Some(Duration::from_secs(300)),
        });
    }

    #[test]
    fn parses_directives_across_header_lines() {
        let directives = CacheDirectives::from_headers(&headers(&[
            (header::CACHE_CONTROL, "max-age=10"),
            (header::CACHE_CONTROL, "no-store"),
        ]));
        assert!(directives.no_store);
        assert_eq!(directives.max_age, Some(Duration::from_secs(10)));
    }

    #[test]
    fn no_store_is_never_stored() {
        let stored = CachedResponse::from_response(
            &headers(&[(header::CACHE_CONTROL, "no-store, max-age=60")]),
            b"{}".to_vec(),
            Instant::now(),
        );
        assert!(stored.is_none());
    }

    #[test]
    fn responses_without_freshness_or_validator_are_not_stored() {
        let stored = CachedResponse::from_response(&HeaderMap::new(), b"{}".to_vec(), Instant::now());
        assert!(stored.is_none());
    }

    #[test]
    fn fresh_entry_is_served_until_max_age() {
        let now = Instant::now();
        let mut cache = ResponseCache::new(1024);
        cache.insert("a".to_string(), entry("max-age=60", b"body", now));

        assert!(matches!(cache.lookup("a", now), Lookup::Fresh(body) if body == b"body"));
        assert!(matches!(
            cache.lookup("a", now + Duration::from_secs(61)),
            Lookup::Miss
        ));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn stale_entry_with_validator_asks_for_revalidation() {
        let now = Instant::now();
        let stored = CachedResponse::from_response(
            &headers(&[
                (header::CACHE_CONTROL, "no-cache"),
                (header::ETAG, "\"v1\""),
            ]),
            b"body".to_vec(),
            now,
        )
        .unwrap();
        let mut cache = ResponseCache::new(1024);
        cache.insert("a".to_string(), stored);

        match cache.lookup("a", now) {
            Lookup::Stale { body, validators } => {
                assert_eq!(body, b"body");
                assert_eq!(validators.get(header::IF_NONE_MATCH).unwrap(), "\"v1\"");
            },
            other => panic!("expected stale entry, found {other:?}"),
        }

        cache.refresh("a", &headers(&[(header::CACHE_CONTROL, "max-age=30")]), now);
        assert!(matches!(cache.lookup("a", now), Lookup::Fresh(_)));
    }

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let now = Instant::now();
        let mut cache = ResponseCache::new(10);
        cache.insert("a".to_string(), entry("max-age=60", b"aaaa", now));
        cache.insert("b".to_string(), entry("max-age=60", b"bbbb", now));
        // touch "a" so "b" becomes the eviction candidate
        let _ = cache.lookup("a", now);
        cache.insert("c".to_string(), entry("max-age=60", b"cccc", now));

        assert!(matches!(cache.lookup("a", now), Lookup::Fresh(_)));
        assert!(matches!(cache.lookup("b", now), Lookup::Miss));
        assert!(matches!(cache.lookup("c", now), Lookup::Fresh(_)));
        assert_eq!(cache.used_bytes(), 8);
    }

    #[test]
    fn oversized_entries_are_skipped() {
        let now = Instant::now();
        let mut cache = ResponseCache::new(2);
        cache.insert("a".to_string(), entry("max-age=60", b"too large", now));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn replacing_an_entry_keeps_size_accounting() {
        let now = Instant::now();
        let mut cache = ResponseCache::new(100);
        cache.insert("a".to_string(), entry("max-age=60", b"aaaa", now));
        cache.insert("a".to_string(), entry("max-age=60", b"aa", now));
        assert_eq!(cache.used_bytes(), 2);
    }
}
