use std::{
    collections::{BTreeMap, HashMap},
    io::{Read, Write},
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use bytes::Bytes;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_NAMESPACE: &str = "default";

// Bookkeeping cost per entry on top of key and payload, used by the size heuristic
const ENTRY_OVERHEAD_BYTES: usize = 96;

// Memory-pressure sweeps evict down to this fraction of the ceiling
const MEMORY_TARGET_RATIO: f64 = 0.8;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size_bytes: usize,
    pub max_size_bytes: usize,
    pub items_count: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub set_count: u64,
    pub delete_count: u64,
    pub eviction_count: u64,
    pub expired_count: u64,
    pub hit_rate: f64,
    pub namespaces: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_size_bytes: usize,
    pub default_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// Payloads at or below this size are stored uncompressed even when asked to compress.
    pub compression_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_size_bytes: 100 * 1024 * 1024,
            default_ttl_seconds: 300,
            cleanup_interval_seconds: 60,
            compression_threshold_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub namespace: Option<String>,
    pub compress: bool,
}

impl SetOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
enum StoredValue {
    Json(Value),
    Compressed(Bytes),
}

#[derive(Debug)]
struct CacheEntry {
    value: StoredValue,
    namespace: String,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_access: u64,
    size: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // access tick -> key; the first entry is the least recently used
    recency: BTreeMap<u64, String>,
    tick: u64,
    max_entries: usize,
    size_bytes: usize,
    stats: CacheStats,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        self.size_bytes = self.size_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            entry.access_count += 1;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.size_bytes = self.size_bytes.saturating_sub(entry.size);
            self.stats.eviction_count += 1;
            debug!(key = %key, namespace = %entry.namespace, "evicted least recently used cache entry");
        }
        true
    }
}

pub fn calculate_item_size(key: &str, namespace: &str, payload_len: usize) -> usize {
    key.len() + namespace.len() + payload_len + ENTRY_OVERHEAD_BYTES
}

/// Builds `prefix:hash` where the hash covers the sorted-key JSON form of `params`,
/// so logically equal parameter objects always share a slot.
pub fn generate_key<T: Serialize + ?Sized>(prefix: &str, params: &T) -> String {
    let value = serde_json::to_value(params).unwrap_or(Value::Null);
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}:{}", prefix, &hex::encode(digest)[..16])
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn compress(payload: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(payload)?;
    Ok(Bytes::from(encoder.finish()?))
}

fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[derive(Debug)]
pub struct CacheManager {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let inner = CacheInner {
            max_entries: config.max_entries.max(1),
            stats: CacheStats {
                max_size_bytes: config.max_size_bytes,
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.config.default_ttl_seconds)
    }

    /// Stores `value` under `key`. Returns false only if the value cannot be serialized.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "cache value is not serializable");
                return false;
            }
        };
        self.set_value(key, json, options)
    }

    pub fn set_value(&self, key: &str, value: Value, options: SetOptions) -> bool {
        let namespace = options
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let ttl = options.ttl.unwrap_or_else(|| self.default_ttl());

        let (stored, payload_len) = if options.compress {
            let raw = value.to_string();
            if raw.len() > self.config.compression_threshold_bytes {
                match compress(raw.as_bytes()) {
                    Ok(bytes) => {
                        let len = bytes.len();
                        (StoredValue::Compressed(bytes), len)
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "compression failed, storing uncompressed");
                        (StoredValue::Json(value), raw.len())
                    }
                }
            } else {
                (StoredValue::Json(value), raw.len())
            }
        } else {
            let len = value.to_string().len();
            (StoredValue::Json(value), len)
        };

        let size = calculate_item_size(key, &namespace, payload_len);

        let mut inner = self.inner.lock();
        inner.remove(key);

        while inner.entries.len() >= inner.max_entries {
            if !inner.evict_lru() {
                break;
            }
        }

        let tick = inner.next_tick();
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value: stored,
                namespace,
                created_at: Instant::now(),
                ttl,
                access_count: 0,
                last_access: tick,
                size,
            },
        );
        inner.recency.insert(tick, key.to_string());
        inner.size_bytes += size;
        inner.stats.set_count += 1;

        true
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "cached value has an unexpected shape");
                None
            }
        }
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        let stored = {
            let mut inner = self.inner.lock();
            let now = Instant::now();

            let Some(expired) = inner.entries.get(key).map(|e| e.is_expired(now)) else {
                inner.stats.miss_count += 1;
                return None;
            };

            if expired {
                inner.remove(key);
                inner.stats.expired_count += 1;
                inner.stats.miss_count += 1;
                return None;
            }

            inner.touch(key);
            inner.stats.hit_count += 1;
            inner.entries.get(key).map(|e| e.value.clone())?
        };

        match stored {
            StoredValue::Json(value) => Some(value),
            StoredValue::Compressed(bytes) => {
                let decoded = decompress(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|raw| serde_json::from_slice(&raw).map_err(|e| e.to_string()));
                match decoded {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(key = %key, error = %e, "dropping unreadable compressed cache entry");
                        self.delete(key);
                        None
                    }
                }
            }
        }
    }

    /// True when a live entry exists. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.remove(key).is_some();
        if removed {
            inner.stats.delete_count += 1;
        }
        removed
    }

    /// Removes every entry, or only those tagged with `namespace`.
    pub fn clear(&self, namespace: Option<&str>) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| namespace.map_or(true, |ns| e.namespace == ns))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            inner.remove(key);
        }
        inner.stats.delete_count += keys.len() as u64;
        keys.len()
    }

    pub fn get_many<T: DeserializeOwned>(&self, keys: &[&str]) -> HashMap<String, T> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|v| (key.to_string(), v)))
            .collect()
    }

    pub fn set_many<T, I>(&self, entries: I, options: SetOptions) -> usize
    where
        T: Serialize,
        I: IntoIterator<Item = (String, T)>,
    {
        entries
            .into_iter()
            .filter(|(key, value)| self.set(key, value, options.clone()))
            .count()
    }

    /// Purges expired entries, then relieves memory pressure by LRU eviction.
    pub fn sweep(&self) -> SweepReport {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let mut report = SweepReport::default();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        report.expired = expired.len();
        inner.stats.expired_count += expired.len() as u64;

        if inner.size_bytes > self.config.max_size_bytes {
            let target = (self.config.max_size_bytes as f64 * MEMORY_TARGET_RATIO) as usize;
            while inner.size_bytes > target {
                if !inner.evict_lru() {
                    break;
                }
                report.evicted += 1;
            }
            warn!(
                evicted = report.evicted,
                size_bytes = inner.size_bytes,
                "cache exceeded memory ceiling"
            );
        }

        if report.expired > 0 || report.evicted > 0 {
            debug!(expired = report.expired, evicted = report.evicted, "cache sweep");
        }
        report
    }

    /// Runs `sweep` on the configured interval until the cache is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        Self::spawn_sweeper(Arc::downgrade(self), period)
    }

    fn spawn_sweeper(cache: Weak<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }

    /// Changes the entry capacity, evicting LRU entries when shrinking.
    pub fn resize(&self, max_entries: usize) -> bool {
        if max_entries == 0 {
            return false;
        }
        let mut inner = self.inner.lock();
        inner.max_entries = max_entries;
        while inner.entries.len() > max_entries {
            if !inner.evict_lru() {
                break;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();

        stats.items_count = inner.entries.len();
        stats.size_bytes = inner.size_bytes;
        let lookups = stats.hit_count + stats.miss_count;
        stats.hit_rate = if lookups == 0 {
            0.0
        } else {
            stats.hit_count as f64 / lookups as f64
        };
        for entry in inner.entries.values() {
            *stats.namespaces.entry(entry.namespace.clone()).or_insert(0) += 1;
        }
        stats
    }

    /// Access count of a live entry, mainly for diagnostics.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.inner.lock().entries.get(key).map(|e| e.access_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn small_cache(max_entries: usize) -> CacheManager {
        CacheManager::new(CacheConfig {
            max_entries,
            ..Default::default()
        })
    }

    #[test]
    fn test_expiration_and_ttl() {
        let cache = CacheManager::default();

        assert!(cache.set(
            "hotel:123",
            &json!({"name": "X"}),
            SetOptions::ttl(Duration::from_millis(1000))
        ));
        assert_eq!(cache.get::<Value>("hotel:123"), Some(json!({"name": "X"})));

        thread::sleep(Duration::from_millis(1100));

        assert_eq!(cache.get::<Value>("hotel:123"), None);
        let stats = cache.stats();
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.items_count, 0);
    }

    #[test]
    fn test_eviction_policy_lru() {
        let cache = small_cache(3);

        for i in 0..3 {
            cache.set(&format!("hotel{i}"), &i, SetOptions::default());
        }

        // hotel0 becomes the most recently used, hotel1 is now the oldest
        assert_eq!(cache.get::<i32>("hotel0"), Some(0));

        assert!(cache.set("hotel3", &3, SetOptions::default()));

        assert!(!cache.has("hotel1"));
        assert!(cache.has("hotel0"));
        assert!(cache.has("hotel2"));
        assert!(cache.has("hotel3"));
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[test]
    fn test_insert_past_capacity_evicts_first_inserted() {
        let cache = small_cache(5);
        for i in 0..6 {
            cache.set(&format!("k{i}"), &i, SetOptions::default());
        }
        assert_eq!(cache.len(), 5);
        assert!(!cache.has("k0"));
        assert!((1..6).all(|i| cache.has(&format!("k{i}"))));
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let cache = small_cache(2);
        cache.set("a", &1, SetOptions::default());
        cache.set("b", &2, SetOptions::default());
        cache.set("a", &10, SetOptions::default());

        assert_eq!(cache.get::<i32>("a"), Some(10));
        assert_eq!(cache.get::<i32>("b"), Some(2));
        assert_eq!(cache.stats().eviction_count, 0);
    }

    #[test]
    fn test_key_generation_is_order_independent() {
        let a = generate_key("search", &json!({"a": 1, "b": 2}));
        let b = generate_key("search", &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
        assert!(a.starts_with("search:"));
        assert_eq!(a.len(), "search:".len() + 16);

        let nested_a = generate_key("x", &json!({"outer": {"z": [1, 2], "y": null}}));
        let nested_b = generate_key("x", &json!({"outer": {"y": null, "z": [1, 2]}}));
        assert_eq!(nested_a, nested_b);

        assert_ne!(a, generate_key("search", &json!({"a": 1, "b": 3})));
    }

    #[test]
    fn test_namespace_clear_and_stats() {
        let cache = CacheManager::default();
        let hotels = SetOptions::default().with_namespace("hotel");
        let geo = SetOptions::default().with_namespace("geo");

        cache.set("h1", &1, hotels.clone());
        cache.set("h2", &2, hotels);
        cache.set("g1", &3, geo);

        let stats = cache.stats();
        assert_eq!(stats.namespaces.get("hotel"), Some(&2));
        assert_eq!(stats.namespaces.get("geo"), Some(&1));

        assert_eq!(cache.clear(Some("hotel")), 2);
        assert!(!cache.has("h1"));
        assert!(cache.has("g1"));

        assert_eq!(cache.clear(None), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().size_bytes, 0);
    }

    #[test]
    fn test_hit_rate_and_access_count() {
        let cache = CacheManager::default();
        cache.set("k", &"v", SetOptions::default());

        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));
        assert_eq!(cache.get::<String>("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 2);
        assert_eq!(stats.miss_count, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(cache.access_count("k"), Some(2));
    }

    #[test]
    fn test_batch_helpers() {
        let cache = CacheManager::default();
        let stored = cache.set_many(
            vec![("a".to_string(), 1), ("b".to_string(), 2)],
            SetOptions::default(),
        );
        assert_eq!(stored, 2);

        let found: HashMap<String, i32> = cache.get_many(&["a", "b", "c"]);
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], 2);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
    }

    #[test]
    fn test_compressed_entries_read_back() {
        let cache = CacheManager::new(CacheConfig {
            compression_threshold_bytes: 64,
            ..Default::default()
        });
        let payload: Vec<String> = (0..200).map(|i| format!("room-{i}")).collect();

        cache.set("rooms", &payload, SetOptions::default());
        let plain_size = cache.stats().size_bytes;
        cache.set("rooms", &payload, SetOptions::default().compressed());
        let compressed_size = cache.stats().size_bytes;

        assert!(compressed_size < plain_size);
        assert_eq!(cache.get::<Vec<String>>("rooms"), Some(payload));
    }

    #[test]
    fn test_sweep_relieves_memory_pressure() {
        let cache = CacheManager::new(CacheConfig {
            max_entries: 10_000,
            max_size_bytes: 20 * 1024,
            ..Default::default()
        });
        let blob = "x".repeat(1024);
        for i in 0..40 {
            cache.set(&format!("blob{i}"), &blob, SetOptions::default());
        }
        assert!(cache.stats().size_bytes > 20 * 1024);

        let report = cache.sweep();
        let stats = cache.stats();
        assert!(report.evicted > 0);
        assert!(stats.size_bytes <= (20.0 * 1024.0 * MEMORY_TARGET_RATIO) as usize);
        // oldest entries go first
        assert!(!cache.has("blob0"));
        assert!(cache.has("blob39"));
    }

    #[test]
    fn test_sweep_purges_expired() {
        let cache = CacheManager::default();
        cache.set("short", &1, SetOptions::ttl(Duration::from_millis(50)));
        cache.set("long", &2, SetOptions::ttl(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(80));

        let report = cache.sweep();
        assert_eq!(report, SweepReport { expired: 1, evicted: 0 });
        assert!(cache.has("long"));
    }

    #[test]
    fn test_cache_resize() {
        let cache = small_cache(50);
        for i in 0..50 {
            cache.set(&format!("hotel{i}"), &i, SetOptions::default());
        }

        assert!(cache.resize(10));
        assert_eq!(cache.len(), 10);
        assert!(cache.has("hotel49"));
        assert!(!cache.has("hotel0"));

        assert!(cache.resize(100));
        for i in 50..120 {
            cache.set(&format!("hotel{i}"), &i, SetOptions::default());
        }
        assert_eq!(cache.len(), 80);
        assert!(!cache.resize(0));
    }

    #[test]
    fn test_high_contention() {
        let cache = Arc::new(small_cache(500));
        let mut handles = vec![];

        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let key = format!("hotel{}", (i * 7 + t) % 300);
                    if i % 3 == 0 {
                        cache.set(&key, &i, SetOptions::default());
                    } else {
                        let _ = cache.get::<i32>(&key);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.items_count <= 500);
        assert_eq!(stats.hit_count + stats.miss_count, 8 * 1000 - 8 * 334);
    }

    #[tokio::test]
    async fn test_background_sweeper_stops_with_cache() {
        let cache = Arc::new(CacheManager::default());
        cache.set("short", &1, SetOptions::ttl(Duration::from_millis(10)));

        let handle = CacheManager::spawn_sweeper(Arc::downgrade(&cache), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.stats().expired_count, 1);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit once the cache is gone")
            .unwrap();
    }
}
