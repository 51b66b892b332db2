use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples retained per histogram
const LATENCY_WINDOW: usize = 1000;

/// Process-wide metrics collector.
///
/// Tracks recognition fan-outs, language identification, translation
/// batching and cache behaviour. Cheap to clone; every clone shares the
/// same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Recognition
    recognitions_total: AtomicUsize,
    recognitions_empty: AtomicUsize,
    engine_calls: DashMap<String, AtomicUsize>,
    engine_failures: DashMap<String, AtomicUsize>,

    // Language identification
    identification_calls: AtomicUsize,
    identification_fallbacks: AtomicUsize,

    // Translation
    batches_accepted: AtomicUsize,
    batches_fallback: AtomicUsize,
    sequential_calls: AtomicUsize,
    sequential_failures: AtomicUsize,
    translate_latency_ms: RwLock<VecDeque<u64>>,
    temporary_opened: AtomicUsize,
    temporary_closed: AtomicUsize,

    // Cache
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_size: AtomicUsize,

    // Pages
    pages_processed: AtomicUsize,
    page_latency_ms: RwLock<VecDeque<u64>>,

    endpoint_counters: DashMap<String, AtomicUsize>,
    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                recognitions_total: AtomicUsize::new(0),
                recognitions_empty: AtomicUsize::new(0),
                engine_calls: DashMap::new(),
                engine_failures: DashMap::new(),
                identification_calls: AtomicUsize::new(0),
                identification_fallbacks: AtomicUsize::new(0),
                batches_accepted: AtomicUsize::new(0),
                batches_fallback: AtomicUsize::new(0),
                sequential_calls: AtomicUsize::new(0),
                sequential_failures: AtomicUsize::new(0),
                translate_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                temporary_opened: AtomicUsize::new(0),
                temporary_closed: AtomicUsize::new(0),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_size: AtomicUsize::new(0),
                pages_processed: AtomicUsize::new(0),
                page_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                endpoint_counters: DashMap::new(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    // Recognition
    pub fn record_recognition(&self, found_text: bool) {
        self.inner.recognitions_total.fetch_add(1, Ordering::Relaxed);
        if !found_text {
            self.inner.recognitions_empty.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_engine_call(&self, engine: &str, success: bool) {
        bump(&self.inner.engine_calls, engine);
        if !success {
            bump(&self.inner.engine_failures, engine);
        }
    }

    // Language identification
    pub fn record_identification(&self, fell_back: bool) {
        self.inner.identification_calls.fetch_add(1, Ordering::Relaxed);
        if fell_back {
            self.inner.identification_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Translation
    pub fn record_batch(&self, accepted: bool, duration: Duration) {
        if accepted {
            self.inner.batches_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.batches_fallback.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.translate_latency_ms, duration);
    }

    pub fn record_sequential_call(&self, success: bool) {
        self.inner.sequential_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.sequential_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_temporary_opened(&self) {
        self.inner.temporary_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_temporary_closed(&self) {
        self.inner.temporary_closed.fetch_add(1, Ordering::Relaxed);
    }

    // Cache
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed);
    }

    // Pages
    pub fn record_page_processed(&self, duration: Duration) {
        self.inner.pages_processed.fetch_add(1, Ordering::Relaxed);
        push_sample(&self.inner.page_latency_ms, duration);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        bump(&self.inner.endpoint_counters, endpoint);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let translate_latency = self.inner.translate_latency_ms.read();
        let translate_latency_avg_ms = avg(&translate_latency);
        let translate_latency_p95_ms = percentile(&translate_latency, 0.95);
        drop(translate_latency);

        let page_latency = self.inner.page_latency_ms.read();
        let page_latency_avg_ms = avg(&page_latency);
        let page_latency_p95_ms = percentile(&page_latency, 0.95);
        drop(page_latency);

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            recognitions_total: self.inner.recognitions_total.load(Ordering::Relaxed),
            recognitions_empty: self.inner.recognitions_empty.load(Ordering::Relaxed),
            engine_calls: collect_counters(&self.inner.engine_calls),
            engine_failures: collect_counters(&self.inner.engine_failures),
            identification_calls: self.inner.identification_calls.load(Ordering::Relaxed),
            identification_fallbacks: self.inner.identification_fallbacks.load(Ordering::Relaxed),
            batches_accepted: self.inner.batches_accepted.load(Ordering::Relaxed),
            batches_fallback: self.inner.batches_fallback.load(Ordering::Relaxed),
            sequential_calls: self.inner.sequential_calls.load(Ordering::Relaxed),
            sequential_failures: self.inner.sequential_failures.load(Ordering::Relaxed),
            translate_latency_avg_ms,
            translate_latency_p95_ms,
            temporary_translators_opened: self.inner.temporary_opened.load(Ordering::Relaxed),
            temporary_translators_closed: self.inner.temporary_closed.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_size: self.inner.cache_size.load(Ordering::Relaxed),
            pages_processed: self.inner.pages_processed.load(Ordering::Relaxed),
            page_latency_avg_ms,
            page_latency_p95_ms,
            endpoint_requests: collect_counters(&self.inner.endpoint_counters),
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = format!(
            r#"# HELP recognitions_total Total recognition fan-outs
# TYPE recognitions_total counter
recognitions_total {{}} {}

# HELP recognitions_empty_total Fan-outs where no engine produced usable text
# TYPE recognitions_empty_total counter
recognitions_empty_total {{}} {}

# HELP identification_calls_total Calls to the language identification service
# TYPE identification_calls_total counter
identification_calls_total {{}} {}

# HELP identification_fallbacks_total Identification calls resolved with the heuristic
# TYPE identification_fallbacks_total counter
identification_fallbacks_total {{}} {}

# HELP translation_batches_total Marker batches by outcome
# TYPE translation_batches_total counter
translation_batches_total {{outcome="accepted"}} {}
translation_batches_total {{outcome="fallback"}} {}

# HELP sequential_translations_total Per-fragment fallback calls
# TYPE sequential_translations_total counter
sequential_translations_total {{}} {}
sequential_translation_failures_total {{}} {}

# HELP translate_latency_avg_ms Average batch round latency in milliseconds
# TYPE translate_latency_avg_ms gauge
translate_latency_avg_ms {{}} {}

# HELP temporary_translators_total Temporary translator instances
# TYPE temporary_translators_total counter
temporary_translators_total {{event="opened"}} {}
temporary_translators_total {{event="closed"}} {}

# HELP cache_hit_rate Cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {{}} {}

# HELP cache_size Current cache size
# TYPE cache_size gauge
cache_size {{}} {}

# HELP pages_processed_total Pages run through the pipeline
# TYPE pages_processed_total counter
pages_processed_total {{}} {}

# HELP circuit_breaker_trips_total Total circuit breaker trips
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            s.recognitions_total,
            s.recognitions_empty,
            s.identification_calls,
            s.identification_fallbacks,
            s.batches_accepted,
            s.batches_fallback,
            s.sequential_calls,
            s.sequential_failures,
            s.translate_latency_avg_ms,
            s.temporary_translators_opened,
            s.temporary_translators_closed,
            s.cache_hit_rate,
            s.cache_size,
            s.pages_processed,
            s.circuit_breaker_trips,
            s.uptime_seconds,
        );

        out.push_str("\n# HELP engine_calls_total Recognition engine calls by engine\n");
        out.push_str("# TYPE engine_calls_total counter\n");
        for (engine, count) in &s.engine_calls {
            let _ = writeln!(out, "engine_calls_total {{engine=\"{}\"}} {}", engine, count);
        }
        for (engine, count) in &s.engine_failures {
            let _ = writeln!(out, "engine_failures_total {{engine=\"{}\"}} {}", engine, count);
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub recognitions_total: usize,
    pub recognitions_empty: usize,
    pub engine_calls: Vec<(String, usize)>,
    pub engine_failures: Vec<(String, usize)>,
    pub identification_calls: usize,
    pub identification_fallbacks: usize,
    pub batches_accepted: usize,
    pub batches_fallback: usize,
    pub sequential_calls: usize,
    pub sequential_failures: usize,
    pub translate_latency_avg_ms: u64,
    pub translate_latency_p95_ms: u64,
    pub temporary_translators_opened: usize,
    pub temporary_translators_closed: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub pages_processed: usize,
    pub page_latency_avg_ms: u64,
    pub page_latency_p95_ms: u64,
    pub endpoint_requests: Vec<(String, usize)>,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

fn bump(counters: &DashMap<String, AtomicUsize>, key: &str) {
    counters
        .entry(key.to_string())
        .or_insert_with(|| AtomicUsize::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn collect_counters(counters: &DashMap<String, AtomicUsize>) -> Vec<(String, usize)> {
    let mut values: Vec<_> = counters
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
        .collect();
    values.sort();
    values
}

/// Keep only the most recent samples
fn push_sample(samples: &RwLock<VecDeque<u64>>, duration: Duration) {
    let mut samples = samples.write();
    if samples.len() >= LATENCY_WINDOW {
        samples.pop_front();
    }
    samples.push_back(duration.as_millis() as u64);
}

fn percentile(values: &VecDeque<u64>, p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = values.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((sorted.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &VecDeque<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
