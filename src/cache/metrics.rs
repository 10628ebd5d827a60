//! Cache effectiveness metrics.
//!
//! `CacheMetrics` keeps running counters (global, per category, per tenant)
//! and a bounded event log. Snapshots are computed on demand from a copy of
//! the counters taken under the lock. Every event is also mirrored to the
//! `metrics` facade so an installed recorder sees the same traffic.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Mutex;

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use super::config::CacheConfig;
use super::events::{CacheEvent, EventKind, EventLog};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::metrics";

pub const METRIC_CACHE_HIT_TOTAL: &str = "vellum_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "vellum_cache_miss_total";
pub const METRIC_CACHE_SET_TOTAL: &str = "vellum_cache_set_total";
pub const METRIC_CACHE_DELETE_TOTAL: &str = "vellum_cache_delete_total";
pub const METRIC_CACHE_CLEAR_TOTAL: &str = "vellum_cache_clear_total";

/// Default number of events returned by [`CacheMetrics::recent_events`].
pub const DEFAULT_RECENT_EVENTS: usize = 50;

#[derive(Debug, Clone, Default)]
struct CategoryCounters {
    hits: u64,
    misses: u64,
    ttl_sum: u128,
    ttl_count: u64,
}

#[derive(Debug, Clone, Default)]
struct TenantCounters {
    hits: u64,
    misses: u64,
}

#[derive(Debug)]
struct MetricsState {
    hits: u64,
    misses: u64,
    response_time_sum_ms: f64,
    response_time_samples: u64,
    categories: HashMap<String, CategoryCounters>,
    tenants: HashMap<String, TenantCounters>,
    events: EventLog,
}

impl MetricsState {
    fn new(config: &CacheConfig) -> Self {
        Self {
            hits: 0,
            misses: 0,
            response_time_sum_ms: 0.0,
            response_time_samples: 0,
            categories: HashMap::new(),
            tenants: HashMap::new(),
            events: EventLog::new(config.event_log_capacity_non_zero()),
        }
    }
}

/// Counters copied out of the lock for snapshot computation.
struct Counters {
    hits: u64,
    misses: u64,
    response_time_sum_ms: f64,
    response_time_samples: u64,
    categories: Vec<(String, CategoryCounters)>,
    tenants: Vec<(String, TenantCounters)>,
}

/// Process-wide cache metrics collector.
pub struct CacheMetrics {
    state: Mutex<MetricsState>,
}

impl CacheMetrics {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(MetricsState::new(config)),
        }
    }

    pub fn record_hit(
        &self,
        key: &str,
        category: &str,
        tenant_id: Option<&str>,
        response_time_ms: Option<f64>,
    ) {
        self.record_lookup(EventKind::Hit, key, category, tenant_id, response_time_ms);
    }

    pub fn record_miss(
        &self,
        key: &str,
        category: &str,
        tenant_id: Option<&str>,
        response_time_ms: Option<f64>,
    ) {
        self.record_lookup(EventKind::Miss, key, category, tenant_id, response_time_ms);
    }

    fn record_lookup(
        &self,
        kind: EventKind,
        key: &str,
        category: &str,
        tenant_id: Option<&str>,
        response_time_ms: Option<f64>,
    ) {
        let hit = kind == EventKind::Hit;
        let event =
            CacheEvent::new(kind, key, category, tenant_id).with_response_time(response_time_ms);

        {
            let mut state = mutex_lock(&self.state, SOURCE, "record_lookup");
            if hit {
                state.hits += 1;
            } else {
                state.misses += 1;
            }

            if let Some(elapsed) = response_time_ms {
                state.response_time_sum_ms += elapsed;
                state.response_time_samples += 1;
            }

            let entry = state.categories.entry(category.to_string()).or_default();
            if hit {
                entry.hits += 1;
            } else {
                entry.misses += 1;
            }

            if let Some(tenant) = tenant_id {
                let entry = state.tenants.entry(tenant.to_string()).or_default();
                if hit {
                    entry.hits += 1;
                } else {
                    entry.misses += 1;
                }
            }

            state.events.push(event);
        }

        let metric = if hit {
            METRIC_CACHE_HIT_TOTAL
        } else {
            METRIC_CACHE_MISS_TOTAL
        };
        counter!(metric, "category" => category.to_string()).increment(1);
    }

    /// Record a write; only the category's average TTL is affected.
    pub fn record_set(
        &self,
        key: &str,
        category: &str,
        ttl_seconds: u64,
        tenant_id: Option<&str>,
    ) {
        let event = CacheEvent::new(EventKind::Set, key, category, tenant_id).with_ttl(ttl_seconds);
        {
            let mut state = mutex_lock(&self.state, SOURCE, "record_set");
            let entry = state.categories.entry(category.to_string()).or_default();
            entry.ttl_sum += u128::from(ttl_seconds);
            entry.ttl_count = entry.ttl_count.saturating_add(1);
            state.events.push(event);
        }
        counter!(METRIC_CACHE_SET_TOTAL, "category" => category.to_string()).increment(1);
    }

    pub fn record_delete(&self, key: &str, category: &str, tenant_id: Option<&str>) {
        self.log_only(EventKind::Delete, key, category, tenant_id);
        counter!(METRIC_CACHE_DELETE_TOTAL, "category" => category.to_string()).increment(1);
    }

    pub fn record_clear(&self, pattern: &str, category: &str, tenant_id: Option<&str>) {
        self.log_only(EventKind::Clear, pattern, category, tenant_id);
        counter!(METRIC_CACHE_CLEAR_TOTAL, "category" => category.to_string()).increment(1);
    }

    fn log_only(&self, kind: EventKind, key: &str, category: &str, tenant_id: Option<&str>) {
        let event = CacheEvent::new(kind, key, category, tenant_id);
        mutex_lock(&self.state, SOURCE, kind.as_str())
            .events
            .push(event);
    }

    /// Point-in-time view of the counters. Does not modify any state.
    pub fn snapshot(&self) -> CacheMetricSnapshot {
        let counters = {
            let state = mutex_lock(&self.state, SOURCE, "snapshot");
            Counters {
                hits: state.hits,
                misses: state.misses,
                response_time_sum_ms: state.response_time_sum_ms,
                response_time_samples: state.response_time_samples,
                categories: state
                    .categories
                    .iter()
                    .map(|(name, counters)| (name.clone(), counters.clone()))
                    .collect(),
                tenants: state
                    .tenants
                    .iter()
                    .map(|(name, counters)| (name.clone(), counters.clone()))
                    .collect(),
            }
        };

        CacheMetricSnapshot::from_counters(counters)
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<CacheEvent> {
        mutex_lock(&self.state, SOURCE, "recent_events")
            .events
            .recent(limit)
    }

    /// Zero every counter and drop the event log.
    pub fn reset(&self) {
        let discarded_events = {
            let mut state = mutex_lock(&self.state, SOURCE, "reset");
            let discarded = state.events.len();
            state.hits = 0;
            state.misses = 0;
            state.response_time_sum_ms = 0.0;
            state.response_time_samples = 0;
            state.categories.clear();
            state.tenants.clear();
            state.events.clear();
            discarded
        };

        info!(discarded_events, "Cache metrics reset");
    }

    /// Current snapshot in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        self.snapshot().to_prometheus()
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_ttl_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetricSnapshot {
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub by_category: BTreeMap<String, CategoryMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_tenant: Option<BTreeMap<String, TenantMetrics>>,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub timestamp: OffsetDateTime,
}

impl CacheMetricSnapshot {
    fn from_counters(counters: Counters) -> Self {
        let by_category = counters
            .categories
            .into_iter()
            .map(|(name, c)| {
                let metrics = CategoryMetrics {
                    hits: c.hits,
                    misses: c.misses,
                    hit_rate: ratio(c.hits as f64, c.hits + c.misses),
                    avg_ttl_seconds: ratio(c.ttl_sum as f64, c.ttl_count),
                };
                (name, metrics)
            })
            .collect();

        let by_tenant = (!counters.tenants.is_empty()).then(|| {
            counters
                .tenants
                .into_iter()
                .map(|(name, t)| {
                    let metrics = TenantMetrics {
                        hits: t.hits,
                        misses: t.misses,
                        hit_rate: ratio(t.hits as f64, t.hits + t.misses),
                    };
                    (name, metrics)
                })
                .collect()
        });

        let total_requests = counters.hits + counters.misses;
        Self {
            total_hits: counters.hits,
            total_misses: counters.misses,
            total_requests,
            hit_rate: ratio(counters.hits as f64, total_requests),
            avg_response_time_ms: ratio(
                counters.response_time_sum_ms,
                counters.response_time_samples,
            ),
            by_category,
            by_tenant,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Render as Prometheus text exposition. Rates use four decimals,
    /// response times two.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        push_metric(
            &mut out,
            "cache_hit_rate",
            "gauge",
            "Cache hit rate (0-1)",
            &[(String::new(), format!("{:.4}", self.hit_rate))],
        );
        push_metric(
            &mut out,
            "cache_hits_total",
            "counter",
            "Total number of cache hits",
            &[(String::new(), self.total_hits.to_string())],
        );
        push_metric(
            &mut out,
            "cache_misses_total",
            "counter",
            "Total number of cache misses",
            &[(String::new(), self.total_misses.to_string())],
        );
        push_metric(
            &mut out,
            "cache_avg_response_time_ms",
            "gauge",
            "Average cache response time in milliseconds",
            &[(String::new(), format!("{:.2}", self.avg_response_time_ms))],
        );

        if !self.by_category.is_empty() {
            let samples: Vec<(String, String)> = self
                .by_category
                .iter()
                .map(|(name, metrics)| {
                    (
                        format!("{{category=\"{}\"}}", escape_label(name)),
                        format!("{:.4}", metrics.hit_rate),
                    )
                })
                .collect();
            push_metric(
                &mut out,
                "cache_category_hit_rate",
                "gauge",
                "Cache hit rate per category (0-1)",
                &samples,
            );
        }

        out
    }
}

fn push_metric(
    out: &mut String,
    name: &str,
    kind: &str,
    help: &str,
    samples: &[(String, String)],
) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    for (labels, value) in samples {
        let _ = writeln!(out, "{name}{labels} {value}");
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}
