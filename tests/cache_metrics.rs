use std::collections::BTreeMap;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use vellum::cache::{
    CacheConfig, CacheMetrics, EventKind, METRIC_CACHE_CLEAR_TOTAL, METRIC_CACHE_HIT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_SET_TOTAL,
};

#[test]
fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let metrics = CacheMetrics::new(&CacheConfig::default());

    metrics::with_local_recorder(&recorder, || {
        metrics.record_hit("SITE_NAME", "settings", None, Some(0.4));
        metrics.record_hit("SITE_NAME", "settings", None, None);
        metrics.record_miss("query:posts", "query", None, None);
        metrics.record_set("settings:all", "settings", 300, None);
        metrics.record_clear("settings:*", "settings", None);
    });

    let mut counters: BTreeMap<(String, String), u64> = BTreeMap::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let key = composite_key.key();
        let category = key
            .labels()
            .find(|label| label.key() == "category")
            .map(|label| label.value().to_string())
            .unwrap_or_default();
        if let DebugValue::Counter(count) = value {
            counters.insert((key.name().to_string(), category), count);
        }
    }

    let expected = [
        (METRIC_CACHE_HIT_TOTAL, "settings", 2),
        (METRIC_CACHE_MISS_TOTAL, "query", 1),
        (METRIC_CACHE_SET_TOTAL, "settings", 1),
        (METRIC_CACHE_CLEAR_TOTAL, "settings", 1),
    ];
    for (name, category, count) in expected {
        assert_eq!(
            counters.get(&(name.to_string(), category.to_string())),
            Some(&count),
            "unexpected value for {name}{{category={category}}}"
        );
    }
}

#[test]
fn tenant_breakdown_follows_recorded_lookups() {
    let metrics = CacheMetrics::default();
    metrics.record_hit("k", "posts", Some("t1"), None);
    metrics.record_miss("k", "posts", Some("t1"), None);
    metrics.record_hit("k", "posts", Some("t2"), None);
    metrics.record_hit("k", "posts", None, None);

    let snapshot = metrics.snapshot();
    let tenants = snapshot.by_tenant.expect("tenants recorded");
    assert_eq!(tenants.len(), 2);
    assert_eq!(tenants["t1"].hits, 1);
    assert_eq!(tenants["t1"].misses, 1);
    assert!((tenants["t1"].hit_rate - 0.5).abs() < f64::EPSILON);
    assert!((tenants["t2"].hit_rate - 1.0).abs() < f64::EPSILON);

    assert_eq!(snapshot.total_hits, 3);
    assert_eq!(snapshot.total_requests, 4);
    assert!((snapshot.hit_rate - 0.75).abs() < f64::EPSILON);
}

#[test]
fn event_log_keeps_only_the_newest_entries() {
    let metrics = CacheMetrics::new(&CacheConfig::default());
    for index in 0..101 {
        metrics.record_miss(&format!("key-{index}"), "settings", None, None);
    }

    let events = metrics.recent_events(usize::MAX);
    assert_eq!(events.len(), 100);
    assert_eq!(events.first().map(|event| event.key.as_str()), Some("key-1"));
    assert_eq!(events.last().map(|event| event.key.as_str()), Some("key-100"));
    assert!(events.iter().all(|event| event.kind == EventKind::Miss));

    metrics.reset();
    assert!(metrics.recent_events(usize::MAX).is_empty());
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_requests, 0);
    assert!(snapshot.by_category.is_empty());
    assert!(snapshot.by_tenant.is_none());
}

#[test]
fn snapshot_serializes_with_camel_case_fields() {
    let metrics = CacheMetrics::default();
    metrics.record_hit("k", "settings", None, Some(2.0));

    let value = serde_json::to_value(metrics.snapshot()).expect("serialize snapshot");
    assert_eq!(value["totalHits"], 1);
    assert_eq!(value["byCategory"]["settings"]["hitRate"], 1.0);
    assert!(value.get("byTenant").is_none());
    assert!(value["timestamp"].is_string());
}
