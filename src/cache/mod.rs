//! Vellum cache layer.
//!
//! - [`CacheMetrics`]: hit/miss accounting, per-category and per-tenant
//!   breakdowns, a bounded event log and Prometheus text export.
//! - [`SettingsCache`]: process-wide public/private settings with async
//!   loading and synchronous reads of the loaded state.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! event_log_capacity = 100
//! # settings_ttl_seconds = 60
//! ```

mod config;
mod events;
pub(crate) mod lock;
mod metrics;
mod settings;

pub use config::CacheConfig;
pub use events::{CacheEvent, EventKind, EventLog};
pub use metrics::{
    CacheMetricSnapshot, CacheMetrics, CategoryMetrics, DEFAULT_RECENT_EVENTS,
    METRIC_CACHE_CLEAR_TOTAL, METRIC_CACHE_DELETE_TOTAL, METRIC_CACHE_HIT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_SET_TOTAL, TenantMetrics,
};
pub use settings::{LoadedSettings, METRIC_SETTINGS_LOAD_MS, SettingsCache};
