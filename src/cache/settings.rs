//! Process-wide settings cache.
//!
//! Settings are read from three places: the static infrastructure
//! configuration, dynamic private settings in the database, and public
//! settings in the database. Async accessors load on demand; the `_sync`
//! accessors only ever read what is already in memory and return `None`
//! before the first load.
//!
//! Loads capture a generation number before touching the store and only
//! commit if no invalidation happened in the meantime, so an in-flight load
//! can never resurrect data that was invalidated under it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use metrics::histogram;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::application::error::AppError;
use crate::application::repos::{InfrastructureSource, SettingWrite, SettingsStore};
use crate::application::settings_import::normalize_snapshot;
use crate::domain::settings::{SettingScope, SettingsMap, SettingsSchema, VERSION_KEY};

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};
use super::metrics::CacheMetrics;

const SOURCE: &str = "cache::settings";
const CATEGORY: &str = "settings";

pub const METRIC_SETTINGS_LOAD_MS: &str = "vellum_settings_load_ms";

/// Both scopes as returned by a load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadedSettings {
    pub private: SettingsMap,
    pub public: SettingsMap,
}

impl LoadedSettings {
    pub fn scope(&self, scope: SettingScope) -> &SettingsMap {
        match scope {
            SettingScope::Public => &self.public,
            SettingScope::Private => &self.private,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    loaded: bool,
    loaded_at: Option<Instant>,
    private: SettingsMap,
    public: SettingsMap,
}

pub struct SettingsCache {
    store: Arc<dyn SettingsStore>,
    infrastructure: Arc<dyn InfrastructureSource>,
    schema: SettingsSchema,
    config: CacheConfig,
    state: RwLock<CacheState>,
    provided_infrastructure: RwLock<Option<SettingsMap>>,
    generation: AtomicU64,
    version: OnceCell<String>,
    metrics: Option<Arc<CacheMetrics>>,
}

impl SettingsCache {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        infrastructure: Arc<dyn InfrastructureSource>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            infrastructure,
            schema: SettingsSchema::default(),
            config,
            state: RwLock::new(CacheState::default()),
            provided_infrastructure: RwLock::new(None),
            generation: AtomicU64::new(0),
            version: OnceCell::new(),
            metrics: None,
        }
    }

    pub fn with_schema(mut self, schema: SettingsSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pin the version string instead of the crate version.
    pub fn with_version(self, version: impl Into<String>) -> Self {
        let _ = self.version.set(version.into());
        self
    }

    pub fn schema(&self) -> &SettingsSchema {
        &self.schema
    }

    /// Running package version; resolved once per process.
    pub fn version(&self) -> &str {
        self.version
            .get_or_init(|| env!("CARGO_PKG_VERSION").to_string())
    }

    pub fn is_loaded(&self) -> bool {
        rw_read(&self.state, SOURCE, "is_loaded").loaded
    }

    /// Load both scopes unless a fresh copy is already cached.
    ///
    /// Fails only when the public settings cannot be fetched; dynamic
    /// private settings and the infrastructure configuration degrade to
    /// empty maps.
    pub async fn load_settings_cache(&self) -> Result<LoadedSettings, AppError> {
        if let Some(current) = self.fresh_copy() {
            return Ok(current);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let started = Instant::now();

        let mut public = match self
            .store
            .get_many(self.schema.public_keys(), SettingScope::Public)
            .await
        {
            Ok(map) => map,
            Err(err) => {
                if err.is_unavailable() {
                    trace!(
                        error = %err,
                        "Settings store unavailable; assuming first-time setup"
                    );
                } else {
                    error!(error = %err, "Failed to load public settings");
                }
                self.restore_version();
                return Err(err.into());
            }
        };

        let dynamic_keys = self.schema.dynamic_private_keys();
        let dynamic_private = match self
            .store
            .get_many(&dynamic_keys, SettingScope::Private)
            .await
        {
            Ok(map) => map,
            Err(err) => {
                warn!(
                    error = %err,
                    "Failed to load dynamic private settings; using infrastructure only"
                );
                SettingsMap::new()
            }
        };

        let mut private = self.infrastructure_config().await;
        private.extend(dynamic_private);
        public.insert(
            VERSION_KEY.to_string(),
            Value::String(self.version().to_string()),
        );

        let loaded = LoadedSettings { private, public };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_SETTINGS_LOAD_MS).record(elapsed_ms);
        self.commit(generation, &loaded);

        debug!(
            public_keys = loaded.public.len(),
            private_keys = loaded.private.len(),
            elapsed_ms,
            "Settings loaded"
        );
        Ok(loaded)
    }

    /// Drop cached settings. The version entry survives.
    pub fn invalidate(&self) {
        {
            let mut state = rw_write(&self.state, SOURCE, "invalidate");
            self.generation.fetch_add(1, Ordering::SeqCst);
            state.loaded = false;
            state.loaded_at = None;
            state.private.clear();
            state.public.retain(|key, _| key == VERSION_KEY);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_clear("settings:*", CATEGORY, None);
        }
        debug!("Settings cache invalidated");
    }

    /// Replace both scopes directly and mark the cache as loaded.
    pub fn set_settings_cache(&self, private: SettingsMap, mut public: SettingsMap) {
        public.insert(
            VERSION_KEY.to_string(),
            Value::String(self.version().to_string()),
        );
        {
            let mut state = rw_write(&self.state, SOURCE, "set_settings_cache");
            self.generation.fetch_add(1, Ordering::SeqCst);
            state.loaded = true;
            state.loaded_at = Some(Instant::now());
            state.private = private;
            state.public = public;
        }

        if let Some(metrics) = &self.metrics {
            let ttl = self.config.settings_ttl_seconds.unwrap_or(0);
            metrics.record_set("settings:*", CATEGORY, ttl, None);
        }
    }

    /// Supply infrastructure settings from memory, taking precedence over
    /// the static configuration source on subsequent loads.
    pub fn provide_infrastructure(&self, settings: SettingsMap) {
        *rw_write(&self.provided_infrastructure, SOURCE, "provide_infrastructure") =
            Some(settings);
    }

    pub async fn get_private_setting(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.read_scope(SettingScope::Private, key).await
    }

    pub async fn get_public_setting(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.read_scope(SettingScope::Public, key).await
    }

    /// Cached private value without loading. `None` until the first load.
    pub fn get_private_setting_sync(&self, key: &str) -> Option<Value> {
        rw_read(&self.state, SOURCE, "get_private_setting_sync")
            .private
            .get(key)
            .cloned()
    }

    /// Cached public value without loading. `None` until the first load,
    /// except for the version entry once it has been resolved.
    pub fn get_public_setting_sync(&self, key: &str) -> Option<Value> {
        rw_read(&self.state, SOURCE, "get_public_setting_sync")
            .public
            .get(key)
            .cloned()
    }

    /// Look up a key outside the known schema. Public wins unless a scope
    /// is given.
    pub async fn get_untyped_setting(
        &self,
        key: &str,
        scope: Option<SettingScope>,
    ) -> Result<Option<Value>, AppError> {
        let settings = self.current().await?;
        let value = match scope {
            Some(scope) => settings.scope(scope).get(key),
            None => settings
                .public
                .get(key)
                .or_else(|| settings.private.get(key)),
        };
        Ok(value.cloned())
    }

    /// Shallow merge of both scopes; private entries win on a clash.
    pub async fn get_all_settings(&self) -> Result<SettingsMap, AppError> {
        let settings = self.current().await?;
        let mut merged = settings.public;
        merged.extend(settings.private);
        Ok(merged)
    }

    /// Persist a settings snapshot and invalidate.
    ///
    /// Each key goes to the public scope when it is a known public key and
    /// to the private scope otherwise. An empty snapshot writes nothing and
    /// leaves the cache untouched.
    pub async fn update_settings_from_snapshot(&self, snapshot: &Value) -> Result<usize, AppError> {
        let entries = normalize_snapshot(snapshot)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let writes: Vec<SettingWrite> = entries
            .into_iter()
            .map(|(key, value)| SettingWrite {
                scope: self.schema.scope_of(&key),
                key,
                value,
            })
            .collect();
        let written = writes.len();

        self.store.set_many(writes).await?;
        self.invalidate();
        Ok(written)
    }

    async fn read_scope(&self, scope: SettingScope, key: &str) -> Result<Option<Value>, AppError> {
        let started = Instant::now();
        if let Some(value) = self.read_fresh(scope, key) {
            self.record_lookup(true, key, started);
            return Ok(value);
        }

        let loaded = self.load_settings_cache().await?;
        self.record_lookup(false, key, started);
        Ok(loaded.scope(scope).get(key).cloned())
    }

    async fn current(&self) -> Result<LoadedSettings, AppError> {
        match self.fresh_copy() {
            Some(settings) => Ok(settings),
            None => self.load_settings_cache().await,
        }
    }

    /// `Some` with the cached lookup result when the cache is fresh.
    fn read_fresh(&self, scope: SettingScope, key: &str) -> Option<Option<Value>> {
        let state = rw_read(&self.state, SOURCE, "read_fresh");
        if !self.is_fresh(&state) {
            return None;
        }
        let map = match scope {
            SettingScope::Public => &state.public,
            SettingScope::Private => &state.private,
        };
        Some(map.get(key).cloned())
    }

    fn fresh_copy(&self) -> Option<LoadedSettings> {
        let state = rw_read(&self.state, SOURCE, "fresh_copy");
        self.is_fresh(&state).then(|| LoadedSettings {
            private: state.private.clone(),
            public: state.public.clone(),
        })
    }

    fn is_fresh(&self, state: &CacheState) -> bool {
        if !state.loaded {
            return false;
        }
        match (self.config.settings_ttl(), state.loaded_at) {
            (Some(ttl), Some(loaded_at)) => loaded_at.elapsed() < ttl,
            _ => true,
        }
    }

    fn commit(&self, generation: u64, loaded: &LoadedSettings) {
        let mut state = rw_write(&self.state, SOURCE, "commit");
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding settings load superseded by invalidation");
            return;
        }
        state.loaded = true;
        state.loaded_at = Some(Instant::now());
        state.private = loaded.private.clone();
        state.public = loaded.public.clone();
    }

    fn restore_version(&self) {
        let version = Value::String(self.version().to_string());
        rw_write(&self.state, SOURCE, "restore_version")
            .public
            .entry(VERSION_KEY.to_string())
            .or_insert(version);
    }

    async fn infrastructure_config(&self) -> SettingsMap {
        let provided = rw_read(&self.provided_infrastructure, SOURCE, "infrastructure").clone();
        if let Some(provided) = provided {
            return provided;
        }

        match self.infrastructure.load().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!(
                    "No private configuration found; continuing without infrastructure settings"
                );
                SettingsMap::new()
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "Failed to read private configuration; continuing without it"
                );
                SettingsMap::new()
            }
        }
    }

    fn record_lookup(&self, hit: bool, key: &str, started: Instant) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let elapsed_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        if hit {
            metrics.record_hit(key, CATEGORY, None, elapsed_ms);
        } else {
            metrics.record_miss(key, CATEGORY, None, elapsed_ms);
        }
    }
}
