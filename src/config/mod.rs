//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, ExportArgs, GlobalOverrides, RestoreArgs, SettingsArgs, SettingsCommand,
    SettingsImportArgs, SettingsShowArgs,
};

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vellum";
const ENV_PREFIX: &str = "VELLUM";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_COLLECTIONS_DIR: &str = "config/collections";
const DEFAULT_EXPORT_ROOT: &str = "config/backup";
const DEFAULT_PRIVATE_CONFIG: &str = "config/private.toml";
const DEFAULT_EVENT_LOG_CAPACITY: usize = 100;
const DEFAULT_STREAM_THRESHOLD: usize = 10_000;
const DEFAULT_ENTITY_TYPE: &str = "collections";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub paths: PathSettings,
    pub cache: CacheSettings,
    pub reconciler: ReconcilerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub collections_dir: PathBuf,
    pub export_root: PathBuf,
    pub private_config: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub event_log_capacity: NonZeroUsize,
    pub settings_ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Entity type the collection definitions describe.
    pub entity_type: String,
    pub stream_threshold: NonZeroUsize,
    pub exportable_collections: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("reconciler.exportable_collections"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    paths: RawPathSettings,
    cache: RawCacheSettings,
    reconciler: RawReconcilerSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dir) = overrides.collections_dir.as_ref() {
            self.paths.collections_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.export_root.as_ref() {
            self.paths.export_root = Some(dir.clone());
        }
        if let Some(path) = overrides.private_config.as_ref() {
            self.paths.private_config = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            paths,
            cache,
            reconciler,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            paths: build_path_settings(paths)?,
            cache: build_cache_settings(cache)?,
            reconciler: build_reconciler_settings(reconciler)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS.into()),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_path_settings(paths: RawPathSettings) -> Result<PathSettings, LoadError> {
    Ok(PathSettings {
        collections_dir: non_empty_path(
            paths.collections_dir,
            DEFAULT_COLLECTIONS_DIR,
            "paths.collections_dir",
        )?,
        export_root: non_empty_path(paths.export_root, DEFAULT_EXPORT_ROOT, "paths.export_root")?,
        private_config: non_empty_path(
            paths.private_config,
            DEFAULT_PRIVATE_CONFIG,
            "paths.private_config",
        )?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let event_log_capacity = non_zero_usize(
        cache.event_log_capacity.unwrap_or(DEFAULT_EVENT_LOG_CAPACITY as u64),
        "cache.event_log_capacity",
    )?;

    let settings_ttl = match cache.settings_ttl_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.settings_ttl_seconds",
                "must be greater than zero; omit it to disable expiry",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(CacheSettings {
        event_log_capacity,
        settings_ttl,
    })
}

fn build_reconciler_settings(
    reconciler: RawReconcilerSettings,
) -> Result<ReconcilerSettings, LoadError> {
    let entity_type = reconciler
        .entity_type
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string());
    validate_collection_name(&entity_type, "reconciler.entity_type")?;

    let stream_threshold = non_zero_usize(
        reconciler
            .stream_threshold
            .unwrap_or(DEFAULT_STREAM_THRESHOLD as u64),
        "reconciler.stream_threshold",
    )?;

    let exportable_collections = reconciler
        .exportable_collections
        .unwrap_or_else(|| vec![entity_type.clone()]);
    if exportable_collections.is_empty() {
        return Err(LoadError::invalid(
            "reconciler.exportable_collections",
            "at least one collection is required",
        ));
    }
    for collection in &exportable_collections {
        validate_collection_name(collection, "reconciler.exportable_collections")?;
    }

    Ok(ReconcilerSettings {
        entity_type,
        stream_threshold,
        exportable_collections,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPathSettings {
    collections_dir: Option<PathBuf>,
    export_root: Option<PathBuf>,
    private_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    event_log_capacity: Option<u64>,
    settings_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReconcilerSettings {
    entity_type: Option<String>,
    stream_threshold: Option<u64>,
    exportable_collections: Option<Vec<String>>,
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

/// Collection names double as export file names.
fn validate_collection_name(name: &str, key: &'static str) -> Result<(), LoadError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(LoadError::invalid(
            key,
            format!("`{name}` must be non-empty and use only ASCII letters, digits, `_` or `-`"),
        ));
    }
    Ok(())
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
