use std::{path::Path, process, sync::Arc};

use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vellum::{
    application::{
        error::AppError,
        reconciler::{ConfigReconciler, ExportRequest, ReconcilerConfig},
        repos::{CollectionSource, EntityStore, InfrastructureSource, SettingsStore},
        settings_import::{Conflict, detect_conflicts, normalize_snapshot},
    },
    cache::{CacheConfig, CacheMetrics, SettingsCache},
    config::{self, Command, SettingsCommand},
    infra::{
        collections::FsCollectionSource, db::PostgresRepositories, error::InfraError,
        private_config::PrivateConfigFile, telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::validation(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;
    let repositories = init_repositories(&settings).await?;

    match cli_args.command {
        Command::Status => run_status(&settings, repositories).await,
        Command::Export(args) => {
            let request = ExportRequest { uuids: args.uuids };
            run_export(&settings, repositories, request).await
        }
        Command::Import => run_import(&settings, repositories).await,
        Command::Restore(args) => run_restore(&settings, repositories, &args.dir).await,
        Command::Settings(args) => match args.command {
            SettingsCommand::Show(show) => {
                run_settings_show(&settings, repositories, show.metrics).await
            }
            SettingsCommand::Import(import) => {
                run_settings_import(&settings, repositories, &import.file).await
            }
        },
    }
}

async fn run_status(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> Result<(), AppError> {
    let status = build_reconciler(settings, repositories).get_status().await?;
    print_json(&status)
}

async fn run_export(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    request: ExportRequest,
) -> Result<(), AppError> {
    let dir = build_reconciler(settings, repositories)
        .perform_export(&request)
        .await?;
    println!("{}", dir.display());
    Ok(())
}

async fn run_import(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> Result<(), AppError> {
    let report = build_reconciler(settings, repositories)
        .perform_import(None)
        .await?;
    print_json(&report)?;

    let failed = report.failed().count();
    if failed > 0 {
        return Err(AppError::unexpected(format!(
            "{failed} configuration entities failed to import"
        )));
    }
    Ok(())
}

async fn run_restore(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    dir: &Path,
) -> Result<(), AppError> {
    info!(dir = %dir.display(), "Restoring configuration export");
    let report = build_reconciler(settings, repositories)
        .restore_export(dir)
        .await?;
    print_json(&report)?;

    let failed = report.failed().count();
    if failed > 0 {
        return Err(AppError::unexpected(format!(
            "{failed} exported documents failed to restore"
        )));
    }
    Ok(())
}

async fn run_settings_show(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    with_metrics: bool,
) -> Result<(), AppError> {
    let metrics = Arc::new(CacheMetrics::new(&CacheConfig::from(&settings.cache)));
    let cache = build_settings_cache(settings, repositories, metrics.clone());

    let all = cache.get_all_settings().await?;
    print_json(&all)?;

    if with_metrics {
        print!("{}", metrics.export_prometheus());
    }
    Ok(())
}

#[derive(Serialize)]
struct SettingsImportSummary<'a> {
    written: usize,
    conflicts: &'a [Conflict],
}

async fn run_settings_import(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    file: &Path,
) -> Result<(), AppError> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(InfraError::from)?;
    let snapshot: serde_json::Value = serde_json::from_str(&raw).map_err(InfraError::from)?;
    let incoming = normalize_snapshot(&snapshot)?;

    let metrics = Arc::new(CacheMetrics::new(&CacheConfig::from(&settings.cache)));
    let cache = build_settings_cache(settings, repositories, metrics);

    let current = cache.get_all_settings().await?;
    let conflicts = detect_conflicts(&current, &incoming, cache.schema());
    for conflict in &conflicts {
        warn!(
            key = %conflict.key,
            recommendation = ?conflict.recommendation,
            "Imported setting overwrites a different value"
        );
    }

    let written = cache.update_settings_from_snapshot(&snapshot).await?;
    info!(written, conflicts = conflicts.len(), "Settings snapshot applied");

    print_json(&SettingsImportSummary {
        written,
        conflicts: &conflicts,
    })
}

fn build_reconciler(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> ConfigReconciler {
    let source: Arc<dyn CollectionSource> = Arc::new(FsCollectionSource::new(
        settings.paths.collections_dir.clone(),
        settings.reconciler.entity_type.clone(),
    ));
    let entities: Arc<dyn EntityStore> = repositories.clone();
    let settings_store: Arc<dyn SettingsStore> = repositories;

    ConfigReconciler::new(
        source,
        entities,
        settings_store,
        ReconcilerConfig::from(settings),
    )
}

fn build_settings_cache(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    metrics: Arc<CacheMetrics>,
) -> SettingsCache {
    let store: Arc<dyn SettingsStore> = repositories;
    let infrastructure: Arc<dyn InfrastructureSource> = Arc::new(PrivateConfigFile::new(
        settings.paths.private_config.clone(),
    ));

    SettingsCache::new(store, infrastructure, CacheConfig::from(&settings.cache))
        .with_metrics(metrics)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(repositories))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(InfraError::from)?;
    println!("{rendered}");
    Ok(())
}
