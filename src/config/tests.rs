use std::path::Path;

use super::*;

#[test]
fn defaults_apply_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 4);
    assert_eq!(settings.paths.collections_dir, Path::new("config/collections"));
    assert_eq!(settings.paths.export_root, Path::new("config/backup"));
    assert_eq!(settings.paths.private_config, Path::new("config/private.toml"));
    assert_eq!(settings.cache.event_log_capacity.get(), 100);
    assert!(settings.cache.settings_ttl.is_none());
    assert_eq!(settings.reconciler.entity_type, "collections");
    assert_eq!(settings.reconciler.stream_threshold.get(), 10_000);
    assert_eq!(settings.reconciler.exportable_collections, vec!["collections"]);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.database.url = Some("postgres://file".to_string());

    let overrides = GlobalOverrides {
        log_level: Some("debug".to_string()),
        database_url: Some("postgres://cli".to_string()),
        export_root: Some(PathBuf::from("/tmp/exports")),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.database.url.as_deref(), Some("postgres://cli"));
    assert_eq!(settings.paths.export_root, Path::new("/tmp/exports"));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid level");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.event_log_capacity = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "cache.event_log_capacity", .. })
    ));

    let mut raw = RawSettings::default();
    raw.cache.settings_ttl_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "cache.settings_ttl_seconds", .. })
    ));

    let mut raw = RawSettings::default();
    raw.database.max_connections = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid { key: "database.max_connections", .. })
    ));
}

#[test]
fn settings_ttl_converts_to_duration() {
    let mut raw = RawSettings::default();
    raw.cache.settings_ttl_seconds = Some(45);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.settings_ttl, Some(Duration::from_secs(45)));
}

#[test]
fn exportable_collections_follow_entity_type() {
    let mut raw = RawSettings::default();
    raw.reconciler.entity_type = Some("schemas".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.reconciler.exportable_collections, vec!["schemas"]);
}

#[test]
fn collection_names_must_be_file_safe() {
    let mut raw = RawSettings::default();
    raw.reconciler.exportable_collections = Some(vec!["../etc".to_string()]);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.reconciler.exportable_collections = Some(Vec::new());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn config_file_is_layered_under_cli() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vellum-test.toml");
    std::fs::write(
        &path,
        "[cache]\nevent_log_capacity = 25\n\n[reconciler]\nstream_threshold = 500\n",
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "vellum",
        "--config-file",
        path.to_str().expect("utf-8 path"),
        "status",
        "--log-level",
        "warn",
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.cache.event_log_capacity.get(), 25);
    assert_eq!(settings.reconciler.stream_threshold.get(), 500);
    assert_eq!(settings.logging.level, LevelFilter::WARN);
}

#[test]
fn missing_config_file_is_an_error() {
    let args = CliArgs::parse_from([
        "vellum",
        "--config-file",
        "/nonexistent/vellum.toml",
        "status",
    ]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn parse_export_arguments() {
    let args = CliArgs::parse_from(["vellum", "export", "--uuid", "c1", "--uuid", "c2"]);
    match args.command {
        Command::Export(export) => assert_eq!(export.uuids, vec!["c1", "c2"]),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_restore_arguments() {
    let args = CliArgs::parse_from([
        "vellum",
        "restore",
        "--database-url",
        "postgres://example",
        "config/backup/export_1700000000000",
    ]);
    assert_eq!(
        args.overrides.database_url.as_deref(),
        Some("postgres://example")
    );
    match args.command {
        Command::Restore(restore) => {
            assert_eq!(restore.dir, Path::new("config/backup/export_1700000000000"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_settings_subcommands() {
    let args = CliArgs::parse_from(["vellum", "settings", "show", "--metrics"]);
    match args.command {
        Command::Settings(SettingsArgs {
            command: SettingsCommand::Show(show),
        }) => assert!(show.metrics),
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["vellum", "settings", "import", "/tmp/snapshot.json"]);
    match args.command {
        Command::Settings(SettingsArgs {
            command: SettingsCommand::Import(import),
        }) => assert_eq!(import.file, Path::new("/tmp/snapshot.json")),
        _ => panic!("wrong command parsed"),
    }
}
