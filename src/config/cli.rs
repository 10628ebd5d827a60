use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Vellum binary.
#[derive(Debug, Parser)]
#[command(
    name = "vellum",
    version,
    about = "Configuration reconciliation and settings cache tooling"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "VELLUM_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the configuration sync status as JSON.
    Status,
    /// Export configuration collections to a timestamped directory.
    Export(ExportArgs),
    /// Apply declared configuration to the database.
    Import,
    /// Apply a previous export directory to the database.
    Restore(RestoreArgs),
    /// Inspect or update system settings.
    Settings(SettingsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the directory holding collection definitions.
    #[arg(long = "collections-dir", value_name = "PATH", global = true)]
    pub collections_dir: Option<PathBuf>,

    /// Override the directory exports are written under.
    #[arg(long = "export-root", value_name = "PATH", global = true)]
    pub export_root: Option<PathBuf>,

    /// Override the private configuration file.
    #[arg(long = "private-config", value_name = "PATH", global = true)]
    pub private_config: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ExportArgs {
    /// Only export entities with this uuid; repeatable.
    #[arg(long = "uuid", value_name = "UUID")]
    pub uuids: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RestoreArgs {
    /// Export directory to restore.
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub dir: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SettingsCommand {
    /// Print every loaded setting, private values included.
    Show(SettingsShowArgs),
    /// Write a JSON settings snapshot to the database.
    Import(SettingsImportArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsShowArgs {
    /// Also print cache metrics in Prometheus text format.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub metrics: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SettingsImportArgs {
    /// JSON snapshot, either `{"settings": {...}}` or a flat map.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}
