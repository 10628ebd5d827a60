//! Static private configuration file.
//!
//! A flat TOML table of infrastructure settings (`DB_HOST = "..."`) read
//! before the database is reachable. The file is absent during first-time
//! setup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::application::repos::{InfrastructureSource, RepoError};
use crate::domain::settings::SettingsMap;

#[derive(Debug, Clone)]
pub struct PrivateConfigFile {
    path: PathBuf,
}

impl PrivateConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InfrastructureSource for PrivateConfigFile {
    async fn load(&self) -> Result<Option<SettingsMap>, RepoError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RepoError::from_persistence(err)),
        };

        toml::from_str::<SettingsMap>(&text)
            .map(Some)
            .map_err(|err| RepoError::InvalidInput {
                message: format!("{}: {err}", self.path.display()),
            })
    }
}
