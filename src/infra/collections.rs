//! Collection definitions declared as files on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::application::repos::{CollectionSource, RepoError};

/// Reads every `*.json` and `*.toml` file of a directory, in path order.
///
/// A file holds either one definition or an array of them. A missing
/// directory declares nothing.
#[derive(Debug, Clone)]
pub struct FsCollectionSource {
    dir: PathBuf,
    entity_type: String,
}

impl FsCollectionSource {
    pub fn new(dir: impl Into<PathBuf>, entity_type: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            entity_type: entity_type.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn definition_files(&self) -> Result<Vec<PathBuf>, RepoError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(
                    dir = %self.dir.display(),
                    "Collections directory missing; no definitions"
                );
                return Ok(Vec::new());
            }
            Err(err) => return Err(RepoError::from_persistence(err)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(RepoError::from_persistence)?
        {
            let path = entry.path();
            if file_format(&path).is_some() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Json,
    Toml,
}

fn file_format(path: &Path) -> Option<FileFormat> {
    match path.extension()?.to_str()? {
        "json" => Some(FileFormat::Json),
        "toml" => Some(FileFormat::Toml),
        _ => None,
    }
}

fn parse_definitions(path: &Path, text: &str) -> Result<Vec<Value>, RepoError> {
    let invalid = |reason: String| RepoError::InvalidInput {
        message: format!("{}: {reason}", path.display()),
    };

    let parsed: Value = match file_format(path) {
        Some(FileFormat::Json) => {
            serde_json::from_str(text).map_err(|err| invalid(err.to_string()))?
        }
        Some(FileFormat::Toml) => toml::from_str(text).map_err(|err| invalid(err.to_string()))?,
        None => return Ok(Vec::new()),
    };

    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![parsed]),
        _ => Err(invalid("expected an object or an array of objects".to_string())),
    }
}

#[async_trait]
impl CollectionSource for FsCollectionSource {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    async fn collections(&self) -> Result<Vec<Value>, RepoError> {
        let mut definitions = Vec::new();
        for path in self.definition_files().await? {
            let text = fs::read_to_string(&path)
                .await
                .map_err(RepoError::from_persistence)?;
            definitions.extend(parse_definitions(&path, &text)?);
        }
        Ok(definitions)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn reads_json_and_toml_in_path_order() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("b_posts.json"),
            r#"{"_id": "c2", "name": "Posts", "fields": ["title"]}"#,
        )
        .expect("write");
        std::fs::write(
            dir.path().join("a_pages.toml"),
            "_id = \"c1\"\nname = \"Pages\"\nicon = \"file\"\n",
        )
        .expect("write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let source = FsCollectionSource::new(dir.path(), "collections");
        let found = source.collections().await.expect("collections");

        assert_eq!(source.entity_type(), "collections");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["name"], json!("Pages"));
        assert_eq!(found[1]["fields"], json!(["title"]));
    }

    #[tokio::test]
    async fn array_files_declare_several_definitions() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("all.json"),
            r#"[{"name": "Posts"}, {"name": "Pages"}]"#,
        )
        .expect("write");

        let found = FsCollectionSource::new(dir.path(), "collections")
            .collections()
            .await
            .expect("collections");
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempdir().expect("tempdir");
        let source = FsCollectionSource::new(dir.path().join("absent"), "collections");
        assert!(source.collections().await.expect("collections").is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_rejected() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.json"), "{ nope").expect("write");

        let err = FsCollectionSource::new(dir.path(), "collections")
            .collections()
            .await
            .expect_err("malformed");
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
