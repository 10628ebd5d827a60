//! Export directory layout: `<root>/export_<unixMillis>/<entityType>.json`,
//! each file a JSON array.

use std::path::{Path, PathBuf};

use serde_json::Value;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::error::InfraError;

const DIR_PREFIX: &str = "export_";

/// Create a fresh timestamped export directory under `root`.
pub async fn create_export_dir(root: &Path) -> Result<PathBuf, InfraError> {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let dir = root.join(format!("{DIR_PREFIX}{millis}"));
    fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// Write `items` as a JSON array to `path`.
///
/// Collections of at least `stream_threshold` items are written one item at
/// a time instead of being encoded into a single buffer first.
pub async fn write_json_array(
    path: &Path,
    items: &[Value],
    stream_threshold: usize,
) -> Result<(), InfraError> {
    if items.len() >= stream_threshold {
        debug!(
            path = %path.display(),
            items = items.len(),
            "Streaming export file"
        );
        return stream_json_array(path, items).await;
    }

    let encoded = serde_json::to_vec_pretty(items)?;
    fs::write(path, encoded).await?;
    Ok(())
}

async fn stream_json_array(path: &Path, items: &[Value]) -> Result<(), InfraError> {
    let file = fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);

    writer.write_all(b"[").await?;
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            writer.write_all(b",").await?;
        }
        writer.write_all(&serde_json::to_vec(item)?).await?;
    }
    writer.write_all(b"]").await?;
    writer.flush().await?;
    Ok(())
}

/// Read every `<entityType>.json` of an export directory, sorted by type.
pub async fn read_export_dir(dir: &Path) -> Result<Vec<(String, Vec<Value>)>, InfraError> {
    let mut paths = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(entity_type) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let raw = fs::read(&path).await?;
        let items: Vec<Value> = serde_json::from_slice(&raw)?;
        files.push((entity_type.to_string(), items));
    }
    Ok(files)
}
