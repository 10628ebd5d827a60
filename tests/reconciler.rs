use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use vellum::application::reconciler::{ConfigReconciler, ExportRequest, ReconcilerConfig};
use vellum::application::repos::{CollectionSource, EntityStore, SettingsStore};
use vellum::domain::entities::{ActiveStateHealth, SyncState};
use vellum::domain::settings::SettingScope;
use vellum::infra::collections::FsCollectionSource;
use vellum::infra::memory::MemoryRepositories;

const COLLECTIONS: &str = "collections";

fn write_definition(dir: &Path, file: &str, document: &Value) {
    std::fs::create_dir_all(dir).expect("collections dir");
    let text = serde_json::to_string_pretty(document).expect("serialize definition");
    std::fs::write(dir.join(file), text).expect("write definition");
}

fn reconciler(
    collections_dir: &Path,
    export_root: &Path,
    repos: Arc<MemoryRepositories>,
) -> ConfigReconciler {
    let source: Arc<dyn CollectionSource> =
        Arc::new(FsCollectionSource::new(collections_dir, COLLECTIONS));
    let entities: Arc<dyn EntityStore> = repos.clone();
    let settings: Arc<dyn SettingsStore> = repos;

    ConfigReconciler::new(
        source,
        entities,
        settings,
        ReconcilerConfig {
            export_root: export_root.to_path_buf(),
            stream_threshold: 2,
            exportable_collections: vec![COLLECTIONS.to_string()],
        },
    )
}

fn article(id: &str, fields: Value) -> Value {
    json!({"_id": id, "name": id, "fields": fields})
}

#[tokio::test]
async fn declared_and_stored_sets_diff_then_converge() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    write_definition(&collections, "a.json", &article("A", json!(["title"])));
    write_definition(&collections, "b.json", &article("B", json!(["body"])));

    let repos = Arc::new(MemoryRepositories::new());
    repos.insert_document(COLLECTIONS, article("A", json!(["title"])));
    repos.insert_document(COLLECTIONS, article("C", json!(["legacy"])));

    let reconciler = reconciler(&collections, workspace.path(), repos.clone());
    let status = reconciler.get_status().await.expect("status");

    assert_eq!(status.status, SyncState::ChangesDetected);
    assert_eq!(status.active_state, ActiveStateHealth::Verified);
    let new: Vec<_> = status.changes.new.iter().map(|e| e.uuid.as_str()).collect();
    let deleted: Vec<_> = status.changes.deleted.iter().map(|e| e.uuid.as_str()).collect();
    assert_eq!(new, vec!["B"]);
    assert!(status.changes.updated.is_empty());
    assert_eq!(deleted, vec!["C"]);

    let report = reconciler
        .perform_import(Some(status.changes))
        .await
        .expect("import");
    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 2);

    let status = reconciler.get_status().await.expect("status after import");
    assert_eq!(status.status, SyncState::InSync);
    assert!(status.changes.is_empty());
}

#[tokio::test]
async fn change_categories_are_disjoint() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    write_definition(&collections, "a.json", &article("A", json!(["title", "slug"])));
    write_definition(&collections, "b.json", &article("B", json!([])));

    let repos = Arc::new(MemoryRepositories::new());
    repos.insert_document(COLLECTIONS, article("A", json!(["title"])));
    repos.insert_document(COLLECTIONS, article("D", json!([])));

    let status = reconciler(&collections, workspace.path(), repos)
        .get_status()
        .await
        .expect("status");

    let mut seen = BTreeSet::new();
    for entity in status
        .changes
        .new
        .iter()
        .chain(&status.changes.updated)
        .chain(&status.changes.deleted)
    {
        assert!(seen.insert(entity.uuid.clone()), "{} listed twice", entity.uuid);
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(status.changes.updated[0].uuid, "A");
}

#[tokio::test]
async fn unmet_requirements_are_reported_once_per_key() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    write_definition(
        &collections,
        "mailers.json",
        &json!([
            {
                "_id": "newsletter",
                "_requiredSettings": [{"key": "SMTP_HOST"}, {"key": "SMTP_PORT"}]
            },
            {"_id": "digest", "_requiredSettings": [{"key": "SMTP_HOST"}]}
        ]),
    );

    let repos = Arc::new(MemoryRepositories::new());
    repos.insert_setting("SMTP_PORT", SettingScope::Private, json!(587));

    let status = reconciler(&collections, workspace.path(), repos)
        .get_status()
        .await
        .expect("status");

    let keys: Vec<_> = status
        .unmet_requirements
        .iter()
        .map(|requirement| requirement.key.as_str())
        .collect();
    assert_eq!(keys, vec!["SMTP_HOST"]);
}

#[tokio::test]
async fn export_then_restore_reproduces_the_database() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    let export_root = workspace.path().join("backup");
    for id in ["A", "B", "C"] {
        write_definition(&collections, &format!("{id}.json"), &article(id, json!([id])));
    }

    let original = Arc::new(MemoryRepositories::new());
    let first = reconciler(&collections, &export_root, original.clone());
    first.perform_import(None).await.expect("import");
    assert_eq!(first.get_status().await.expect("status").status, SyncState::InSync);

    let dir = first
        .perform_export(&ExportRequest::default())
        .await
        .expect("export");
    assert!(dir.starts_with(&export_root));
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .expect("export dir name");
    assert!(name.starts_with("export_"));

    let restored = Arc::new(MemoryRepositories::new());
    let second = reconciler(&collections, &export_root, restored.clone());
    let report = second.restore_export(&dir).await.expect("restore");
    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 3);

    assert_eq!(restored.documents(COLLECTIONS), original.documents(COLLECTIONS));
    assert_eq!(second.get_status().await.expect("status").status, SyncState::InSync);
}

#[tokio::test]
async fn export_can_be_limited_to_selected_entities() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    let export_root = workspace.path().join("backup");

    let repos = Arc::new(MemoryRepositories::new());
    for id in ["A", "B", "C"] {
        repos.insert_document(COLLECTIONS, article(id, json!([])));
    }

    let dir = reconciler(&collections, &export_root, repos)
        .perform_export(&ExportRequest {
            uuids: vec!["B".to_string()],
        })
        .await
        .expect("export");

    let text = std::fs::read_to_string(dir.join("collections.json")).expect("export file");
    let exported: Vec<Value> = serde_json::from_str(&text).expect("valid export");
    assert_eq!(exported, vec![article("B", json!([]))]);
}

#[tokio::test]
async fn failing_store_degrades_status_instead_of_failing() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    write_definition(&collections, "a.json", &article("A", json!([])));

    let repos = Arc::new(MemoryRepositories::new());
    repos.set_failing(true);

    let status = reconciler(&collections, workspace.path(), repos)
        .get_status()
        .await
        .expect("degraded status");

    assert!(matches!(
        status.active_state,
        ActiveStateHealth::Degraded { .. }
    ));
    assert_eq!(status.changes.new.len(), 1);
}

#[tokio::test]
async fn renamed_entity_converges_to_a_single_document() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let collections = workspace.path().join("collections");
    write_definition(
        &collections,
        "posts.json",
        &json!({"_id": "c1", "name": "Articles"}),
    );

    let repos = Arc::new(MemoryRepositories::new());
    repos.insert_document(COLLECTIONS, json!({"_id": "c1", "name": "Posts"}));

    let reconciler = reconciler(&collections, workspace.path(), repos.clone());
    let status = reconciler.get_status().await.expect("status");
    let updated: Vec<_> = status.changes.updated.iter().map(|e| e.uuid.as_str()).collect();
    assert_eq!(updated, vec!["c1"]);

    let report = reconciler.perform_import(None).await.expect("import");
    assert!(report.is_success());

    assert_eq!(
        repos.documents(COLLECTIONS),
        vec![json!({"_id": "c1", "name": "Articles"})]
    );
    assert_eq!(
        reconciler.get_status().await.expect("status").status,
        SyncState::InSync
    );
}
