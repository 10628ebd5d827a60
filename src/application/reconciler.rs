//! Reconciles declared configuration entities with the database.
//!
//! The source state comes from a [`CollectionSource`], the active state from
//! an [`EntityStore`]. Both are keyed by uuid and compared by content hash.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::error::AppError;
use crate::application::repos::{
    CollectionSource, EntityFilter, EntityStore, RepoError, SettingsStore,
};
use crate::domain::entities::{
    ActiveStateHealth, ConfigChanges, ConfigEntity, ConfigSyncStatus, RequiredSetting, StateMap,
    document_identity,
};
use crate::infra::export::{create_export_dir, read_export_dir, write_json_array};

const DEFAULT_STREAM_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Directory under which `export_<unixMillis>` directories are created.
    pub export_root: PathBuf,
    /// Collections at or above this size are streamed to disk.
    pub stream_threshold: usize,
    pub exportable_collections: Vec<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            export_root: PathBuf::from("config/backup"),
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            exportable_collections: vec!["collections".to_string()],
        }
    }
}

impl From<&crate::config::Settings> for ReconcilerConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            export_root: settings.paths.export_root.clone(),
            stream_threshold: settings.reconciler.stream_threshold.get(),
            exportable_collections: settings.reconciler.exportable_collections.clone(),
        }
    }
}

/// Database side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveState {
    pub entities: StateMap,
    pub health: ActiveStateHealth,
}

#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    /// Restrict the export to these uuids; empty exports everything.
    pub uuids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Upsert,
    Delete,
}

impl ImportAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportAction::Upsert => "upsert",
            ImportAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub uuid: String,
    pub name: String,
    pub action: ImportAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-entity results of an import or restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.error.is_none())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    fn push(
        &mut self,
        uuid: &str,
        name: &str,
        action: ImportAction,
        result: Result<(), RepoError>,
    ) {
        let error = result.err().map(|err| {
            warn!(
                uuid,
                name,
                action = action.as_str(),
                error = %err,
                "Configuration entity import failed"
            );
            err.to_string()
        });
        self.outcomes.push(ImportOutcome {
            uuid: uuid.to_string(),
            name: name.to_string(),
            action,
            error,
        });
    }

    fn log_summary(&self, operation: &'static str) {
        info!(
            operation,
            succeeded = self.succeeded().count(),
            failed = self.failed().count(),
            "Configuration import finished"
        );
    }
}

/// Classify every uuid as new, updated or deleted.
///
/// Entities present on both sides with equal hashes are omitted. The three
/// lists are disjoint and ordered by uuid.
pub fn compare_states(source: &StateMap, active: &StateMap) -> ConfigChanges {
    let mut changes = ConfigChanges::default();

    for (uuid, entity) in source {
        match active.get(uuid) {
            None => changes.new.push(entity.clone()),
            Some(current) if current.hash != entity.hash => changes.updated.push(entity.clone()),
            Some(_) => {}
        }
    }

    changes.deleted = active
        .iter()
        .filter(|(uuid, _)| !source.contains_key(*uuid))
        .map(|(_, entity)| entity.clone())
        .collect();

    changes
}

pub struct ConfigReconciler {
    source: Arc<dyn CollectionSource>,
    entities: Arc<dyn EntityStore>,
    settings: Arc<dyn SettingsStore>,
    config: ReconcilerConfig,
}

impl ConfigReconciler {
    pub fn new(
        source: Arc<dyn CollectionSource>,
        entities: Arc<dyn EntityStore>,
        settings: Arc<dyn SettingsStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            source,
            entities,
            settings,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Diff declared entities against the database. Read-only.
    pub async fn get_status(&self) -> Result<ConfigSyncStatus, AppError> {
        let (source, active) = tokio::join!(self.source_state(), self.active_state());
        let source = source?;
        let active = active?;

        let changes = compare_states(&source, &active.entities);
        let unmet = self.check_for_unmet_requirements(&source).await;

        debug!(
            new = changes.new.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            unmet = unmet.len(),
            "Configuration status computed"
        );
        Ok(ConfigSyncStatus::new(changes, unmet, active.health))
    }

    pub async fn source_state(&self) -> Result<StateMap, AppError> {
        let documents = self.source.collections().await?;
        Ok(index_documents(self.source.entity_type(), documents))
    }

    /// Entities currently stored in the database.
    ///
    /// A failing query degrades to an empty, `Degraded` state. An
    /// unavailable database is an error.
    pub async fn active_state(&self) -> Result<ActiveState, AppError> {
        let entity_type = self.source.entity_type();
        match self.entities.find_many(entity_type, &EntityFilter::All).await {
            Ok(documents) => Ok(ActiveState {
                entities: index_documents(entity_type, documents),
                health: ActiveStateHealth::Verified,
            }),
            Err(err) if err.is_unavailable() => Err(err.into()),
            Err(err) => {
                warn!(
                    entity_type,
                    degraded = true,
                    error = %err,
                    "Active configuration query failed; treating database state as unknown"
                );
                Ok(ActiveState {
                    entities: StateMap::new(),
                    health: ActiveStateHealth::Degraded {
                        reason: err.to_string(),
                    },
                })
            }
        }
    }

    /// Required settings missing from the settings store, one per key,
    /// ordered by key.
    pub async fn check_for_unmet_requirements(&self, source: &StateMap) -> Vec<RequiredSetting> {
        let mut required: BTreeMap<String, RequiredSetting> = BTreeMap::new();
        for requirement in source.values().flat_map(ConfigEntity::required_settings) {
            required.insert(requirement.key.clone(), requirement);
        }

        let checks = required.into_values().map(|requirement| async move {
            match self.settings.get(&requirement.key, None).await {
                Ok(Some(_)) => None,
                Ok(None) => Some(requirement),
                Err(err) => {
                    debug!(
                        key = %requirement.key,
                        error = %err,
                        "Requirement check failed; treating as unmet"
                    );
                    Some(requirement)
                }
            }
        });

        join_all(checks).await.into_iter().flatten().collect()
    }

    /// Write each exportable collection to `<type>.json` in a new export
    /// directory and return that directory.
    pub async fn perform_export(&self, request: &ExportRequest) -> Result<PathBuf, AppError> {
        let dir = create_export_dir(&self.config.export_root).await?;

        let writes = self.config.exportable_collections.iter().map(|collection| {
            let dir = &dir;
            async move {
                let documents = self
                    .entities
                    .find_many(collection, &EntityFilter::All)
                    .await?;
                let documents: Vec<Value> = documents
                    .into_iter()
                    .filter(|document| request.uuids.is_empty() || wanted(document, request))
                    .collect();

                let path = dir.join(format!("{collection}.json"));
                write_json_array(&path, &documents, self.config.stream_threshold).await?;
                Ok::<usize, AppError>(documents.len())
            }
        });
        let counts = try_join_all(writes).await?;

        info!(
            dir = %dir.display(),
            collections = counts.len(),
            entities = counts.iter().sum::<usize>(),
            "Configuration exported"
        );
        Ok(dir)
    }

    /// Apply a diff to the database, computing it first when absent.
    ///
    /// Failures are recorded per entity and do not stop the batch.
    pub async fn perform_import(
        &self,
        changes: Option<ConfigChanges>,
    ) -> Result<ImportReport, AppError> {
        let changes = match changes {
            Some(changes) => changes,
            None => self.get_status().await?.changes,
        };

        let collection = self.source.entity_type();
        let mut report = ImportReport::default();

        for entity in changes.new.iter().chain(&changes.updated) {
            let filter = identity_filter(&entity.entity, &entity.uuid);
            let result = self
                .entities
                .upsert(collection, &filter, entity.entity.clone())
                .await;
            report.push(&entity.uuid, &entity.name, ImportAction::Upsert, result);
        }

        for entity in &changes.deleted {
            let result = self.entities.delete(collection, &entity.uuid).await;
            report.push(&entity.uuid, &entity.name, ImportAction::Delete, result);
        }

        report.log_summary("import");
        Ok(report)
    }

    /// Upsert every document of an export directory into the collection
    /// named after its file.
    pub async fn restore_export(&self, dir: &Path) -> Result<ImportReport, AppError> {
        let mut report = ImportReport::default();

        for (collection, documents) in read_export_dir(dir).await? {
            for document in documents {
                let Some((uuid, name)) = document_identity(&document) else {
                    debug!(collection, "Skipping exported document without identity");
                    continue;
                };
                let filter = identity_filter(&document, &uuid);
                let result = self.entities.upsert(&collection, &filter, document).await;
                report.push(&uuid, &name, ImportAction::Upsert, result);
            }
        }

        report.log_summary("restore");
        Ok(report)
    }
}

fn index_documents(entity_type: &str, documents: Vec<Value>) -> StateMap {
    let mut state = StateMap::new();
    for document in documents {
        match ConfigEntity::from_document(entity_type, document) {
            Some(entity) => {
                let uuid = entity.uuid.clone();
                if state.insert(uuid.clone(), entity).is_some() {
                    warn!(
                        entity_type,
                        uuid = %uuid,
                        "Duplicate configuration entity uuid; keeping the last one"
                    );
                }
            }
            None => debug!(entity_type, "Skipping configuration entity without id or name"),
        }
    }
    state
}

fn wanted(document: &Value, request: &ExportRequest) -> bool {
    document_identity(document).is_some_and(|(uuid, _)| request.uuids.contains(&uuid))
}

/// Natural key used to match an entity in the database: its name when it
/// has one, otherwise the field its uuid came from.
fn identity_filter(document: &Value, uuid: &str) -> EntityFilter {
    for field in ["name", "_id", "uuid"] {
        if let Some(value) = document.get(field) {
            return EntityFilter::field(field, value.clone());
        }
    }
    EntityFilter::field("_id", uuid)
}
