//! In-process stores for callers without a database, and for tests.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::application::repos::{
    EntityFilter, EntityStore, InfrastructureSource, RepoError, SettingWrite, SettingsStore,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::document_identity;
use crate::domain::settings::{SettingScope, SettingsMap};

const SOURCE: &str = "infra::memory";

/// Settings and entity collections held in memory.
///
/// `set_unavailable` makes every call fail with [`RepoError::Unavailable`];
/// `set_failing` makes every call fail with [`RepoError::Persistence`].
#[derive(Debug, Default)]
pub struct MemoryRepositories {
    settings: RwLock<BTreeMap<String, (SettingScope, Value)>>,
    collections: RwLock<BTreeMap<String, Vec<Value>>>,
    unavailable: AtomicBool,
    failing: AtomicBool,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert_setting(&self, key: &str, scope: SettingScope, value: Value) {
        rw_write(&self.settings, SOURCE, "insert_setting").insert(key.to_string(), (scope, value));
    }

    pub fn setting(&self, key: &str) -> Option<(SettingScope, Value)> {
        rw_read(&self.settings, SOURCE, "setting").get(key).cloned()
    }

    pub fn insert_document(&self, collection: &str, document: Value) {
        rw_write(&self.collections, SOURCE, "insert_document")
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    pub fn documents(&self, collection: &str) -> Vec<Value> {
        rw_read(&self.collections, SOURCE, "documents")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::unavailable("in-memory store switched off"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("in-memory store failing"));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryRepositories {
    async fn get_many(
        &self,
        keys: &[String],
        scope: SettingScope,
    ) -> Result<SettingsMap, RepoError> {
        self.check()?;
        let settings = rw_read(&self.settings, SOURCE, "get_many");
        Ok(keys
            .iter()
            .filter_map(|key| match settings.get(key) {
                Some((stored, value)) if *stored == scope => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect())
    }

    async fn set_many(&self, entries: Vec<SettingWrite>) -> Result<(), RepoError> {
        self.check()?;
        let mut settings = rw_write(&self.settings, SOURCE, "set_many");
        for entry in entries {
            settings.insert(entry.key, (entry.scope, entry.value));
        }
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        scope: Option<SettingScope>,
    ) -> Result<Option<Value>, RepoError> {
        self.check()?;
        let settings = rw_read(&self.settings, SOURCE, "get");
        Ok(settings.get(key).and_then(|(stored, value)| match scope {
            Some(scope) if scope != *stored => None,
            _ => Some(value.clone()),
        }))
    }
}

#[async_trait]
impl EntityStore for MemoryRepositories {
    async fn find_many(
        &self,
        collection: &str,
        filter: &EntityFilter,
    ) -> Result<Vec<Value>, RepoError> {
        self.check()?;
        let collections = rw_read(&self.collections, SOURCE, "find_many");
        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| filter.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        collection: &str,
        filter: &EntityFilter,
        document: Value,
    ) -> Result<(), RepoError> {
        self.check()?;
        let mut collections = rw_write(&self.collections, SOURCE, "upsert");
        let documents = collections.entry(collection.to_string()).or_default();

        // Same row as the Postgres adapter: the filter match or the same uuid.
        let uuid = document_identity(&document).map(|(uuid, _)| uuid);
        let same_entity = |existing: &Value| {
            filter.matches(existing)
                || (uuid.is_some() && document_identity(existing).map(|(id, _)| id) == uuid)
        };

        match documents.iter().position(|existing| same_entity(existing)) {
            Some(index) => {
                documents[index] = document;
                let mut position = 0;
                documents.retain(|existing| {
                    let keep = position == index || !same_entity(existing);
                    position += 1;
                    keep
                });
            }
            None => documents.push(document),
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepoError> {
        self.check()?;
        let mut collections = rw_write(&self.collections, SOURCE, "delete");
        let documents = collections
            .get_mut(collection)
            .ok_or(RepoError::NotFound)?;
        let before = documents.len();
        documents.retain(|document| {
            document_identity(document).is_none_or(|(uuid, _)| uuid != id)
        });
        if documents.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

/// Infrastructure settings fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticInfrastructure {
    settings: Option<SettingsMap>,
}

impl StaticInfrastructure {
    pub fn new(settings: Option<SettingsMap>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl InfrastructureSource for StaticInfrastructure {
    async fn load(&self) -> Result<Option<SettingsMap>, RepoError> {
        Ok(self.settings.clone())
    }
}
