//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::settings::{SettingScope, SettingsMap};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database adapter unavailable: {0}")]
    Unavailable(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    /// The adapter has not been set up yet, as opposed to a failing query.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepoError::Unavailable(_))
    }
}

/// One entry of a batched settings write.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingWrite {
    pub key: String,
    pub value: Value,
    pub scope: SettingScope,
}

/// Selects documents of an entity collection.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityFilter {
    All,
    /// Documents whose `field` equals `value`.
    Field { field: String, value: Value },
}

impl EntityFilter {
    pub fn field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            EntityFilter::All => true,
            EntityFilter::Field { field, value } => document.get(field) == Some(value),
        }
    }
}

/// Key/value store of system settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetch the subset of `keys` present in `scope`.
    async fn get_many(&self, keys: &[String], scope: SettingScope)
    -> Result<SettingsMap, RepoError>;

    /// Write all entries, or none of them.
    async fn set_many(&self, entries: Vec<SettingWrite>) -> Result<(), RepoError>;

    /// Fetch one key; `None` for `scope` searches every scope.
    async fn get(&self, key: &str, scope: Option<SettingScope>)
    -> Result<Option<Value>, RepoError>;
}

/// Document store holding configuration entity collections.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_many(
        &self,
        collection: &str,
        filter: &EntityFilter,
    ) -> Result<Vec<Value>, RepoError>;

    /// Replace the document matched by `filter`, inserting when none matches.
    async fn upsert(
        &self,
        collection: &str,
        filter: &EntityFilter,
        document: Value,
    ) -> Result<(), RepoError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepoError>;
}

/// Authoritative declarations of configuration entities, usually files.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Entity type the declarations describe.
    fn entity_type(&self) -> &str;

    async fn collections(&self) -> Result<Vec<Value>, RepoError>;
}

/// Static private configuration available before the database is reachable.
#[async_trait]
pub trait InfrastructureSource: Send + Sync {
    /// `Ok(None)` when no configuration exists yet (first-time setup).
    async fn load(&self) -> Result<Option<SettingsMap>, RepoError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_filter_matches_exact_value() {
        let filter = EntityFilter::field("name", "Posts");
        assert!(filter.matches(&json!({"name": "Posts"})));
        assert!(!filter.matches(&json!({"name": "Pages"})));
        assert!(!filter.matches(&json!({"title": "Posts"})));
        assert!(EntityFilter::All.matches(&json!({})));
    }

    #[test]
    fn unavailable_is_distinguishable() {
        assert!(RepoError::unavailable("pool closed").is_unavailable());
        assert!(!RepoError::from_persistence("boom").is_unavailable());
    }
}
