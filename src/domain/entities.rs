//! Configuration entities and reconciliation results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::checksum::content_hash;

/// Field listing the system settings an entity depends on.
pub const REQUIRED_SETTINGS_FIELD: &str = "_requiredSettings";

/// Configuration entities keyed by uuid.
pub type StateMap = BTreeMap<String, ConfigEntity>;

/// A configuration entity together with its content checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntity {
    pub uuid: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    pub hash: String,
    pub entity: Value,
}

impl ConfigEntity {
    /// Build an entity from a stored or declared document.
    ///
    /// The uuid comes from `_id`, then `uuid`, then `name`. Returns `None` for
    /// documents carrying neither an identifier nor a name.
    pub fn from_document(entity_type: &str, document: Value) -> Option<Self> {
        let (uuid, name) = document_identity(&document)?;

        Some(Self {
            uuid,
            entity_type: entity_type.to_string(),
            name,
            hash: content_hash(&document),
            entity: document,
        })
    }

    /// Settings this entity declares as prerequisites.
    pub fn required_settings(&self) -> Vec<RequiredSetting> {
        self.entity
            .get(REQUIRED_SETTINGS_FIELD)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `(uuid, name)` of a document, each falling back to the other.
pub fn document_identity(document: &Value) -> Option<(String, String)> {
    let id = string_field(document, "_id").or_else(|| string_field(document, "uuid"));
    let name = string_field(document, "name");

    match (id, name) {
        (Some(id), Some(name)) => Some((id, name)),
        (Some(id), None) => Some((id.clone(), id)),
        (None, Some(name)) => Some((name.clone(), name)),
        (None, None) => None,
    }
}

fn string_field(document: &Value, field: &str) -> Option<String> {
    match document.get(field)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// A system setting an entity needs before it can work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredSetting {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigChanges {
    pub new: Vec<ConfigEntity>,
    pub updated: Vec<ConfigEntity>,
    pub deleted: Vec<ConfigEntity>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.updated.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    InSync,
    ChangesDetected,
}

/// Whether the database side of a comparison could actually be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActiveStateHealth {
    Verified,
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSyncStatus {
    pub status: SyncState,
    pub changes: ConfigChanges,
    pub unmet_requirements: Vec<RequiredSetting>,
    pub active_state: ActiveStateHealth,
}

impl ConfigSyncStatus {
    pub fn new(
        changes: ConfigChanges,
        unmet_requirements: Vec<RequiredSetting>,
        active_state: ActiveStateHealth,
    ) -> Self {
        let status = if changes.is_empty() {
            SyncState::InSync
        } else {
            SyncState::ChangesDetected
        };
        Self {
            status,
            changes,
            unmet_requirements,
            active_state,
        }
    }
}
