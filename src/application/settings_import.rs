//! Externally supplied settings snapshots.
//!
//! Snapshots arrive either wrapped (`{"settings": {...}}`) or flat, and each
//! value may itself be wrapped as `{"value": ...}`.

use serde::Serialize;
use serde_json::Value;

use crate::domain::error::DomainError;
use crate::domain::settings::{SettingsMap, SettingsSchema};

/// Flatten a snapshot into a plain key to value map.
pub fn normalize_snapshot(snapshot: &Value) -> Result<SettingsMap, DomainError> {
    let root = snapshot
        .as_object()
        .ok_or_else(|| DomainError::validation("settings snapshot must be a JSON object"))?;

    let entries = match root.get("settings") {
        Some(Value::Object(inner)) => inner,
        Some(_) => {
            return Err(DomainError::validation(
                "`settings` in a snapshot must be a JSON object",
            ));
        }
        None => root,
    };

    Ok(entries
        .iter()
        .map(|(key, value)| (key.clone(), unwrap_value(value)))
        .collect())
}

fn unwrap_value(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.contains_key("value") => map["value"].clone(),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Setting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    KeepCurrent,
    UseImport,
    Merge,
    Review,
}

/// An imported value that would overwrite a different existing one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub key: String,
    pub current: Value,
    pub import: Value,
    pub recommendation: Recommendation,
}

/// Keys present on both sides with differing values, ordered by key.
pub fn detect_conflicts(
    current: &SettingsMap,
    incoming: &SettingsMap,
    schema: &SettingsSchema,
) -> Vec<Conflict> {
    incoming
        .iter()
        .filter_map(|(key, import)| {
            let existing = current.get(key)?;
            if existing == import {
                return None;
            }
            Some(Conflict {
                kind: ConflictKind::Setting,
                key: key.clone(),
                current: existing.clone(),
                import: import.clone(),
                recommendation: recommend(key, existing, import, schema),
            })
        })
        .collect()
}

fn recommend(
    key: &str,
    current: &Value,
    import: &Value,
    schema: &SettingsSchema,
) -> Recommendation {
    if schema.is_infrastructure(key) {
        return Recommendation::KeepCurrent;
    }
    if is_blank(current) {
        return Recommendation::UseImport;
    }
    if current.is_object() && import.is_object() {
        return Recommendation::Merge;
    }
    Recommendation::Review
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> SettingsMap {
        normalize_snapshot(&value).expect("valid snapshot")
    }

    #[test]
    fn wrapped_and_flat_snapshots_normalize_alike() {
        let wrapped = map(json!({"settings": {"SITE_NAME": "Acme", "SMTP_PORT": {"value": 587}}}));
        let flat = map(json!({"SITE_NAME": {"value": "Acme"}, "SMTP_PORT": 587}));

        assert_eq!(wrapped, flat);
        assert_eq!(wrapped["SMTP_PORT"], json!(587));
    }

    #[test]
    fn non_object_snapshot_is_rejected() {
        assert!(normalize_snapshot(&json!(["SITE_NAME"])).is_err());
        assert!(normalize_snapshot(&json!({"settings": 3})).is_err());
    }

    #[test]
    fn conflicts_only_for_differing_values() {
        let schema = SettingsSchema::default();
        let current = map(json!({"SITE_NAME": "Acme", "SMTP_HOST": "mail.local", "LOCALES": []}));
        let incoming = map(json!({
            "SITE_NAME": "Acme",
            "SMTP_HOST": "smtp.example",
            "LOCALES": ["en", "de"],
            "NEW_KEY": true
        }));

        let conflicts = detect_conflicts(&current, &incoming, &schema);
        let keys: Vec<&str> = conflicts.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["LOCALES", "SMTP_HOST"]);
        assert_eq!(conflicts[0].recommendation, Recommendation::UseImport);
        assert_eq!(conflicts[1].recommendation, Recommendation::Review);
        assert_eq!(conflicts[1].current, json!("mail.local"));
        assert_eq!(conflicts[1].import, json!("smtp.example"));
    }

    #[test]
    fn infrastructure_and_object_recommendations() {
        let schema = SettingsSchema::default();
        let current = map(json!({"DB_HOST": "db1", "SEASONS": {"spring": true}}));
        let incoming = map(json!({"DB_HOST": "db2", "SEASONS": {"winter": true}}));

        let conflicts = detect_conflicts(&current, &incoming, &schema);
        assert_eq!(conflicts[0].key, "DB_HOST");
        assert_eq!(conflicts[0].recommendation, Recommendation::KeepCurrent);
        assert_eq!(conflicts[1].recommendation, Recommendation::Merge);
    }

    #[test]
    fn conflict_serializes_type_field() {
        let schema = SettingsSchema::default();
        let current = map(json!({"SITE_NAME": "A"}));
        let incoming = map(json!({"SITE_NAME": "B"}));
        let encoded = serde_json::to_value(&detect_conflicts(&current, &incoming, &schema)[0])
            .expect("serializable");
        assert_eq!(encoded["type"], json!("setting"));
        assert_eq!(encoded["recommendation"], json!("review"));
    }
}
