//! System setting scopes and the built-in key sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat key to value map holding one scope of settings.
pub type SettingsMap = BTreeMap<String, Value>;

/// Public key under which the running package version is exposed.
pub const VERSION_KEY: &str = "PKG_VERSION";

/// Settings that may be shown to anonymous visitors.
pub const PUBLIC_SETTING_KEYS: &[&str] = &[
    "SITE_NAME",
    "HOST_DEV",
    "HOST_PROD",
    "BASE_LOCALE",
    "LOCALES",
    "DEFAULT_CONTENT_LANGUAGE",
    "AVAILABLE_CONTENT_LANGUAGES",
    "PASSWORD_LENGTH",
    "MEDIA_FOLDER",
    "MEDIA_OUTPUT_FORMAT_QUALITY",
    "MAX_FILE_SIZE",
    "BODY_SIZE_LIMIT",
    "USE_GOOGLE_OAUTH",
    "SEASONS",
    "SEASON_REGION",
    "LOG_LEVELS",
    "DEMO",
];

/// Settings that never leave the server.
pub const PRIVATE_SETTING_KEYS: &[&str] = &[
    "DB_TYPE",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_RETRY_ATTEMPTS",
    "DB_RETRY_DELAY",
    "DB_POOL_SIZE",
    "JWT_SECRET_KEY",
    "ENCRYPTION_KEY",
    "MULTI_TENANT",
    "SMTP_HOST",
    "SMTP_PORT",
    "SMTP_USER",
    "SMTP_PASSWORD",
    "SMTP_EMAIL",
    "GOOGLE_CLIENT_ID",
    "GOOGLE_CLIENT_SECRET",
    "USE_REDIS",
    "REDIS_HOST",
    "REDIS_PORT",
    "REDIS_PASSWORD",
    "SESSION_CLEANUP_INTERVAL",
    "SESSION_EXPIRATION_SECONDS",
    "USE_2FA",
    "TWO_FACTOR_AUTH_BACKUP_CODES_COUNT",
];

/// Private keys that are only ever read from static configuration. They are
/// needed to reach the database in the first place.
pub const INFRASTRUCTURE_KEYS: &[&str] = &[
    "DB_TYPE",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_RETRY_ATTEMPTS",
    "DB_RETRY_DELAY",
    "DB_POOL_SIZE",
    "JWT_SECRET_KEY",
    "ENCRYPTION_KEY",
    "MULTI_TENANT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingScope {
    Public,
    Private,
}

impl SettingScope {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingScope::Public => "public",
            SettingScope::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(SettingScope::Public),
            "private" => Some(SettingScope::Private),
            _ => None,
        }
    }
}

/// The key sets the settings cache loads.
#[derive(Debug, Clone)]
pub struct SettingsSchema {
    public_keys: Vec<String>,
    private_keys: Vec<String>,
    infrastructure_keys: BTreeSet<String>,
}

impl SettingsSchema {
    pub fn new<P, Q, I>(public_keys: P, private_keys: Q, infrastructure_keys: I) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        Q: IntoIterator,
        Q::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            public_keys: public_keys.into_iter().map(Into::into).collect(),
            private_keys: private_keys.into_iter().map(Into::into).collect(),
            infrastructure_keys: infrastructure_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn public_keys(&self) -> &[String] {
        &self.public_keys
    }

    /// Private keys that are loaded from the database.
    pub fn dynamic_private_keys(&self) -> Vec<String> {
        self.private_keys
            .iter()
            .filter(|key| !self.infrastructure_keys.contains(key.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_public(&self, key: &str) -> bool {
        self.public_keys.iter().any(|candidate| candidate == key)
    }

    pub fn is_infrastructure(&self, key: &str) -> bool {
        self.infrastructure_keys.contains(key)
    }

    /// Scope a key is persisted under.
    pub fn scope_of(&self, key: &str) -> SettingScope {
        if self.is_public(key) {
            SettingScope::Public
        } else {
            SettingScope::Private
        }
    }
}

impl Default for SettingsSchema {
    fn default() -> Self {
        Self::new(
            PUBLIC_SETTING_KEYS.iter().copied(),
            PRIVATE_SETTING_KEYS.iter().copied(),
            INFRASTRUCTURE_KEYS.iter().copied(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_private_keys_exclude_infrastructure() {
        let schema = SettingsSchema::default();
        let dynamic = schema.dynamic_private_keys();

        assert!(dynamic.iter().any(|key| key == "SMTP_HOST"));
        for key in INFRASTRUCTURE_KEYS {
            assert!(!dynamic.iter().any(|candidate| candidate == key), "{key}");
        }
    }

    #[test]
    fn scope_follows_public_key_set() {
        let schema = SettingsSchema::default();
        assert_eq!(schema.scope_of("SITE_NAME"), SettingScope::Public);
        assert_eq!(schema.scope_of("SMTP_HOST"), SettingScope::Private);
        assert_eq!(schema.scope_of("SOMETHING_CUSTOM"), SettingScope::Private);
    }

    #[test]
    fn scope_round_trips_through_str() {
        for scope in [SettingScope::Public, SettingScope::Private] {
            assert_eq!(SettingScope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(SettingScope::parse("tenant"), None);
    }
}
