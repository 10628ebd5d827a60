use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;

use crate::application::repos::{RepoError, SettingWrite, SettingsStore};
use crate::domain::settings::{SettingScope, SettingsMap};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl SettingsStore for PostgresRepositories {
    async fn get_many(
        &self,
        keys: &[String],
        scope: SettingScope,
    ) -> Result<SettingsMap, RepoError> {
        if keys.is_empty() {
            return Ok(SettingsMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT key, value
            FROM system_settings
            WHERE scope = $1 AND key = ANY($2)
            "#,
        )
        .bind(scope.as_str())
        .bind(keys)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("key").map_err(map_sqlx_error)?;
                let value: Value = row.try_get("value").map_err(map_sqlx_error)?;
                Ok((key, value))
            })
            .collect()
    }

    async fn set_many(&self, entries: Vec<SettingWrite>) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO system_settings (key, scope, value, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (key) DO UPDATE SET
                    scope = EXCLUDED.scope,
                    value = EXCLUDED.value,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&entry.key)
            .bind(entry.scope.as_str())
            .bind(&entry.value)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn get(
        &self,
        key: &str,
        scope: Option<SettingScope>,
    ) -> Result<Option<Value>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT value
            FROM system_settings
            WHERE key = $1 AND ($2::text IS NULL OR scope = $2)
            "#,
        )
        .bind(key)
        .bind(scope.map(SettingScope::as_str))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| row.try_get::<Value, _>("value").map_err(map_sqlx_error))
            .transpose()
    }
}
