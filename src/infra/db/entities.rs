use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;

use crate::application::repos::{EntityFilter, EntityStore, RepoError};
use crate::domain::entities::document_identity;

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl EntityStore for PostgresRepositories {
    async fn find_many(
        &self,
        collection: &str,
        filter: &EntityFilter,
    ) -> Result<Vec<Value>, RepoError> {
        let rows = match filter {
            EntityFilter::All => {
                sqlx::query(
                    r#"
                    SELECT document
                    FROM config_entities
                    WHERE collection = $1
                    ORDER BY id
                    "#,
                )
                .bind(collection)
                .fetch_all(self.pool())
                .await
            }
            EntityFilter::Field { field, value } => {
                sqlx::query(
                    r#"
                    SELECT document
                    FROM config_entities
                    WHERE collection = $1 AND document -> $2 = $3
                    ORDER BY id
                    "#,
                )
                .bind(collection)
                .bind(field)
                .bind(value)
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| row.try_get::<Value, _>("document").map_err(map_sqlx_error))
            .collect()
    }

    async fn upsert(
        &self,
        collection: &str,
        filter: &EntityFilter,
        document: Value,
    ) -> Result<(), RepoError> {
        let (id, name) = document_identity(&document).ok_or_else(|| RepoError::InvalidInput {
            message: "document has neither an id nor a name".to_string(),
        })?;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let existing: Option<String> = match filter {
            EntityFilter::All => None,
            EntityFilter::Field { field, value } => sqlx::query_scalar(
                r#"
                SELECT id
                FROM config_entities
                WHERE collection = $1 AND document -> $2 = $3
                ORDER BY id
                LIMIT 1
                "#,
            )
            .bind(collection)
            .bind(field)
            .bind(value)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?,
        };

        if let Some(existing) = existing.filter(|existing| *existing != id) {
            sqlx::query("DELETE FROM config_entities WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(&existing)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        sqlx::query(
            r#"
            INSERT INTO config_entities (collection, id, name, document, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (collection, id) DO UPDATE SET
                name = EXCLUDED.name,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(&name)
        .bind(&document)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM config_entities WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
