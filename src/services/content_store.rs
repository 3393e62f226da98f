//! ContentStore: the document database holding every content record.
//!
//! Records are schemaless JSON objects grouped by collection. The SQLite
//! implementation keeps them in a single `documents` table and relies on
//! SQLite's JSON1 functions for field queries and partial updates.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Field set of a stored record.
pub type Fields = Map<String, Value>;

/// A record together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    /// JSON object with the id merged in.
    pub fn into_json(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".into(), Value::String(self.id));
        Value::Object(fields)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document `{id}` not found in `{collection}`")]
    NotFound { collection: String, id: String },
    #[error("document `{0}` does not hold a JSON object")]
    Corrupt(String),
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the upload pipeline and the controllers need from the
/// document database.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new record and return its assigned id.
    async fn insert(&self, collection: &str, fields: Fields) -> StoreResult<String>;

    /// Point lookup. Missing records are `StoreError::NotFound`.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Document>;

    /// Every record in insertion order.
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Records whose `field` equals `value` exactly.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>>;

    /// Merge `patch` into an existing record.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> StoreResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    body: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> StoreResult<Self> {
        match serde_json::from_str::<Value>(&row.body)? {
            Value::Object(fields) => Ok(Document::new(row.id, fields)),
            _ => Err(StoreError::Corrupt(row.id)),
        }
    }
}

/// SQLite-backed ContentStore.
#[derive(Clone)]
pub struct SqliteContentStore {
    db: Arc<SqlitePool>,
}

impl SqliteContentStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

/// Apply the embedded schema. Statements are idempotent.
pub async fn run_migrations(db: &SqlitePool) -> StoreResult<()> {
    let sql = include_str!("../../migrations/0001_init.sql");
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

/// JSON path addressing a top-level key, quoted so keys with dots survive.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn insert(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(&fields)?;

        sqlx::query("INSERT INTO documents (collection, id, body, created_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(body)
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;

        debug!(collection, id = %id, "inserted document");
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::not_found(collection, id))?;

        row.try_into()
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body FROM documents WHERE collection = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(collection)
        .fetch_all(&*self.db)
        .await?
        .into_iter()
        .map(Document::try_from)
        .collect()
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND json_extract(body, ");
        builder.push_bind(json_path(field));
        builder.push(") = ");

        // json_extract yields SQL scalars: booleans come back as 0/1.
        match value {
            Value::String(s) => {
                builder.push_bind(s.clone());
            }
            Value::Bool(b) => {
                builder.push_bind(i64::from(*b));
            }
            Value::Number(n) => match n.as_i64() {
                Some(i) => {
                    builder.push_bind(i);
                }
                None => {
                    builder.push_bind(n.as_f64().unwrap_or_default());
                }
            },
            other => {
                builder.push("json(");
                builder.push_bind(other.to_string());
                builder.push(")");
            }
        }
        builder.push(" ORDER BY created_at ASC, rowid ASC");

        builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&*self.db)
            .await?
            .into_iter()
            .map(Document::try_from)
            .collect()
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> StoreResult<()> {
        let patch = serde_json::to_string(&patch)?;
        let result = sqlx::query(
            "UPDATE documents SET body = json_patch(body, ?) WHERE collection = ? AND id = ?",
        )
        .bind(patch)
        .bind(collection)
        .bind(id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?
        {
            1 => Ok(()),
            other => Err(StoreError::Unavailable(format!(
                "unexpected probe result: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteContentStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        run_migrations(&pool).await.expect("migrations");
        SqliteContentStore::new(Arc::new(pool))
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips_fields() {
        let store = store().await;
        let id = store
            .insert("media", fields(json!({"title": "Intro", "views": 0})))
            .await
            .unwrap();

        let doc = store.get("media", &id).await.unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.fields["title"], "Intro");
        assert_eq!(doc.fields["views"], 0);
    }

    #[tokio::test]
    async fn get_is_scoped_to_collection() {
        let store = store().await;
        let id = store
            .insert("media", fields(json!({"title": "Intro"})))
            .await
            .unwrap();

        let err = store.get("vitae", &id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_by_field_matches_exactly() {
        let store = store().await;
        store
            .insert("media", fields(json!({"title": "Intro"})))
            .await
            .unwrap();
        store
            .insert("media", fields(json!({"title": "intro"})))
            .await
            .unwrap();
        store
            .insert("vitae", fields(json!({"title": "Intro"})))
            .await
            .unwrap();

        let hits = store
            .query_by_field("media", "title", &json!("Intro"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fields["title"], "Intro");

        store
            .insert("experiences", fields(json!({"verified": true})))
            .await
            .unwrap();
        let verified = store
            .query_by_field("experiences", "verified", &json!(true))
            .await
            .unwrap();
        assert_eq!(verified.len(), 1);
    }

    #[tokio::test]
    async fn update_merges_and_keeps_other_fields() {
        let store = store().await;
        let id = store
            .insert(
                "experiences",
                fields(json!({"name": "Lab", "image": "u1", "verified": false})),
            )
            .await
            .unwrap();

        store
            .update("experiences", &id, fields(json!({"verified": true})))
            .await
            .unwrap();

        let doc = store.get("experiences", &id).await.unwrap();
        assert_eq!(doc.fields["verified"], true);
        assert_eq!(doc.fields["image"], "u1");
        assert_eq!(doc.fields["name"], "Lab");
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_documents() {
        let store = store().await;
        let err = store
            .update("media", "nope", fields(json!({"title": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store.delete("media", "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_and_delete() {
        let store = store().await;
        let a = store
            .insert("projects", fields(json!({"title": "A"})))
            .await
            .unwrap();
        store
            .insert("projects", fields(json!({"title": "B"})))
            .await
            .unwrap();

        store.delete("projects", &a).await.unwrap();
        let remaining = store.list("projects").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].fields["title"], "B");
        store.ping().await.unwrap();
    }
}
