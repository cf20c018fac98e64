use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::db_pool::DbPool;
use crate::errors::{GalleryError, GalleryResult};
use crate::models::generate_id;

/// Field stamped by the store on every created document.
pub const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a top-level field.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// Collection-based document store. Documents are JSON objects.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, collection: &str, data: Value) -> GalleryResult<String>;

    async fn get(&self, collection: &str, id: &str) -> GalleryResult<Option<Value>>;

    /// With `merge`, top-level fields of `partial` overwrite the stored ones and
    /// a missing document is created; without it the document is replaced.
    async fn update(&self, collection: &str, id: &str, partial: Value, merge: bool)
        -> GalleryResult<()>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> GalleryResult<()>;

    /// Documents lacking the `order_by` field are left out, like the hosted store does.
    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        order_by: Option<&OrderBy>,
    ) -> GalleryResult<Vec<(String, Value)>>;
}

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: DbPool,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_object(data: Value) -> GalleryResult<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(GalleryError::validation(format!(
            "Documents must be JSON objects, got {}",
            other
        ))),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create(&self, collection: &str, data: Value) -> GalleryResult<String> {
        let mut doc = into_object(data)?;
        let now = Utc::now();
        doc.insert(CREATED_AT_FIELD.to_string(), Value::String(now.to_rfc3339()));

        let id = generate_id();
        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(&id)
        .bind(serde_json::to_string(&doc)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> GalleryResult<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((data,)) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Value,
        merge: bool,
    ) -> GalleryResult<()> {
        let partial = into_object(partial)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let doc = match (existing, merge) {
            (Some((data,)), true) => {
                let mut doc = into_object(serde_json::from_str(&data)?)?;
                doc.extend(partial);
                doc
            }
            _ => partial,
        };

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at",
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(&doc)?)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> GalleryResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[FieldFilter],
        order_by: Option<&OrderBy>,
    ) -> GalleryResult<Vec<(String, Value)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, data FROM documents WHERE collection = ? ORDER BY created_at, id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, data) in rows {
            let doc: Value = serde_json::from_str(&data)?;
            let matches = filters
                .iter()
                .all(|f| doc.get(&f.field) == Some(&f.value));
            let ordered = order_by.map_or(true, |o| doc.get(&o.field).is_some());
            if matches && ordered {
                docs.push((id, doc));
            }
        }

        if let Some(order) = order_by {
            docs.sort_by(|(_, a), (_, b)| {
                let ord = compare_values(&a[&order.field], &b[&order.field]);
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        Ok(docs)
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
