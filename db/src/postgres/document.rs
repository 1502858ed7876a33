use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use abi::config::PostgresConfig;
use abi::errors::Result;
use abi::model::{
    resolve_server_timestamps, ChangeEvent, ChangeKind, CollectionPath, DocPath, Document,
    FieldValue, Fields,
};

use crate::document::DocumentStore;

/// channel used with LISTEN/NOTIFY for the change feed
pub const CHANGE_CHANNEL: &str = "document_changes";
const FEED_CAPACITY: usize = 1024;
// NOTIFY payloads must stay below 8000 bytes
const MAX_PAYLOAD: usize = 7900;

/// Documents stored as JSONB rows keyed by path.
///
/// Notifications are at-most-once: a listener that is reconnecting misses
/// whatever was published meanwhile. The listener task stops with the store.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
    tx: broadcast::Sender<ChangeEvent>,
    listener: JoinHandle<()>,
}

impl PostgresStore {
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Self::with_pool(pool).await
    }

    /// the schema must already be migrated
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        let listener = tokio::spawn(forward_notifications(listener, tx.clone()));
        info!("postgres store listening on channel {}", CHANGE_CHANNEL);
        Ok(Self { pool, tx, listener })
    }

    async fn notify(&self, event: &ChangeEvent) {
        let mut payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("serialize change event for {} failed: {}", event.path, e);
                return;
            }
        };
        if payload.len() > MAX_PAYLOAD {
            let slim = ChangeEvent {
                document: None,
                ..event.clone()
            };
            payload = match serde_json::to_string(&slim) {
                Ok(payload) => payload,
                Err(_) => return,
            };
        }
        // the write is committed; a lost notification is recovered by the sweep
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(&payload)
            .execute(&self.pool)
            .await
        {
            warn!("notify change of {} failed: {}", event.path, e);
        }
    }
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn forward_notifications(mut listener: PgListener, tx: broadcast::Sender<ChangeEvent>) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(e) => warn!("malformed change notification: {}", e),
                }
            }
            Err(e) => {
                error!("change feed listener error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let doc = sqlx::query_as(
            "SELECT path, fields, create_time, update_time FROM documents WHERE path = $1",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> Result<Document> {
        let now = chrono::Utc::now().timestamp_millis();
        let fields = resolve_server_timestamps(fields, now);
        let parent = path.parent();

        // xmax is 0 only for a freshly inserted row
        let row = sqlx::query(
            "INSERT INTO documents
                (path, parent, collection_id, doc_id, fields, create_time, update_time)
             VALUES
                ($1, $2, $3, $4, $5, $6, $6)
             ON CONFLICT (path)
             DO UPDATE
                SET fields = EXCLUDED.fields,
                    update_time = EXCLUDED.update_time
             RETURNING create_time, update_time, (xmax = 0) AS inserted",
        )
        .bind(path.as_str())
        .bind(parent.as_str())
        .bind(parent.collection_id())
        .bind(path.id())
        .bind(Json(&fields))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        let doc = Document {
            path: path.clone(),
            fields,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        };
        let kind = if inserted {
            ChangeKind::Created
        } else {
            ChangeKind::Updated
        };
        debug!("{} {}", kind, path);
        self.notify(&ChangeEvent {
            kind,
            path: path.clone(),
            document: Some(doc.clone()),
        })
        .await;
        Ok(doc)
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        let deleted: Option<(String,)> =
            sqlx::query_as("DELETE FROM documents WHERE path = $1 RETURNING path")
                .bind(path.as_str())
                .fetch_optional(&self.pool)
                .await?;
        if deleted.is_some() {
            debug!("deleted {}", path);
            self.notify(&ChangeEvent {
                kind: ChangeKind::Deleted,
                path: path.clone(),
                document: None,
            })
            .await;
        }
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        let docs = sqlx::query_as(
            "SELECT path, fields, create_time, update_time
             FROM documents
             WHERE parent = $1
             ORDER BY path",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    async fn list_group(&self, collection_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as(
            "SELECT path, fields, create_time, update_time
             FROM documents
             WHERE collection_id = $1
             ORDER BY path",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    async fn find_by_field(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>> {
        let docs = sqlx::query_as(
            "SELECT path, fields, create_time, update_time
             FROM documents
             WHERE parent = $1 AND fields -> $2 = $3
             ORDER BY path",
        )
        .bind(collection.as_str())
        .bind(field)
        .bind(Json(value))
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}
