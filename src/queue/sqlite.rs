/// SQLite-file queue
///
/// Producers on the same host enqueue rows (see the `tool_enqueue` binary); the relay
/// receives them with a visibility timeout tracked in `visible_at`.
use super::{NotificationQueue, QueueMessage};
use crate::errors::{RelayError, RelayResult};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, TransactionBehavior};
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    visibility_timeout: Duration,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn blocking_error(e: tokio::task::JoinError) -> RelayError {
    RelayError::Queue(format!("blocking task failed: {}", e))
}

fn initialize_schema(conn: &Connection) -> RelayResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS queue_messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            body BLOB NOT NULL,
            dequeue_count INTEGER NOT NULL DEFAULT 0,
            visible_at INTEGER NOT NULL,
            pop_receipt TEXT,
            inserted_at INTEGER NOT NULL
        )
        "#,
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_queue_visible ON queue_messages(visible_at, seq)",
        [],
    )?;
    Ok(())
}

impl SqliteQueue {
    pub fn open(path: &str, visibility_timeout: Duration) -> RelayResult<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        logger::info(LogTag::Queue, &format!("SQLite queue opened at {}", path));
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            visibility_timeout,
        })
    }

    /// Messages still stored, visible or not
    pub async fn len(&self) -> RelayResult<usize> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> RelayResult<usize> {
            let conn = conn.lock();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM queue_messages", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
        .map_err(blocking_error)?
    }
}

#[async_trait]
impl NotificationQueue for SqliteQueue {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn enqueue(&self, body: Vec<u8>) -> RelayResult<String> {
        let conn = self.conn.clone();
        let id = uuid::Uuid::new_v4().to_string();
        let message_id = id.clone();

        tokio::task::spawn_blocking(move || -> RelayResult<()> {
            let now = now_millis();
            conn.lock().execute(
                "INSERT INTO queue_messages (id, body, dequeue_count, visible_at, inserted_at) VALUES (?1, ?2, 0, ?3, ?3)",
                params![message_id, body, now],
            )?;
            Ok(())
        })
        .await
        .map_err(blocking_error)??;

        Ok(id)
    }

    async fn receive(&self, max_messages: usize) -> RelayResult<Vec<QueueMessage>> {
        let conn = self.conn.clone();
        let visibility_ms = self.visibility_timeout.as_millis() as i64;

        tokio::task::spawn_blocking(move || -> RelayResult<Vec<QueueMessage>> {
            let mut conn = conn.lock();
            // IMMEDIATE: hold the write lock from the SELECT on, concurrent writers wait on busy_timeout
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_millis();

            let candidates: Vec<(String, Vec<u8>, u32)> = {
                let mut stmt = tx.prepare_cached(
                    "SELECT id, body, dequeue_count FROM queue_messages WHERE visible_at <= ?1 ORDER BY seq LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![now, max_messages as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut received = Vec::with_capacity(candidates.len());
            for (id, body, dequeue_count) in candidates {
                let receipt = uuid::Uuid::new_v4().to_string();
                let dequeue_count = dequeue_count + 1;
                tx.execute(
                    "UPDATE queue_messages SET dequeue_count = ?1, pop_receipt = ?2, visible_at = ?3 WHERE id = ?4",
                    params![dequeue_count, receipt, now + visibility_ms, id],
                )?;
                received.push(QueueMessage {
                    id,
                    pop_receipt: receipt,
                    dequeue_count,
                    body,
                });
            }

            tx.commit()?;
            Ok(received)
        })
        .await
        .map_err(blocking_error)?
    }

    async fn delete(&self, message: &QueueMessage) -> RelayResult<()> {
        let conn = self.conn.clone();
        let id = message.id.clone();
        let receipt = message.pop_receipt.clone();

        let removed = tokio::task::spawn_blocking(move || -> RelayResult<usize> {
            Ok(conn.lock().execute(
                "DELETE FROM queue_messages WHERE id = ?1 AND pop_receipt = ?2",
                params![id, receipt],
            )?)
        })
        .await
        .map_err(blocking_error)??;

        if removed == 0 {
            return Err(RelayError::Queue(format!(
                "message {} not found or pop receipt is stale",
                message.id
            )));
        }
        Ok(())
    }
}
