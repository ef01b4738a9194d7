/// SQLite-file backplane for relays sharing one host
///
/// Publishers append rows to `backplane_messages`; each subscriber polls for rows on its
/// channel newer than the highest id it has seen. Rows older than the retention window
/// are pruned by publishers.
use super::{new_instance_id, Backplane, BackplaneMessage, SUBSCRIPTION_BUFFER};
use crate::arguments::is_debug_backplane_enabled;
use crate::errors::{RelayError, RelayResult};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const POLL_BATCH_LIMIT: i64 = 500;
/// Prune once every this many publishes
const PRUNE_EVERY: u64 = 100;

pub struct SqliteBackplane {
    conn: Arc<Mutex<Connection>>,
    channel: String,
    instance_id: String,
    poll_interval: Duration,
    retention: Duration,
    published: AtomicU64,
}

fn initialize_schema(conn: &Connection) -> RelayResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS backplane_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel TEXT NOT NULL,
            origin TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_backplane_channel_id ON backplane_messages(channel, id)",
        [],
    )?;
    Ok(())
}

fn blocking_error(e: tokio::task::JoinError) -> RelayError {
    RelayError::Backplane(format!("blocking task failed: {}", e))
}

impl SqliteBackplane {
    pub fn open(
        path: &str,
        channel: impl Into<String>,
        poll_interval: Duration,
        retention: Duration,
    ) -> RelayResult<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;

        logger::info(
            LogTag::Backplane,
            &format!("SQLite backplane opened at {}", path),
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            channel: channel.into(),
            instance_id: new_instance_id(),
            poll_interval,
            retention,
            published: AtomicU64::new(0),
        })
    }

    fn prune(conn: &Connection, retention: Duration) -> RelayResult<usize> {
        let cutoff = chrono::Utc::now().timestamp_millis() - retention.as_millis() as i64;
        Ok(conn.execute(
            "DELETE FROM backplane_messages WHERE created_at < ?1",
            params![cutoff],
        )?)
    }
}

#[async_trait]
impl Backplane for SqliteBackplane {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    async fn publish(&self, message: BackplaneMessage) -> RelayResult<()> {
        let payload = serde_json::to_string(&message)?;
        let conn = self.conn.clone();
        let channel = self.channel.clone();
        let retention = self.retention;
        let prune = self.published.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1;

        tokio::task::spawn_blocking(move || -> RelayResult<()> {
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO backplane_messages (channel, origin, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    channel,
                    message.origin,
                    payload,
                    chrono::Utc::now().timestamp_millis()
                ],
            )?;
            if prune {
                let removed = Self::prune(&conn, retention)?;
                if removed > 0 && is_debug_backplane_enabled() {
                    logger::debug(
                        LogTag::Backplane,
                        &format!("Pruned {} expired backplane rows", removed),
                    );
                }
            }
            Ok(())
        })
        .await
        .map_err(blocking_error)?
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> RelayResult<mpsc::Receiver<BackplaneMessage>> {
        let conn = self.conn.clone();
        let channel = self.channel.clone();

        let start_id = {
            let conn = conn.clone();
            let channel = channel.clone();
            tokio::task::spawn_blocking(move || -> RelayResult<i64> {
                let conn = conn.lock();
                Ok(conn.query_row(
                    "SELECT COALESCE(MAX(id), 0) FROM backplane_messages WHERE channel = ?1",
                    params![channel],
                    |row| row.get(0),
                )?)
            })
            .await
            .map_err(blocking_error)??
        };

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last_id = start_id;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let conn = conn.clone();
                let channel = channel.clone();
                let rows = tokio::task::spawn_blocking(move || -> RelayResult<Vec<(i64, String)>> {
                    let conn = conn.lock();
                    let mut stmt = conn.prepare_cached(
                        "SELECT id, payload FROM backplane_messages WHERE channel = ?1 AND id > ?2 ORDER BY id LIMIT ?3",
                    )?;
                    let rows = stmt
                        .query_map(params![channel, last_id, POLL_BATCH_LIMIT], |row| {
                            Ok((row.get(0)?, row.get(1)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await
                .map_err(blocking_error)
                .and_then(|result| result);

                let rows = match rows {
                    Ok(rows) => rows,
                    Err(e) => {
                        logger::warning(LogTag::Backplane, &format!("Backplane poll failed: {}", e));
                        continue;
                    }
                };

                for (id, payload) in rows {
                    last_id = id;
                    match serde_json::from_str::<BackplaneMessage>(&payload) {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => logger::warning(
                            LogTag::Backplane,
                            &format!("Skipping malformed backplane row {}: {}", id, e),
                        ),
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubKind, Scope};

    fn open(path: &str, channel: &str) -> SqliteBackplane {
        SqliteBackplane::open(
            path,
            channel,
            Duration::from_millis(20),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_two_instances_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backplane.db");
        let path = path.to_str().unwrap();

        let a = open(path, "pushrelay:test");
        let b = open(path, "pushrelay:test");
        let other_env = open(path, "pushrelay:other");
        assert_ne!(a.instance_id(), b.instance_id());

        let cancel = CancellationToken::new();
        let mut b_rx = b.subscribe(cancel.clone()).await.unwrap();
        let mut other_rx = other_env.subscribe(cancel.clone()).await.unwrap();

        a.publish(BackplaneMessage::new(
            a.instance_id().to_string(),
            HubKind::Authenticated,
            Scope::User("u1".to_string()),
            "frame-1".to_string(),
        ))
        .await
        .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), b_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.origin, a.instance_id());
        assert_eq!(received.scope, Scope::User("u1".to_string()));
        assert_eq!(received.frame, "frame-1");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(other_rx.try_recv().is_err());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_subscriber_starts_after_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backplane.db");
        let path = path.to_str().unwrap();

        let a = open(path, "c");
        a.publish(BackplaneMessage::new(
            "old".to_string(),
            HubKind::Authenticated,
            Scope::Broadcast,
            "stale".to_string(),
        ))
        .await
        .unwrap();

        let cancel = CancellationToken::new();
        let mut rx = a.subscribe(cancel.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        cancel.cancel();
    }

    #[test]
    fn test_prune_removes_expired_rows() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO backplane_messages (channel, origin, payload, created_at) VALUES ('c', 'o', '{}', 0)",
            [],
        )
        .unwrap();

        let removed = SqliteBackplane::prune(&conn, Duration::from_secs(60)).unwrap();
        assert_eq!(removed, 1);
    }
}
