//! SQLite-backed local persistence.
//!
//! Each room gets an append-only log of encoded document updates in one
//! shared database file. `sync()` replays the log into the store and then
//! tails the store's update stream, persisting everything the provider did
//! not itself produce. Closing a provider whose replay completed compacts
//! the log down to a single full snapshot, so the log stays proportional
//! to session activity rather than document history. A provider closed
//! before replay completed leaves the log exactly as it found it.
//!
//! All rusqlite calls run under `spawn_blocking`; the async side never
//! touches a connection.

use crate::error::SessionResult;
use crate::provider::{PersistenceFactory, PersistenceProvider};
use async_trait::async_trait;
use reelsync_store::{ReplicatedStore, UpdateOrigin};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The running writer: dropping the sender asks it to stop, the handle is
/// awaited so no insert is left in flight when `close` compacts.
struct Writer {
    stop: watch::Sender<()>,
    task: JoinHandle<()>,
}

/// SQLite-backed [`PersistenceProvider`].
pub struct SqlitePersistence {
    path: PathBuf,
    room_id: String,
    store: Arc<ReplicatedStore>,
    writer: Mutex<Option<Writer>>,
}

impl SqlitePersistence {
    /// Creates a provider for one room in the given database file. The
    /// file and schema are created lazily on first use.
    pub fn new(path: impl Into<PathBuf>, room_id: &str, store: Arc<ReplicatedStore>) -> Self {
        Self {
            path: path.into(),
            room_id: room_id.to_string(),
            store,
            writer: Mutex::new(None),
        }
    }

    /// Collapses the room's update log into a single full snapshot.
    pub async fn compact(&self) -> SessionResult<()> {
        let snapshot = self.store.encode_full();
        let path = self.path.clone();
        let room = self.room_id.clone();
        tokio::task::spawn_blocking(move || -> SessionResult<()> {
            let mut conn = open(&path)?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM doc_updates WHERE room = ?1", [&room])?;
            tx.execute(
                "INSERT INTO doc_updates (room, payload) VALUES (?1, ?2)",
                params![room, snapshot],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await??;
        debug!(room = %self.room_id, "compacted update log");
        Ok(())
    }

    fn spawn_writer(&self) -> Writer {
        let mut updates = self.store.subscribe();
        let (stop, mut stopped) = watch::channel(());
        let path = self.path.clone();
        let room = self.room_id.clone();
        let task = tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    _ = stopped.changed() => break,
                    update = updates.recv() => update,
                };
                match update {
                    Ok(update) if update.origin != UpdateOrigin::Persistence => {
                        let path = path.clone();
                        let room = room.clone();
                        let written =
                            tokio::task::spawn_blocking(move || -> SessionResult<()> {
                                let conn = open(&path)?;
                                conn.execute(
                                    "INSERT INTO doc_updates (room, payload) VALUES (?1, ?2)",
                                    params![room, update.payload],
                                )?;
                                Ok(())
                            })
                            .await;
                        match written {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!("failed to persist update: {e}"),
                            Err(e) => warn!("persistence writer task failed: {e}"),
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "persistence writer lagged behind store updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Writer { stop, task }
    }
}

#[async_trait]
impl PersistenceProvider for SqlitePersistence {
    async fn sync(&self) -> SessionResult<()> {
        let path = self.path.clone();
        let room = self.room_id.clone();
        let stored = tokio::task::spawn_blocking(move || -> SessionResult<Vec<Vec<u8>>> {
            let conn = open(&path)?;
            let mut stmt =
                conn.prepare("SELECT payload FROM doc_updates WHERE room = ?1 ORDER BY id")?;
            let rows = stmt.query_map([&room], |row| row.get::<_, Vec<u8>>(0))?;
            let mut payloads = Vec::new();
            for row in rows {
                payloads.push(row?);
            }
            Ok(payloads)
        })
        .await??;

        // an undecodable row loses that row, never the rows after it
        let mut replayed = 0;
        for payload in stored {
            match self.store.apply_update(&payload, UpdateOrigin::Persistence) {
                Ok(()) => replayed += 1,
                Err(e) => {
                    warn!(room = %self.room_id, "skipping undecodable persisted update: {e}");
                }
            }
        }
        debug!(room = %self.room_id, replayed, "replayed persisted updates");

        let writer = self.spawn_writer();
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
        Ok(())
    }

    async fn close(&self) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // compacting is only safe once replay completed: before that the
        // live document may lag the log, and a snapshot of it would erase
        // durable rows
        let Some(writer) = writer else {
            return;
        };
        let _ = writer.stop.send(());
        if let Err(e) = writer.task.await {
            warn!("persistence writer did not stop cleanly: {e}");
        }
        if let Err(e) = self.compact().await {
            warn!(room = %self.room_id, "failed to compact update log on close: {e}");
        }
    }
}

fn open(path: &Path) -> SessionResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS doc_updates (
             id      INTEGER PRIMARY KEY AUTOINCREMENT,
             room    TEXT NOT NULL,
             payload BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_doc_updates_room ON doc_updates(room);",
    )?;
    Ok(conn)
}

/// Factory producing [`SqlitePersistence`] providers over one database file.
pub struct SqliteFactory {
    path: PathBuf,
}

impl SqliteFactory {
    /// Creates a factory writing to the given database file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PersistenceFactory for SqliteFactory {
    fn create(
        &self,
        room_id: &str,
        store: Arc<ReplicatedStore>,
    ) -> SessionResult<Arc<dyn PersistenceProvider>> {
        Ok(Arc::new(SqlitePersistence::new(
            self.path.clone(),
            room_id,
            store,
        )))
    }
}
