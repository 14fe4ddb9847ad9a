use pretty_assertions::assert_eq;
use reelsync_session::providers::{SqliteFactory, SqlitePersistence};
use reelsync_session::{PersistenceFactory, PersistenceProvider};
use reelsync_store::{ReplicatedStore, Repository, UpdateOrigin};
use reelsync_types::Playlist;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn playlist(id: &str, name: &str) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: name.to_string(),
        ..Playlist::default()
    }
}

fn update_rows(db: &Path, room: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM doc_updates WHERE room = ?1",
        [room],
        |row| row.get(0),
    )
    .unwrap()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Replay ───────────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_provider_lifetimes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");
    let factory = SqliteFactory::new(&db);

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("movie-night", store.clone()).unwrap();
    provider.sync().await.unwrap();
    let repo: Repository<Playlist> = Repository::new(store);
    repo.create(&playlist("p1", "Jazz"));
    provider.close().await;

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("movie-night", store.clone()).unwrap();
    provider.sync().await.unwrap();

    let repo: Repository<Playlist> = Repository::new(store);
    assert_eq!(repo.len(), 1);
    assert_eq!(repo.find_unique("p1").unwrap().name, "Jazz");
}

#[tokio::test]
async fn replay_is_idempotent_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");
    let factory = SqliteFactory::new(&db);

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("movie-night", store.clone()).unwrap();
    provider.sync().await.unwrap();
    Repository::<Playlist>::new(store).create(&playlist("p1", "Jazz"));
    provider.close().await;

    for _ in 0..2 {
        let store = Arc::new(ReplicatedStore::new());
        let provider = factory.create("movie-night", store.clone()).unwrap();
        provider.sync().await.unwrap();
        provider.close().await;
        assert_eq!(Repository::<Playlist>::new(store).len(), 1);
    }
}

#[tokio::test]
async fn peer_origin_updates_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");
    let factory = SqliteFactory::new(&db);

    // remote replica state arrives as a peer update
    let remote = Arc::new(ReplicatedStore::new());
    Repository::<Playlist>::new(remote.clone()).create(&playlist("p1", "From peer"));

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("movie-night", store.clone()).unwrap();
    provider.sync().await.unwrap();
    store
        .apply_update(&remote.encode_full(), UpdateOrigin::Peer)
        .unwrap();
    provider.close().await;

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("movie-night", store.clone()).unwrap();
    provider.sync().await.unwrap();
    assert_eq!(Repository::<Playlist>::new(store).len(), 1);
}

#[tokio::test]
async fn rooms_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");
    let factory = SqliteFactory::new(&db);

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("room-a", store.clone()).unwrap();
    provider.sync().await.unwrap();
    Repository::<Playlist>::new(store).create(&playlist("p1", "Jazz"));
    provider.close().await;

    let store = Arc::new(ReplicatedStore::new());
    let provider = factory.create("room-b", store.clone()).unwrap();
    provider.sync().await.unwrap();
    assert_eq!(Repository::<Playlist>::new(store).len(), 0);
}

#[tokio::test]
async fn replay_skips_undecodable_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");

    // one valid snapshot row written the normal way
    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store.clone());
    provider.sync().await.unwrap();
    Repository::<Playlist>::new(store).create(&playlist("p1", "Jazz"));
    provider.close().await;

    // a corrupt row lands in the log, followed by another valid one
    let remote = Arc::new(ReplicatedStore::new());
    Repository::<Playlist>::new(remote.clone()).create(&playlist("p2", "Rock"));
    let conn = Connection::open(&db).unwrap();
    conn.execute(
        "INSERT INTO doc_updates (room, payload) VALUES (?1, ?2)",
        params!["movie-night", vec![0xffu8, 0x13, 0x37]],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO doc_updates (room, payload) VALUES (?1, ?2)",
        params!["movie-night", remote.encode_full()],
    )
    .unwrap();
    drop(conn);

    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store.clone());
    provider.sync().await.unwrap();

    // only the corrupt row is lost; everything around it replays
    let repo = Repository::<Playlist>::new(store);
    assert_eq!(repo.len(), 2);
    assert_eq!(repo.find_unique("p1").unwrap().name, "Jazz");
    assert_eq!(repo.find_unique("p2").unwrap().name, "Rock");
}

#[tokio::test]
async fn close_before_replay_leaves_log_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");

    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store.clone());
    provider.sync().await.unwrap();
    Repository::<Playlist>::new(store).create(&playlist("p1", "Jazz"));
    provider.close().await;
    assert_eq!(update_rows(&db, "movie-night"), 1);

    // a provider that never replayed must not compact the log away
    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store);
    provider.close().await;
    assert_eq!(update_rows(&db, "movie-night"), 1);

    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store.clone());
    provider.sync().await.unwrap();
    assert_eq!(Repository::<Playlist>::new(store).len(), 1);
}

// ── Writer & compaction ──────────────────────────────────────────

#[tokio::test]
async fn writer_tails_live_updates() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");

    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store.clone());
    provider.sync().await.unwrap();

    let repo: Repository<Playlist> = Repository::new(store);
    repo.create(&playlist("p1", "Jazz"));
    repo.create(&playlist("p2", "Rock"));

    wait_until(|| update_rows(&db, "movie-night") == 2).await;
}

#[tokio::test]
async fn close_compacts_to_one_snapshot_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reelsync.db");

    let store = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", store.clone());
    provider.sync().await.unwrap();

    let repo: Repository<Playlist> = Repository::new(store.clone());
    for i in 0..5 {
        repo.create(&playlist(&format!("p{i}"), "Jazz"));
    }
    provider.close().await;

    assert_eq!(update_rows(&db, "movie-night"), 1);

    let reopened = Arc::new(ReplicatedStore::new());
    let provider = SqlitePersistence::new(&db, "movie-night", reopened.clone());
    provider.sync().await.unwrap();
    assert_eq!(Repository::<Playlist>::new(reopened).len(), 5);
}
