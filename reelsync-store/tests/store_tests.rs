use pretty_assertions::assert_eq;
use reelsync_store::{
    PreferencesHandle, ReplicatedStore, Repository, Subscriptions, UpdateOrigin,
};
use reelsync_types::{Playlist, Preferences, PreferencesUpdate};
use serde_json::json;
use std::sync::Arc;

fn playlist(id: &str, name: &str) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: name.to_string(),
        ..Playlist::default()
    }
}

/// One round of bidirectional state-vector/diff exchange.
fn sync_pair(a: &ReplicatedStore, b: &ReplicatedStore) {
    let to_b = a.diff(&b.state_vector()).unwrap();
    let to_a = b.diff(&a.state_vector()).unwrap();
    b.apply_update(&to_b, UpdateOrigin::Peer).unwrap();
    a.apply_update(&to_a, UpdateOrigin::Peer).unwrap();
}

// ── Change notifications ─────────────────────────────────────────

#[test]
fn local_writes_publish_local_updates() {
    let store = Arc::new(ReplicatedStore::new());
    let mut rx = store.subscribe();
    let repo: Repository<Playlist> = Repository::new(store.clone());

    repo.create(&playlist("p1", "Jazz"));

    let update = rx.try_recv().unwrap();
    assert_eq!(update.origin, UpdateOrigin::Local);
    assert!(!update.payload.is_empty());
}

#[test]
fn noop_transactions_publish_nothing() {
    let store = Arc::new(ReplicatedStore::new());
    let repo: Repository<Playlist> = Repository::new(store.clone());
    repo.create(&playlist("p1", "Jazz"));

    let mut rx = store.subscribe();
    assert_eq!(repo.delete(|p| p.name == "Polka"), None);
    assert!(rx.try_recv().is_err());
}

#[test]
fn applied_updates_republish_under_their_origin() {
    let a = Arc::new(ReplicatedStore::with_client_id(1));
    let b = ReplicatedStore::with_client_id(2);
    let repo: Repository<Playlist> = Repository::new(a.clone());
    repo.create(&playlist("p1", "Jazz"));

    let mut rx = b.subscribe();
    let diff = a.diff(&b.state_vector()).unwrap();
    b.apply_update(&diff, UpdateOrigin::Persistence).unwrap();

    let update = rx.try_recv().unwrap();
    assert_eq!(update.origin, UpdateOrigin::Persistence);
    assert_eq!(update.payload, diff);
}

// ── Convergence ──────────────────────────────────────────────────

#[test]
fn replicas_converge_after_diff_exchange() {
    let a = Arc::new(ReplicatedStore::with_client_id(1));
    let b = Arc::new(ReplicatedStore::with_client_id(2));

    let repo_a: Repository<Playlist> = Repository::new(a.clone());
    let repo_b: Repository<Playlist> = Repository::new(b.clone());
    repo_a.create(&playlist("pa", "From A"));
    repo_b.create(&playlist("pb", "From B"));
    Subscriptions::new(a.clone()).add("channel-a");
    PreferencesHandle::new(b.clone()).apply(&PreferencesUpdate::volume(0.25));

    sync_pair(&a, &b);

    assert_eq!(a.export_json(), b.export_json());
    assert_eq!(repo_a.len(), 2);
    assert!(Subscriptions::new(b.clone()).contains("channel-a"));
    assert_eq!(PreferencesHandle::new(a).get().volume, 0.25);
}

#[test]
fn update_application_is_idempotent() {
    let a = Arc::new(ReplicatedStore::with_client_id(1));
    let b = Arc::new(ReplicatedStore::with_client_id(2));
    let repo_a: Repository<Playlist> = Repository::new(a.clone());
    repo_a.create(&playlist("p1", "Jazz"));

    let full = a.encode_full();
    b.apply_update(&full, UpdateOrigin::Peer).unwrap();
    b.apply_update(&full, UpdateOrigin::Peer).unwrap();

    let repo_b: Repository<Playlist> = Repository::new(b);
    assert_eq!(repo_b.len(), 1);
}

#[test]
fn apply_update_rejects_garbage() {
    let store = ReplicatedStore::new();
    assert!(store.apply_update(&[0xff, 0x13, 0x37], UpdateOrigin::Peer).is_err());
    assert!(store.diff(&[0xff]).is_err());
}

// ── Backup & restore ─────────────────────────────────────────────

#[test]
fn export_import_round_trip() {
    let a = Arc::new(ReplicatedStore::new());
    let repo: Repository<Playlist> = Repository::new(a.clone());
    repo.create(&playlist("p1", "Jazz"));
    Subscriptions::new(a.clone()).add("channel-a");
    PreferencesHandle::new(a.clone()).set(&Preferences {
        muted: true,
        ..Preferences::default()
    });

    let snapshot = a.export_json();
    let b = Arc::new(ReplicatedStore::new());
    let imported = b.import_json(&snapshot).unwrap();

    assert_eq!(imported, 2);
    assert_eq!(b.export_json(), snapshot);
}

#[test]
fn import_skips_duplicate_subscriptions() {
    let store = Arc::new(ReplicatedStore::new());
    let subs = Subscriptions::new(store.clone());
    subs.add("kept");

    let imported = store
        .import_json(&json!({ "subscriptions": ["kept", "new"] }))
        .unwrap();

    assert_eq!(imported, 1);
    assert_eq!(subs.all(), vec!["kept".to_string(), "new".to_string()]);
}

#[test]
fn import_rejects_malformed_snapshots() {
    let store = ReplicatedStore::new();
    assert!(store.import_json(&json!("not an object")).is_err());
    assert!(store.import_json(&json!({ "playlists": 42 })).is_err());
    assert!(store.import_json(&json!({ "preferences": [] })).is_err());
}

#[test]
fn import_tolerates_missing_sections() {
    let store = ReplicatedStore::new();
    let imported = store.import_json(&json!({ "playlists": [] })).unwrap();
    assert_eq!(imported, 0);
}

#[test]
fn clear_empties_all_collections() {
    let store = Arc::new(ReplicatedStore::new());
    let repo: Repository<Playlist> = Repository::new(store.clone());
    repo.create(&playlist("p1", "Jazz"));
    Subscriptions::new(store.clone()).add("channel-a");
    PreferencesHandle::new(store.clone()).set(&Preferences {
        volume: 0.5,
        ..Preferences::default()
    });

    store.clear();

    assert!(repo.is_empty());
    assert!(Subscriptions::new(store.clone()).is_empty());
    // cleared preferences read back as defaults
    assert_eq!(PreferencesHandle::new(store).get(), Preferences::default());
}

// ── Subscriptions ────────────────────────────────────────────────

#[test]
fn subscriptions_refuse_duplicates_and_empties() {
    let store = Arc::new(ReplicatedStore::new());
    let subs = Subscriptions::new(store);

    assert!(subs.add("channel-a"));
    assert!(!subs.add("channel-a"));
    assert!(!subs.add(""));
    assert_eq!(subs.len(), 1);
}

#[test]
fn subscriptions_add_many_dedupes() {
    let store = Arc::new(ReplicatedStore::new());
    let subs = Subscriptions::new(store);
    subs.add("existing");

    let added = subs.add_many(&[
        "existing".to_string(),
        "new-1".to_string(),
        "new-1".to_string(),
        "new-2".to_string(),
        String::new(),
    ]);

    assert_eq!(added, 2);
    assert_eq!(
        subs.all(),
        vec![
            "existing".to_string(),
            "new-1".to_string(),
            "new-2".to_string()
        ]
    );
}

#[test]
fn subscriptions_remove_and_remove_matching() {
    let store = Arc::new(ReplicatedStore::new());
    let subs = Subscriptions::new(store);
    subs.add_many(&[
        "music-a".to_string(),
        "music-b".to_string(),
        "news".to_string(),
    ]);

    assert!(subs.remove("news"));
    assert!(!subs.remove("news"));
    assert_eq!(subs.remove_matching(|c| c.starts_with("music-")), 2);
    assert!(subs.is_empty());
}

#[test]
fn subscriptions_clear() {
    let store = Arc::new(ReplicatedStore::new());
    let subs = Subscriptions::new(store);
    subs.add("channel-a");
    subs.clear();
    assert!(subs.is_empty());
}

// ── Preferences ──────────────────────────────────────────────────

#[test]
fn preferences_default_until_written() {
    let store = Arc::new(ReplicatedStore::new());
    let prefs = PreferencesHandle::new(store);
    assert_eq!(prefs.get(), Preferences::default());
}

#[test]
fn preferences_set_then_get() {
    let store = Arc::new(ReplicatedStore::new());
    let prefs = PreferencesHandle::new(store);

    let wanted = Preferences {
        autoplay: true,
        volume: 0.5,
        quality: "1080p".to_string(),
        ..Preferences::default()
    };
    prefs.set(&wanted);
    assert_eq!(prefs.get(), wanted);
}

#[test]
fn preferences_apply_patches_only_named_fields() {
    let store = Arc::new(ReplicatedStore::new());
    let prefs = PreferencesHandle::new(store);
    prefs.set(&Preferences {
        quality: "1080p".to_string(),
        ..Preferences::default()
    });

    prefs.apply(&PreferencesUpdate::speed(1.5));

    let current = prefs.get();
    assert_eq!(current.speed, 1.5);
    assert_eq!(current.quality, "1080p");
}

#[test]
fn empty_preferences_patch_publishes_nothing() {
    let store = Arc::new(ReplicatedStore::new());
    let mut rx = store.subscribe();
    let prefs = PreferencesHandle::new(store.clone());

    prefs.apply(&PreferencesUpdate::default());
    assert!(rx.try_recv().is_err());
}
