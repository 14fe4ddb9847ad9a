use pretty_assertions::assert_eq;
use reelsync_session::SettingsStore;
use reelsync_types::RoomDescriptor;
use serde_json::{Value as JsonValue, json};

fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
    SettingsStore::new(dir.path().join("settings.json"))
}

#[test]
fn missing_file_loads_default() {
    let dir = tempfile::tempdir().unwrap();
    let settings = store_in(&dir);

    let room = settings.load_room().unwrap();
    assert_eq!(room, RoomDescriptor::default());
    assert!(!room.is_active());
}

#[test]
fn save_then_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let settings = store_in(&dir);

    let room = RoomDescriptor::new("movie-night")
        .with_password("secret")
        .with_name("alice");
    settings.save_room(&room).unwrap();

    assert_eq!(settings.load_room().unwrap(), room);
}

#[test]
fn save_preserves_unrelated_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "theme": "dark" }"#).unwrap();

    let settings = SettingsStore::new(&path);
    settings.save_room(&RoomDescriptor::new("movie-night")).unwrap();

    let raw: JsonValue = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["theme"], json!("dark"));
    assert_eq!(raw["room"]["id"], json!("movie-night"));
}

#[test]
fn null_room_key_loads_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "room": null }"#).unwrap();

    let settings = SettingsStore::new(&path);
    assert_eq!(settings.load_room().unwrap(), RoomDescriptor::default());
}

#[test]
fn corrupt_file_on_save_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "not json at all").unwrap();

    let settings = SettingsStore::new(&path);
    settings.save_room(&RoomDescriptor::new("movie-night")).unwrap();

    assert_eq!(
        settings.load_room().unwrap(),
        RoomDescriptor::new("movie-night")
    );
}

#[test]
fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/config/settings.json");

    let settings = SettingsStore::new(&path);
    settings.save_room(&RoomDescriptor::new("movie-night")).unwrap();

    assert!(path.exists());
}
