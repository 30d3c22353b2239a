use schoolstore_core::db::Database;
use schoolstore_core::repo::config_repo::{
    container_id_key, ConfigStore, SqliteConfigStore, ACTIVE_SESSION_KEY,
};
use schoolstore_core::{Module, SchoolStore, SessionContext, SessionId, StoreConfig};
use std::sync::Arc;

fn session(value: &str) -> SessionId {
    SessionId::parse(value).unwrap()
}

fn store_with_db() -> (SchoolStore, SqliteConfigStore) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = SchoolStore::from_database(Arc::clone(&db), StoreConfig::default());
    (store, SqliteConfigStore::new(db))
}

#[test]
fn active_session_defaults_to_configured_session() {
    let (store, config) = store_with_db();
    assert_eq!(store.directory().active_session().unwrap(), session("2024-25"));

    config.set(ACTIVE_SESSION_KEY, "not a session!").unwrap();
    assert_eq!(store.directory().active_session().unwrap(), session("2024-25"));

    store.directory().set_active_session(&session("2025-26")).unwrap();
    assert_eq!(
        config.get(ACTIVE_SESSION_KEY).unwrap().as_deref(),
        Some("2025-26")
    );
}

#[test]
fn resolve_is_idempotent() {
    let (store, _) = store_with_db();
    let ctx = SessionContext::pinned(session("2024-25"));

    let first = store.directory().resolve(&ctx, Module::Students).unwrap();
    let second = store.directory().resolve(&ctx, Module::Students).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.module, Module::Students);
    assert_eq!(first.session, session("2024-25"));
}

#[test]
fn resolve_rediscovers_container_after_pointer_loss() {
    let (store, config) = store_with_db();
    let ctx = SessionContext::pinned(session("2024-25"));
    let original = store.directory().resolve(&ctx, Module::Fees).unwrap();

    let key = container_id_key(Module::Fees, ctx.session());
    assert!(config.remove(&key).unwrap());

    let healed = store.directory().resolve(&ctx, Module::Fees).unwrap();
    assert_eq!(healed.id, original.id);
    assert_eq!(config.get(&key).unwrap().as_deref(), Some(original.id.as_str()));
}

#[test]
fn resolve_replaces_stale_pointer() {
    let (store, config) = store_with_db();
    let ctx = SessionContext::pinned(session("2024-25"));
    let original = store.directory().resolve(&ctx, Module::Staff).unwrap();

    let key = container_id_key(Module::Staff, ctx.session());
    config.set(&key, "deleted-container-id").unwrap();

    let healed = store.directory().resolve(&ctx, Module::Staff).unwrap();
    assert_eq!(healed.id, original.id);
    assert_eq!(config.get(&key).unwrap().as_deref(), Some(original.id.as_str()));
}

#[test]
fn sessions_resolve_to_distinct_containers() {
    let (store, _) = store_with_db();
    let old = SessionContext::pinned(session("2024-25"));
    let new = SessionContext::pinned(session("2025-26"));

    let old_container = store.directory().resolve(&old, Module::Students).unwrap();
    let new_container = store.directory().resolve(&new, Module::Students).unwrap();
    assert_ne!(old_container.id, new_container.id);
    assert_ne!(
        store.directory().session_folder(&old).unwrap(),
        store.directory().session_folder(&new).unwrap()
    );
}

#[test]
fn find_existing_never_provisions() {
    let (store, _) = store_with_db();
    let ctx = SessionContext::pinned(session("2030-31"));

    assert!(store
        .directory()
        .find_existing(&ctx, Module::Results)
        .unwrap()
        .is_none());

    let created = store.directory().resolve(&ctx, Module::Results).unwrap();
    let found = store
        .directory()
        .find_existing(&ctx, Module::Results)
        .unwrap()
        .unwrap();
    assert_eq!(found, created);
}

#[test]
fn asset_folders_are_shared_across_sessions() {
    let (store, _) = store_with_db();
    let photos = store.directory().asset_folder("student_photos").unwrap();
    assert_eq!(store.directory().asset_folder(" student_photos ").unwrap(), photos);
    assert_ne!(store.directory().asset_folder("receipts").unwrap(), photos);
    assert!(store.directory().asset_folder("  ").is_err());
}
