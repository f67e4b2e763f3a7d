use std::sync::Arc;

use grid_editor::backend::memory::{BackendCall, InMemoryBackend};
use grid_editor::config::config::Config;
use grid_editor::config::preferences::{GridPreferences, MemoryPreferencesStore, PreferencesStore};
use grid_editor::data::cell_value::CellValue;
use grid_editor::data::column::{
    default_columns, ColumnId, ColumnLayout, ColumnType, FieldSource, NewColumnConfig,
    PROTECTED_COLUMN_IDS,
};
use grid_editor::data::row::Row;
use grid_editor::notifications::RecordingNotifier;
use grid_editor::{GridError, GridSession, SessionServices};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

fn create_rows() -> Vec<Row> {
    (0..10)
        .map(|i| Row::new(format!("r{}", i)).with_field("company", CellValue::Text(format!("Co {}", i))))
        .collect()
}

/// Session reading its layout from `preferences`
fn create_session_with(
    preferences: Arc<MemoryPreferencesStore>,
) -> (GridSession, Arc<InMemoryBackend>, RecordingNotifier) {
    let backend = Arc::new(InMemoryBackend::new(create_rows()));
    let notifier = RecordingNotifier::new();
    let services = SessionServices {
        backend: backend.clone(),
        row_source: backend.clone(),
        preferences,
        notifier: Arc::new(notifier.clone()),
        deleter: None,
    };
    let session = GridSession::new(&fast_config(), services, create_rows());
    (session, backend, notifier)
}

fn four_column_preferences() -> Arc<MemoryPreferencesStore> {
    let store = Arc::new(MemoryPreferencesStore::new());
    let layout = ColumnLayout::new(default_columns().into_iter().take(4).collect());
    GridPreferences::save_layout(&*store, &layout).unwrap();
    store
}

fn permutations(ids: &[ColumnId]) -> Vec<Vec<ColumnId>> {
    if ids.len() <= 1 {
        return vec![ids.to_vec()];
    }
    let mut all = Vec::new();
    for i in 0..ids.len() {
        let mut rest = ids.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            all.push(tail);
        }
    }
    all
}

fn ids(list: &[&str]) -> Vec<ColumnId> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_every_permutation_becomes_the_visible_order() {
    let (mut session, backend, _) = create_session_with(four_column_preferences());
    let original = session.state().columns().visible_ids();
    assert_eq!(original.len(), 4);

    let orders = permutations(&original);
    assert_eq!(orders.len(), 24);
    for order in &orders {
        session.reorder_columns(order).await.unwrap();
        assert_eq!(&session.state().columns().visible_ids(), order);
    }
    assert_eq!(backend.call_count(BackendCall::SaveLayout), 24);
    assert_eq!(session.history().undo_len(), 24);
}

#[tokio::test]
async fn test_non_permutations_leave_layout_unchanged() {
    let (mut session, backend, _) = create_session_with(four_column_preferences());
    let before = session.state().columns().clone();

    let invalid = [
        ids(&["name", "company", "status"]),
        ids(&["name", "company", "status", "status"]),
        ids(&["name", "company", "status", "website"]),
        ids(&["name", "company", "status", "priority", "owner"]),
        Vec::new(),
    ];
    for order in &invalid {
        let err = session.reorder_columns(order).await.unwrap_err();
        assert!(matches!(err, GridError::Validation(_)), "{:?}", order);
        assert_eq!(session.state().columns(), &before);
    }
    assert_eq!(backend.call_count(BackendCall::SaveLayout), 0);
    assert!(!session.history().can_undo());
    assert!(session.state().column_loading().is_none());
}

#[tokio::test]
async fn test_protected_columns_cannot_be_deleted() {
    let (mut session, backend, notifier) = create_session_with(Arc::new(MemoryPreferencesStore::new()));

    for id in PROTECTED_COLUMN_IDS {
        let err = session.delete_column(id).await.unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
        assert!(session.state().columns().visible_position(id).is_some());
    }
    assert_eq!(notifier.errors().len(), PROTECTED_COLUMN_IDS.len());
    assert_eq!(backend.call_count(BackendCall::SaveLayout), 0);
}

#[tokio::test]
async fn test_deleted_column_stays_gone_across_sessions() {
    let preferences = Arc::new(MemoryPreferencesStore::new());
    {
        let (mut session, _, _) = create_session_with(preferences.clone());
        session.delete_column("website").await.unwrap();
        session.reset_columns().await.unwrap();
        assert!(session.state().column("website").is_none());
    }

    GridPreferences::reset_columns(&*preferences).unwrap();
    let (session, _, _) = create_session_with(preferences.clone());
    assert!(session.state().column("website").is_none());
    assert!(session.state().columns().deleted.contains("website"));
    assert!(preferences
        .get("grid.columns.deleted")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_added_column_does_not_reuse_a_deleted_id() {
    let (mut session, _, _) = create_session_with(Arc::new(MemoryPreferencesStore::new()));
    session.delete_column("website").await.unwrap();

    let id = session
        .add_column(Some("company"), "Website", ColumnType::Url, NewColumnConfig::default())
        .await
        .unwrap();

    assert_ne!(id, "website");
    assert_eq!(session.state().columns().visible_position(&id), Some(2));
    assert_eq!(session.state().column(&id).unwrap().source, FieldSource::Custom);
}

#[tokio::test]
async fn test_failed_column_save_rolls_back() {
    let (mut session, backend, notifier) = create_session_with(Arc::new(MemoryPreferencesStore::new()));
    backend.fail_next(BackendCall::SaveLayout, GridError::terminal("forbidden"));
    let before = session.state().columns().clone();

    let err = session.hide_column("company").await.unwrap_err();

    assert!(matches!(err, GridError::Terminal(_)));
    assert_eq!(session.state().columns(), &before);
    assert!(!session.history().can_undo());
    assert_eq!(backend.call_count(BackendCall::SaveLayout), 1);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_hidden_column_keeps_its_configuration() {
    let (mut session, _, _) = create_session_with(Arc::new(MemoryPreferencesStore::new()));
    session.resize_column("owner", 240).unwrap();
    session.rename_column("owner", "Account Owner").await.unwrap();

    session.hide_column("owner").await.unwrap();
    assert!(session.state().columns().hidden_position("owner").is_some());

    session.unhide_column("owner").await.unwrap();
    let owner = session.state().column("owner").unwrap();
    assert_eq!(owner.width, 240);
    assert_eq!(owner.title, "Account Owner");
}

#[tokio::test]
async fn test_undo_of_delete_is_persisted() {
    let preferences = Arc::new(MemoryPreferencesStore::new());
    let (mut session, backend, _) = create_session_with(preferences.clone());
    session.delete_column("website").await.unwrap();

    assert!(session.undo().await);
    assert!(session.state().columns().visible_position("website").is_some());
    assert!(!session.state().columns().deleted.contains("website"));
    let stored = backend.stored_layout().unwrap();
    assert!(stored.visible_position("website").is_some());
    assert!(!stored.deleted.contains("website"));
    assert_eq!(backend.call_count(BackendCall::SaveLayout), 2);

    // redo deletes it again, persisted the same way
    assert!(session.redo().await);
    assert!(session.state().column("website").is_none());
    assert!(backend.stored_layout().unwrap().deleted.contains("website"));
    assert!(session.undo().await);
    assert_eq!(backend.call_count(BackendCall::SaveLayout), 4);

    // a reset and a fresh session agree with the restored model
    session.reset_columns().await.unwrap();
    assert!(session.state().column("website").is_some());
    let (reloaded, _, _) = create_session_with(preferences.clone());
    assert!(reloaded.state().column("website").is_some());
    assert!(!GridPreferences::load(&*preferences)
        .unwrap()
        .deleted_column_ids
        .contains("website"));
}

#[tokio::test]
async fn test_undo_is_reverted_when_layout_save_fails() {
    let (mut session, backend, notifier) = create_session_with(Arc::new(MemoryPreferencesStore::new()));
    session.delete_column("website").await.unwrap();
    let deleted = session.state().columns().clone();
    backend.fail_next(BackendCall::SaveLayout, GridError::terminal("forbidden"));

    assert!(!session.undo().await);

    assert_eq!(session.state().columns(), &deleted);
    assert!(session.history().can_undo());
    assert!(!session.history().can_redo());
    assert!(backend.stored_layout().unwrap().deleted.contains("website"));
    assert_eq!(notifier.errors().len(), 1);
}
