use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use grid_editor::backend::memory::{BackendCall, InMemoryBackend};
use grid_editor::config::config::Config;
use grid_editor::config::preferences::MemoryPreferencesStore;
use grid_editor::data::cell_value::CellValue;
use grid_editor::data::column::FieldPath;
use grid_editor::data::row::Row;
use grid_editor::grid_state::CellRef;
use grid_editor::notifications::{NotificationLevel, RecordingNotifier};
use grid_editor::services::bulk_operations::BulkMutation;
use grid_editor::ui::cell_interaction::{CommitOutcome, InteractionPhase, PopoverSide};
use grid_editor::{GridError, GridSession, SessionServices};

/// Config with millisecond retry delays so failing saves finish quickly
fn fast_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

fn create_deals(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            Row::new(format!("deal-{}", i))
                .with_field("name", CellValue::Text(format!("Deal {}", i)))
                .with_field("company", CellValue::Text(format!("Company {}", i)))
                .with_field("status", CellValue::Status("Lead".into()))
        })
        .collect()
}

fn create_session(rows: Vec<Row>) -> (GridSession, Arc<InMemoryBackend>, RecordingNotifier) {
    let backend = Arc::new(InMemoryBackend::new(rows.clone()));
    let notifier = RecordingNotifier::new();
    let services = SessionServices {
        backend: backend.clone(),
        row_source: backend.clone(),
        preferences: Arc::new(MemoryPreferencesStore::new()),
        notifier: Arc::new(notifier.clone()),
        deleter: None,
    };
    let mut session = GridSession::new(&fast_config(), services, rows);
    session.set_viewport(1200, 600);
    (session, backend, notifier)
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

async fn type_text(session: &mut GridSession, text: &str, now: Instant) {
    for ch in text.chars() {
        session.handle_key(&key(KeyCode::Char(ch)), now).await.unwrap();
    }
}

fn value(session: &GridSession, row: &str, column: &str) -> CellValue {
    session
        .state()
        .cell_value(&CellRef::new(row, column))
        .cloned()
        .unwrap_or_default()
}

#[tokio::test]
async fn test_bulk_status_won_clears_selection() {
    let (mut session, backend, _) = create_session(create_deals(5));
    for id in ["deal-1", "deal-2", "deal-3"] {
        assert!(session.select_row(id));
    }

    let affected = session
        .bulk_update(BulkMutation::Status("Won".into()))
        .await
        .unwrap();

    assert_eq!(affected, 3);
    assert!(session.state().selection().is_empty());
    for id in ["deal-1", "deal-2", "deal-3"] {
        assert_eq!(value(&session, id, "status"), CellValue::Status("Won".into()));
    }
    assert_eq!(value(&session, "deal-0", "status"), CellValue::Status("Lead".into()));
    assert_eq!(backend.call_count(BackendCall::BulkUpdate), 1);

    let status = FieldPath::Standard("status".into());
    let won = backend
        .rows()
        .iter()
        .filter(|r| r.get(&status) == &CellValue::Status("Won".into()))
        .count();
    assert_eq!(won, 3);
}

#[tokio::test]
async fn test_bulk_update_that_keeps_failing_keeps_selection() {
    let (mut session, backend, notifier) = create_session(create_deals(5));
    backend.fail_times(BackendCall::BulkUpdate, GridError::transient("gateway timeout"), 3);
    for id in ["deal-0", "deal-4"] {
        session.select_row(id);
    }

    let err = session
        .bulk_update(BulkMutation::Status("Won".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, GridError::Transient(_)));
    assert_eq!(backend.call_count(BackendCall::BulkUpdate), 3);
    for id in ["deal-0", "deal-4"] {
        assert_eq!(value(&session, id, "status"), CellValue::Status("Lead".into()));
    }
    assert_eq!(session.state().selection().len(), 2);
    assert!(!session.history().can_undo());
    let warnings = notifier
        .notifications()
        .iter()
        .filter(|n| n.level == NotificationLevel::Warning)
        .count();
    assert_eq!(warnings, 2);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_undo_before_saved_indicator_clears() {
    let (mut session, _, _) = create_session(create_deals(5));
    let cell = CellRef::new("deal-2", "company");
    let t0 = Instant::now();

    session.click(cell.clone());
    type_text(&mut session, "Wayne", t0).await;
    assert_eq!(session.phase(), InteractionPhase::Editing);
    session.handle_key(&key(KeyCode::Enter), t0).await.unwrap();

    assert_eq!(value(&session, "deal-2", "company"), CellValue::Text("Wayne".into()));
    assert_eq!(session.cells().saved_indicator(), Some(&cell));

    session
        .handle_key(&ctrl('z'), t0 + Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(value(&session, "deal-2", "company"), CellValue::Text("Company 2".into()));

    session
        .handle_key(
            &KeyEvent::new(KeyCode::Char('Z'), KeyModifiers::CONTROL | KeyModifiers::SHIFT),
            t0,
        )
        .await
        .unwrap();
    assert_eq!(value(&session, "deal-2", "company"), CellValue::Text("Wayne".into()));
}

#[tokio::test]
async fn test_date_popover_flips_above_near_bottom() {
    let (mut session, _, _) = create_session(create_deals(50));

    // header 40 + 7 rows of 36px: the cell ends at 328, leaving 272px below
    let low = CellRef::new("deal-7", "close_date");
    session.double_click(low.clone()).unwrap();
    let popover = session.cells().popover().cloned().unwrap();
    assert_eq!(popover.cell, low);
    assert_eq!(popover.placement.unwrap().side, PopoverSide::Above);

    // the cell ends at 256, leaving 344px below
    session.double_click(CellRef::new("deal-5", "close_date")).unwrap();
    let popover = session.cells().popover().cloned().unwrap();
    assert_eq!(popover.cell, CellRef::new("deal-5", "close_date"));
    assert_eq!(popover.placement.unwrap().side, PopoverSide::Below);

    session.handle_key(&key(KeyCode::Esc), Instant::now()).await.unwrap();
    assert!(session.cells().popover().is_none());
    assert_eq!(session.phase(), InteractionPhase::Active);
}

#[tokio::test]
async fn test_popover_choice_commits_value() {
    let (mut session, backend, _) = create_session(create_deals(3));
    session.double_click(CellRef::new("deal-0", "status")).unwrap();

    let outcome = session
        .choose_value(CellValue::Status("Qualified".into()), Instant::now())
        .await
        .unwrap();

    assert_eq!(outcome, Some(CommitOutcome::Saved));
    assert!(session.cells().popover().is_none());
    assert_eq!(value(&session, "deal-0", "status"), CellValue::Status("Qualified".into()));
    assert_eq!(backend.call_count(BackendCall::SaveCell), 1);
}

#[tokio::test]
async fn test_transient_save_failures_are_retried() {
    let (mut session, backend, notifier) = create_session(create_deals(3));
    backend.fail_times(BackendCall::SaveCell, GridError::transient("503"), 2);

    session.click(CellRef::new("deal-1", "company"));
    type_text(&mut session, "Initech", Instant::now()).await;
    let outcome = session.commit_edit(Instant::now()).await.unwrap();

    assert_eq!(outcome, Some(CommitOutcome::Saved));
    assert_eq!(backend.call_count(BackendCall::SaveCell), 3);
    let warnings = notifier
        .notifications()
        .into_iter()
        .filter(|n| n.level == NotificationLevel::Warning)
        .count();
    assert_eq!(warnings, 2);
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn test_terminal_save_failure_reverts_cell() {
    let (mut session, backend, notifier) = create_session(create_deals(3));
    backend.fail_next(BackendCall::SaveCell, GridError::terminal("permission denied"));

    session.click(CellRef::new("deal-1", "company"));
    type_text(&mut session, "Initech", Instant::now()).await;
    let outcome = session.commit_edit(Instant::now()).await.unwrap();

    assert!(matches!(outcome, Some(CommitOutcome::Reverted(GridError::Terminal(_)))));
    assert_eq!(backend.call_count(BackendCall::SaveCell), 1);
    assert_eq!(value(&session, "deal-1", "company"), CellValue::Text("Company 1".into()));
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn test_arrow_keys_move_active_cell() {
    let (mut session, _, _) = create_session(create_deals(3));
    let now = Instant::now();
    session.handle_key(&key(KeyCode::Down), now).await.unwrap();
    session.handle_key(&key(KeyCode::Right), now).await.unwrap();
    assert_eq!(
        session.state().active_cell(),
        Some(&CellRef::new("deal-1", "company"))
    );

    session.handle_key(&key(KeyCode::Up), now).await.unwrap();
    session.handle_key(&key(KeyCode::Up), now).await.unwrap();
    assert_eq!(
        session.state().active_cell(),
        Some(&CellRef::new("deal-0", "company"))
    );
}

#[tokio::test]
async fn test_render_window_uses_column_renderers() {
    let (session, _, _) = create_session(create_deals(200));
    let rendered = session.render_window();
    // 560px body / 36px rows = 16 visible rows plus 5 overscan below
    assert_eq!(rendered.len(), 21);
    let (column_id, node) = &rendered[0].cells[2];
    assert_eq!(column_id, "status");
    assert_eq!(node.plain_text(), "Lead");
}
