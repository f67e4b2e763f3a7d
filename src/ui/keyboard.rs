use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Grid-level meaning of a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAction {
    Undo,
    Redo,
    /// Close the popover / cancel the edit
    Escape,
    /// Start editing the active cell, or commit the current edit
    Enter,
    Type(char),
    Backspace,
    Delete,
    Move(Direction),
}

/// Ctrl on most platforms, Cmd (reported as SUPER) on macOS
fn has_command_modifier(modifiers: KeyModifiers) -> bool {
    modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER)
}

/// Map a key event to a grid action.
///
/// Undo/redo chords are resolved before anything else so they never reach
/// a cell editor as text.
pub fn map_key(event: &KeyEvent) -> Option<GridAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    if has_command_modifier(event.modifiers) {
        let shift = event.modifiers.contains(KeyModifiers::SHIFT);
        return match event.code {
            KeyCode::Char('z') | KeyCode::Char('Z') if shift => Some(GridAction::Redo),
            // some terminals report Shift+Z as uppercase without the SHIFT flag
            KeyCode::Char('Z') => Some(GridAction::Redo),
            KeyCode::Char('z') => Some(GridAction::Undo),
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(GridAction::Redo),
            _ => None,
        };
    }

    match event.code {
        KeyCode::Esc => Some(GridAction::Escape),
        KeyCode::Enter => Some(GridAction::Enter),
        KeyCode::Backspace => Some(GridAction::Backspace),
        KeyCode::Delete => Some(GridAction::Delete),
        KeyCode::Up => Some(GridAction::Move(Direction::Up)),
        KeyCode::Down => Some(GridAction::Move(Direction::Down)),
        KeyCode::Left => Some(GridAction::Move(Direction::Left)),
        KeyCode::Right => Some(GridAction::Move(Direction::Right)),
        KeyCode::Char(c) if !event.modifiers.contains(KeyModifiers::ALT) => Some(GridAction::Type(c)),
        _ => None,
    }
}
