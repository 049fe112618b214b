use crate::domain::Direction;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

/// Represents the result of handling a key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Quit the application
    Quit,
    /// Move to next card
    Next,
    /// Move to previous card
    Previous,
    /// Like or unlike the current card
    ToggleLike,
    /// Open the current article in the browser
    OpenArticle,
    /// Show or hide the liked items panel
    ToggleLikedPanel,
    /// Switch to the next content language
    CycleLanguage,
    /// Toggle help overlay
    Help,
    /// No action
    None,
}

/// Pointer input relevant to the gesture tracker, in terminal rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Press(u16),
    Drag(u16),
    Release,
    /// Wheel steps commit immediately
    Scroll(Direction),
    None,
}

/// Maps keyboard events to actions
pub fn handle_key_event(key: KeyEvent) -> KeyAction {
    match (key.code, key.modifiers) {
        // Quit: q, Esc or Ctrl+C
        (KeyCode::Char('q'), KeyModifiers::NONE) => KeyAction::Quit,
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => KeyAction::Quit,
        (KeyCode::Esc, KeyModifiers::NONE) => KeyAction::Quit,

        // Navigation
        (KeyCode::Down, KeyModifiers::NONE) => KeyAction::Next,
        (KeyCode::Char('j'), KeyModifiers::NONE) => KeyAction::Next,
        (KeyCode::Char(' '), KeyModifiers::NONE) => KeyAction::Next,
        (KeyCode::Up, KeyModifiers::NONE) => KeyAction::Previous,
        (KeyCode::Char('k'), KeyModifiers::NONE) => KeyAction::Previous,

        (KeyCode::Char('l'), KeyModifiers::NONE) => KeyAction::ToggleLike,
        (KeyCode::Char('o'), KeyModifiers::NONE) => KeyAction::OpenArticle,
        (KeyCode::Enter, KeyModifiers::NONE) => KeyAction::OpenArticle,
        (KeyCode::Char('p'), KeyModifiers::NONE) => KeyAction::ToggleLikedPanel,
        (KeyCode::Char('g'), KeyModifiers::NONE) => KeyAction::CycleLanguage,

        // Help: ?
        (KeyCode::Char('?'), _) => KeyAction::Help,

        _ => KeyAction::None,
    }
}

/// Maps mouse events to pointer actions. Only the left button drags.
pub fn handle_mouse_event(event: MouseEvent) -> PointerAction {
    match event.kind {
        MouseEventKind::Down(MouseButton::Left) => PointerAction::Press(event.row),
        MouseEventKind::Drag(MouseButton::Left) => PointerAction::Drag(event.row),
        MouseEventKind::Up(MouseButton::Left) => PointerAction::Release,
        MouseEventKind::ScrollDown => PointerAction::Scroll(Direction::Forward),
        MouseEventKind::ScrollUp => PointerAction::Scroll(Direction::Backward),
        _ => PointerAction::None,
    }
}
