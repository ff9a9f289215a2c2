use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextController,
    PrevController,
    Down,
    Up,
    SelectPod,
    CycleContainer,
    ClearSelection,
    Refresh,
    LogsPageUp,
    LogsPageDown,
    FollowLogs,
    ToggleHelp,
}

pub fn map_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => Some(Action::NextController),
        KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => Some(Action::PrevController),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::Down),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::Up),
        KeyCode::Enter => Some(Action::SelectPod),
        KeyCode::Char('c') => Some(Action::CycleContainer),
        KeyCode::Esc => Some(Action::ClearSelection),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::PageUp => Some(Action::LogsPageUp),
        KeyCode::PageDown => Some(Action::LogsPageDown),
        KeyCode::Char('G') | KeyCode::End => Some(Action::FollowLogs),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        _ => None,
    }
}
