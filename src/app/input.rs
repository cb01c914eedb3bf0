use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key press means to the record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCommand {
    Move(i64),
    PageUp,
    PageDown,
    First,
    Last,
    Activate,
    Collapse,
    Expand,
    Refresh,
    New,
    Copy,
    Delete,
    None,
}

pub fn classify(key: &KeyEvent) -> ListCommand {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('n') | KeyCode::Char('N') => ListCommand::New,
            KeyCode::Char('d') | KeyCode::Char('D') => ListCommand::Copy,
            KeyCode::Char('r') | KeyCode::Char('R') => ListCommand::Refresh,
            KeyCode::Home => ListCommand::First,
            KeyCode::End => ListCommand::Last,
            _ => ListCommand::None,
        };
    }

    match key.code {
        KeyCode::Down => ListCommand::Move(1),
        KeyCode::Up => ListCommand::Move(-1),
        KeyCode::PageDown => ListCommand::PageDown,
        KeyCode::PageUp => ListCommand::PageUp,
        KeyCode::Home => ListCommand::First,
        KeyCode::End => ListCommand::Last,
        KeyCode::Enter => ListCommand::Activate,
        KeyCode::Left => ListCommand::Collapse,
        KeyCode::Right => ListCommand::Expand,
        KeyCode::F(5) => ListCommand::Refresh,
        KeyCode::Delete => ListCommand::Delete,
        _ => ListCommand::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_and_function_keys() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(classify(&key(KeyCode::Down)), ListCommand::Move(1));
        assert_eq!(classify(&key(KeyCode::Up)), ListCommand::Move(-1));
        assert_eq!(classify(&key(KeyCode::Enter)), ListCommand::Activate);
        assert_eq!(classify(&key(KeyCode::F(5))), ListCommand::Refresh);
        assert_eq!(classify(&key(KeyCode::Char('x'))), ListCommand::None);
        assert_eq!(
            classify(&KeyEvent::new(KeyCode::Char('n'), KeyModifiers::CONTROL)),
            ListCommand::New
        );
    }
}
