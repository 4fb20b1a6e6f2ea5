//! Menu and Console State
//!
//! What the renderer draws outside the field view: a list of selectable
//! options with a cursor, a free-text input buffer and a scrolling console.

/// Console keeps only this many trailing lines.
pub const CONSOLE_LINES: usize = 24;

/// What choosing a menu option does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    /// Begin character creation.
    NewOfficer,
    /// Submit the current creation prompt.
    SubmitCreation,
    /// Enter the game with the freshly created entity.
    StartGame,
    /// Deploy to the field.
    Deploy,
    /// Base menu entry with no transition.
    CaseFiles,
    /// Base menu entry with no transition.
    Personnel,
    /// Base menu entry with no transition.
    Research,
    /// Base menu entry with no transition.
    Armory,
    /// Base menu entry with no transition.
    Cafeteria,
}

/// A labelled menu entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuOption {
    /// Display label
    pub label: String,
    /// Selection effect
    pub action: MenuAction,
}

impl MenuOption {
    /// Create an option.
    pub fn new(label: impl Into<String>, action: MenuAction) -> Self {
        Self { label: label.into(), action }
    }
}

/// Menu, cursor and text input.
#[derive(Clone, Debug, Default)]
pub struct UiState {
    options: Vec<MenuOption>,
    cursor: usize,
    /// UI overlay hidden
    pub hidden: bool,
    input: String,
}

impl UiState {
    /// Replace the options and reset the cursor.
    pub fn set_menu(&mut self, options: Vec<MenuOption>) {
        self.options = options;
        self.cursor = 0;
    }

    /// Remove every option.
    pub fn clear(&mut self) {
        self.options.clear();
        self.cursor = 0;
    }

    /// Current options.
    pub fn options(&self) -> &[MenuOption] {
        &self.options
    }

    /// Cursor index.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor down, wrapping.
    pub fn next(&mut self) {
        if !self.options.is_empty() {
            self.cursor = (self.cursor + 1) % self.options.len();
        }
    }

    /// Move the cursor up, wrapping.
    pub fn prev(&mut self) {
        if !self.options.is_empty() {
            self.cursor = (self.cursor + self.options.len() - 1) % self.options.len();
        }
    }

    /// Action under the cursor.
    pub fn select(&self) -> Option<MenuAction> {
        self.options.get(self.cursor).map(|o| o.action)
    }

    /// Append typed text.
    pub fn push_str(&mut self, text: &str) {
        self.input.push_str(text);
    }

    /// Delete the last typed character.
    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Current text input.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Take and clear the text input.
    pub fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }
}

/// Scrolling console text.
#[derive(Clone, Debug, Default)]
pub struct Console {
    text: String,
}

impl Console {
    /// Replace everything.
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.trim();
    }

    /// Append text.
    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
        self.trim();
    }

    /// Current text.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn trim(&mut self) {
        let lines = self.text.split('\n').count();
        if lines > CONSOLE_LINES {
            let skip = lines - CONSOLE_LINES;
            self.text = self.text.split('\n').skip(skip).collect::<Vec<_>>().join("\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_menu() -> UiState {
        let mut ui = UiState::default();
        ui.set_menu(vec![
            MenuOption::new("deploy", MenuAction::Deploy),
            MenuOption::new("armory", MenuAction::Armory),
        ]);
        ui
    }

    #[test]
    fn test_cursor_wraps() {
        let mut ui = base_menu();
        ui.prev();
        assert_eq!(ui.select(), Some(MenuAction::Armory));
        ui.next();
        assert_eq!(ui.select(), Some(MenuAction::Deploy));
    }

    #[test]
    fn test_empty_menu_selects_nothing() {
        let mut ui = UiState::default();
        ui.next();
        ui.prev();
        assert_eq!(ui.select(), None);
    }

    #[test]
    fn test_text_input() {
        let mut ui = UiState::default();
        ui.push_str("Ve");
        ui.push_str("x");
        ui.backspace();
        assert_eq!(ui.input(), "Ve");
        assert_eq!(ui.take_input(), "Ve");
        assert_eq!(ui.input(), "");
    }

    #[test]
    fn test_console_keeps_last_lines() {
        let mut console = Console::default();
        for i in 0..30 {
            console.append(&format!("line {}\n", i));
        }
        let text = console.text();
        assert_eq!(text.split('\n').count(), CONSOLE_LINES);
        assert!(text.starts_with("line 7\n"));
        assert!(text.ends_with("line 29\n"));
    }
}
