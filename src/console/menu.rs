use std::fmt;

/// Commands offered by the main menu, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    /// Print every game grouped by creator.
    ListAll,
    /// Run a SQL-like query.
    Query,
    /// Fetch one page, optionally resuming from a token.
    Paginate,
    /// Create a game creator with one video game.
    Insert,
    /// Edit an existing record.
    Update,
    /// Remove a record.
    Delete,
    /// Case-insensitive substring search.
    Search,
    /// List every record ordered by a field.
    Sort,
    /// Leave the menu.
    Exit,
}

impl MenuCommand {
    /// Every command in menu order.
    pub const ALL: [MenuCommand; 9] = [
        MenuCommand::ListAll,
        MenuCommand::Query,
        MenuCommand::Paginate,
        MenuCommand::Insert,
        MenuCommand::Update,
        MenuCommand::Delete,
        MenuCommand::Search,
        MenuCommand::Sort,
        MenuCommand::Exit,
    ];

    /// One-based position in the menu.
    pub fn number(self) -> usize {
        Self::ALL
            .iter()
            .position(|command| *command == self)
            .map_or(0, |index| index + 1)
    }

    fn label(self) -> &'static str {
        match self {
            MenuCommand::ListAll => "List all games",
            MenuCommand::Query => "Run SQL query (blank for the Ubisoft demo)",
            MenuCommand::Paginate => "Get games using pagination",
            MenuCommand::Insert => "Insert game",
            MenuCommand::Update => "Update game",
            MenuCommand::Delete => "Delete game",
            MenuCommand::Search => "Search games by name, location or game",
            MenuCommand::Sort => "Sort games",
            MenuCommand::Exit => "Exit",
        }
    }

    /// Parse a menu choice; spaces anywhere in the input are ignored.
    pub fn parse(input: &str) -> Option<Self> {
        let choice: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        let number = choice.parse::<usize>().ok()?;
        number
            .checked_sub(1)
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }
}

impl fmt::Display for MenuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.label())
    }
}

/// Full menu text followed by the choice prompt.
pub fn menu_text() -> String {
    let mut text: String = MenuCommand::ALL
        .iter()
        .map(|command| format!("{command}\n"))
        .collect();
    text.push_str("\nEnter your choice: ");
    text
}
