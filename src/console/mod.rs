//! Interactive menu driving the repository from a line-oriented terminal.

mod menu;
pub mod render;

use futures::{TryStreamExt, pin_mut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use validator::Validate;

use crate::{
    dao::{
        models::{Games, GamesSortField, VideoGame},
        query::SortDirection,
        repository::{PageRequest, SharedRepository, page_stream},
        storage::StorageError,
    },
    error::{ConsoleError, ConsoleResult},
};

pub use self::menu::{MenuCommand, menu_text};

/// Query run when the SQL prompt is left blank.
pub const DEMO_QUERY: &str = "SELECT * FROM c WHERE c.name = 'Ubisoft'";
/// Partition the demo query is scoped to.
pub const DEMO_PARTITION: &str = "Ubisoft";
/// Page size used while walking every page for the sort command.
const SORT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleState {
    Prompt,
    Terminate,
}

/// Menu loop over a [`SharedRepository`] of [`Games`].
///
/// Recoverable failures are printed and the loop keeps prompting; anything
/// else ends the session and is returned to the caller. End of input behaves
/// like the exit command. The repository is not closed here.
pub struct Console<R, W> {
    repository: SharedRepository<Games>,
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Session over `input` and `output` using `repository`.
    pub fn new(repository: SharedRepository<Games>, input: R, output: W) -> Self {
        Self {
            repository,
            input,
            output,
        }
    }

    /// Give back the output sink, e.g. to inspect a scripted session.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Prompt until the user exits or input ends.
    pub async fn run(&mut self) -> ConsoleResult<()> {
        let mut state = ConsoleState::Prompt;
        while state == ConsoleState::Prompt {
            self.write(&menu_text()).await?;
            let Some(choice) = self.read_line().await? else {
                break;
            };

            state = match self.dispatch(&choice).await {
                Ok(next) => next,
                Err(ConsoleError::EndOfInput) => ConsoleState::Terminate,
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "command failed");
                    self.write(&format!("Error: {err}\n")).await?;
                    ConsoleState::Prompt
                }
                Err(err) => return Err(err),
            };
            self.write("\n").await?;
        }
        debug!("console session finished");
        Ok(())
    }

    async fn dispatch(&mut self, choice: &str) -> ConsoleResult<ConsoleState> {
        let Some(command) = MenuCommand::parse(choice) else {
            self.write("Invalid option selected\n").await?;
            return Ok(ConsoleState::Prompt);
        };
        debug!(?command, "running menu command");

        match command {
            MenuCommand::ListAll => self.list_all().await?,
            MenuCommand::Query => self.run_query().await?,
            MenuCommand::Paginate => self.paginate().await?,
            MenuCommand::Insert => self.insert().await?,
            MenuCommand::Update => self.update().await?,
            MenuCommand::Delete => self.delete().await?,
            MenuCommand::Search => self.search().await?,
            MenuCommand::Sort => self.sort().await?,
            MenuCommand::Exit => return Ok(ConsoleState::Terminate),
        }
        Ok(ConsoleState::Prompt)
    }

    async fn list_all(&mut self) -> ConsoleResult<()> {
        let games = self.repository.get_all(None, None).await?;
        self.write(&render::grouped(&games)).await
    }

    async fn run_query(&mut self) -> ConsoleResult<()> {
        let text = self.prompt("Enter SQL query (blank for the Ubisoft demo) : ").await?;
        let (query, partition_key) = if text.trim().is_empty() {
            (DEMO_QUERY.to_owned(), Some(DEMO_PARTITION.to_owned()))
        } else {
            let partition_key = self.prompt("Enter its partitionKey (blank for all) : ").await?;
            (text, optional(partition_key))
        };

        let page = self
            .repository
            .get_all_by_query(query, None, None, partition_key)
            .await?;
        self.write(&render::grouped(&page.result_set)).await
    }

    async fn paginate(&mut self) -> ConsoleResult<()> {
        let limit = self.prompt("Pass Limit : ").await?;
        let limit = strip_spaces(&limit)
            .parse::<usize>()
            .map_err(|_| ConsoleError::InvalidInput(format!("`{limit}` is not a page size")))?;
        let token = self.prompt("Pass continuation token if any : ").await?;
        let token = optional(strip_spaces(&token));

        let page = self
            .repository
            .get_page(PageRequest::new(limit).with_token(token))
            .await?;
        self.write(&render::continuation(page.continuation_token.as_deref()))
            .await?;
        self.write(&render::numbered(&page.result_set)).await
    }

    async fn insert(&mut self) -> ConsoleResult<()> {
        let games = self.read_games().await?;
        games.validate()?;
        let partition_key = games.name.clone();
        let id = self.repository.add(games, Some(partition_key)).await?;
        self.write(&format!("Game Created Successfully with id {id}\n"))
            .await
    }

    async fn update(&mut self) -> ConsoleResult<()> {
        let id = self.prompt("Enter Game Id to Update : ").await?;
        let partition_key = optional(self.prompt("Enter its partitionKey : ").await?);
        let Some(current) = self
            .repository
            .find_by_id(id.clone(), partition_key.clone())
            .await?
        else {
            return Err(StorageError::NotFound { id }.into());
        };

        let mut games = current.entity;
        let location = self
            .prompt(&format!("Game Creator Location [{}] : ", games.location))
            .await?;
        if !location.trim().is_empty() {
            games.location = location;
        }
        let year = self
            .prompt(&format!("Game Create year [{}] : ", games.year))
            .await?;
        if !year.trim().is_empty() {
            games.year = parse_year(&year)?;
        }
        let game_name = self
            .prompt("Game Name to add (blank to keep the current list) : ")
            .await?;
        if !game_name.trim().is_empty() {
            let video_game = self.read_video_game(game_name).await?;
            games.video_games.push(video_game);
        }
        games.validate()?;

        let etag = self
            .repository
            .update(id, games, partition_key, Some(current.etag))
            .await?;
        debug!(%etag, "game updated");
        self.write("Game Updated Successfully\n").await
    }

    async fn delete(&mut self) -> ConsoleResult<()> {
        let id = self.prompt("Enter Game Id to Delete : ").await?;
        let partition_key = optional(self.prompt("Enter its partitionKey : ").await?);
        if self.repository.delete(id.clone(), partition_key).await? {
            self.write("Game Deleted Successfully\n").await
        } else {
            self.write(&format!("Nothing to delete for id {id}\n")).await
        }
    }

    async fn search(&mut self) -> ConsoleResult<()> {
        let term = self.prompt("Enter any string to search : ").await?;
        let games = self
            .repository
            .get_all(Some(Games::search_filter(term.trim())), None)
            .await?;
        self.write(&render::grouped(&games)).await
    }

    async fn sort(&mut self) -> ConsoleResult<()> {
        let column = self
            .prompt("Enter which column Name you want to sort : ")
            .await?;
        let field = column
            .parse::<GamesSortField>()
            .map_err(ConsoleError::InvalidInput)?;
        let order = self
            .prompt("Enter sort order + for Asc and - for Desc : ")
            .await?;
        let direction = if order.trim().is_empty() {
            SortDirection::Ascending
        } else {
            order
                .parse::<SortDirection>()
                .map_err(ConsoleError::InvalidInput)?
        };

        let request = PageRequest::new(SORT_PAGE_SIZE).sorted_by(field, direction);
        let pages = page_stream(self.repository.clone(), request);
        pin_mut!(pages);
        let mut games = Vec::new();
        while let Some(page) = pages.try_next().await? {
            games.extend(page);
        }
        self.write(&render::numbered(&games)).await
    }

    async fn read_games(&mut self) -> ConsoleResult<Games> {
        let name = self.prompt("Game Creator : ").await?;
        let location = self.prompt("Game Creator Location : ").await?;
        let year = self.prompt("Game Create year : ").await?;
        let year = parse_year(&year)?;
        let game_name = self.prompt("Game Name : ").await?;
        let video_game = self.read_video_game(game_name).await?;

        Ok(Games {
            name: name.trim().to_owned(),
            location,
            year,
            video_games: vec![video_game],
            id: String::new(),
        })
    }

    async fn read_video_game(&mut self, name: String) -> ConsoleResult<VideoGame> {
        let engine = self.prompt("Engine : ").await?;
        let release_date = self.prompt("Release Date : ").await?;
        let platform = self.prompt("Platform (blank for none) : ").await?;
        Ok(VideoGame {
            name,
            release_date,
            engine,
            platform: optional(platform),
        })
    }

    async fn prompt(&mut self, label: &str) -> ConsoleResult<String> {
        self.write(label).await?;
        self.read_line().await?.ok_or(ConsoleError::EndOfInput)
    }

    async fn read_line(&mut self) -> ConsoleResult<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }

    async fn write(&mut self, text: &str) -> ConsoleResult<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }
}

fn strip_spaces(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Blank answers mean "not given".
fn optional(input: String) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn parse_year(input: &str) -> ConsoleResult<i32> {
    input
        .trim()
        .parse()
        .map_err(|_| ConsoleError::InvalidInput(format!("`{}` is not a year", input.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_answers_become_none() {
        assert_eq!(optional("   ".into()), None);
        assert_eq!(optional(" Ubisoft ".into()), Some("Ubisoft".into()));
    }

    #[test]
    fn years_must_be_numeric() {
        assert_eq!(parse_year(" 1986 ").unwrap(), 1986);
        assert!(matches!(
            parse_year("soon"),
            Err(ConsoleError::InvalidInput(_))
        ));
    }

    #[test]
    fn tokens_lose_embedded_spaces() {
        assert_eq!(strip_spaces(" {\"skip\": 2} "), "{\"skip\":2}");
    }
}
