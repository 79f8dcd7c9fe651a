use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::{Validate, ValidationError};

use crate::dao::{
    query::{Filter, SortableField},
    repository::Document,
};

/// Field path of the nested video game list, misspelt on the wire.
pub const VIDEO_GAMES_FIELD: &str = "vedioGames";

/// A game creator together with the video games it shipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Games {
    /// Creator (studio) name, also the partition key.
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    /// Where the creator is based.
    pub location: String,
    /// Year the creator was founded.
    #[validate(range(min = 0, max = 9999))]
    pub year: i32,
    /// Video games in the order they were entered.
    #[serde(rename = "vedioGames", default)]
    #[validate(nested)]
    pub video_games: Vec<VideoGame>,
    /// Store-wide identifier, empty until the document is persisted.
    #[serde(default)]
    pub id: String,
}

/// A single video game owned by its [`Games`] record.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct VideoGame {
    /// Title of the game.
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    /// Release date as entered; not parsed.
    #[serde(rename = "releaseDate", default)]
    pub release_date: String,
    /// Game engine.
    #[serde(default)]
    pub engine: String,
    /// Target platform, omitted from storage when unknown.
    pub platform: Option<String>,
}

impl Games {
    /// Case-insensitive substring search over the creator name, its location
    /// and the names of its video games.
    pub fn search_filter(term: &str) -> Filter {
        Filter::contains_ignore_case("name", term)
            .or(Filter::contains_ignore_case("location", term))
            .or(Filter::any(
                VIDEO_GAMES_FIELD,
                Filter::contains_ignore_case("name", term),
            ))
    }
}

impl Document for Games {
    type SortField = GamesSortField;

    const PARTITION_KEY_PATH: &'static str = "name";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn partition_key(&self) -> &str {
        &self.name
    }
}

/// Fields a [`Games`] listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamesSortField {
    /// Creator name.
    Name,
    /// Creator location.
    Location,
    /// Founding year.
    Year,
    /// Record id.
    Id,
}

impl SortableField for GamesSortField {
    fn path(self) -> &'static str {
        match self {
            GamesSortField::Name => "name",
            GamesSortField::Location => "location",
            GamesSortField::Year => "year",
            GamesSortField::Id => "id",
        }
    }

    fn all() -> &'static [Self] {
        &[
            GamesSortField::Name,
            GamesSortField::Location,
            GamesSortField::Year,
            GamesSortField::Id,
        ]
    }
}

impl FromStr for GamesSortField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::all()
            .iter()
            .copied()
            .find(|field| field.path().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!("`{wanted}` is not sortable; choose one of name, location, year, id")
            })
    }
}

impl fmt::Display for GamesSortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}
