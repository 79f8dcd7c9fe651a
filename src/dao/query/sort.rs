use std::{cmp::Ordering, fmt, str::FromStr};

use serde_json::Value;

/// A closed set of fields an entity can be ordered by.
///
/// Each variant maps explicitly to the JSON path stores sort on, so sort
/// requests can never name a field the entity does not have.
pub trait SortableField: Copy + fmt::Debug + Send + Sync + 'static {
    /// JSON field path of the sort key.
    fn path(self) -> &'static str;

    /// Every sortable field, used to prepare backend indexes.
    fn all() -> &'static [Self];
}

/// Direction of an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first; written `+`.
    #[default]
    Ascending,
    /// Largest first; written `-`.
    Descending,
}

impl SortDirection {
    /// Apply the direction to an ascending ordering.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    /// Accepts `+`/`asc`/`ascending` and `-`/`desc`/`descending`, case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "+" | "asc" | "ascending" => Ok(SortDirection::Ascending),
            "-" | "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort order `{other}`")),
        }
    }
}

/// Resolved ordering handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    path: String,
    direction: SortDirection,
}

impl Sort {
    /// Order by one of the entity's sortable fields.
    pub fn by<F: SortableField>(field: F, direction: SortDirection) -> Self {
        Self {
            path: field.path().to_owned(),
            direction,
        }
    }

    /// Ordering taken from an `ORDER BY` clause of a raw query.
    pub(crate) fn from_query(path: String, direction: SortDirection) -> Self {
        Self { path, direction }
    }

    /// Field path being ordered on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Requested direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// Total order over optional JSON values.
///
/// Missing sorts first, then null, booleans, numbers, strings, arrays and
/// objects. Values of the same kind compare naturally; arrays and objects
/// compare equal to each other.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) => kind_rank(a).cmp(&kind_rank(b)),
        },
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direction_parses_console_symbols() {
        assert_eq!("+".parse::<SortDirection>(), Ok(SortDirection::Ascending));
        assert_eq!("-".parse::<SortDirection>(), Ok(SortDirection::Descending));
        assert_eq!("DESC".parse::<SortDirection>(), Ok(SortDirection::Descending));
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn missing_values_sort_first() {
        assert_eq!(compare_values(None, Some(&json!(null))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!(1)), Some(&json!("1"))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(2.5)), Some(&json!(2))),
            Ordering::Greater
        );
    }

    #[test]
    fn descending_reverses() {
        assert_eq!(
            SortDirection::Descending.apply(Ordering::Less),
            Ordering::Greater
        );
    }
}
