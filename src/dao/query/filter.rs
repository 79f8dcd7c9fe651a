use std::cmp::Ordering;

use serde_json::Value;

use super::sort::compare_values;

/// Comparison operators available in filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=` or `<>`; also true when the field is of another kind.
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Predicate over JSON documents addressed by dotted field paths.
///
/// The same tree is evaluated in memory and translated by the remote backends
/// into their native selectors, so both access paths see the same records.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Compare the value at `path` with a scalar literal.
    Compare {
        /// Dotted field path.
        path: String,
        /// Operator applied as `field op value`.
        op: CompareOp,
        /// Literal to compare against.
        value: Value,
    },
    /// String at `path` contains `needle`.
    Contains {
        /// Dotted field path.
        path: String,
        /// Substring to look for.
        needle: String,
        /// Compare case-insensitively.
        ignore_case: bool,
    },
    /// String at `path` starts with `prefix`.
    StartsWith {
        /// Dotted field path.
        path: String,
        /// Required prefix.
        prefix: String,
        /// Compare case-insensitively.
        ignore_case: bool,
    },
    /// At least one element of the array at `path` matches `filter`.
    ///
    /// Paths inside `filter` are relative to the array element.
    Any {
        /// Dotted path of the array.
        path: String,
        /// Predicate applied to each element.
        filter: Box<Filter>,
    },
    /// Every child matches; empty matches everything.
    And(Vec<Filter>),
    /// Some child matches; empty matches nothing.
    Or(Vec<Filter>),
    /// The child does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Equality with a literal.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Compare {
            path: path.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    /// Case-insensitive substring match.
    pub fn contains_ignore_case(path: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains {
            path: path.into(),
            needle: needle.into(),
            ignore_case: true,
        }
    }

    /// Some element of the array at `path` matches `filter`.
    pub fn any(path: impl Into<String>, filter: Filter) -> Self {
        Filter::Any {
            path: path.into(),
            filter: Box::new(filter),
        }
    }

    /// Conjunction that flattens nested `And` nodes.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Disjunction that flattens nested `Or` nodes.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::Or(mut left), Filter::Or(right)) => {
                left.extend(right);
                Filter::Or(left)
            }
            (Filter::Or(mut left), other) => {
                left.push(other);
                Filter::Or(left)
            }
            (this, other) => Filter::Or(vec![this, other]),
        }
    }

    /// Evaluate the predicate against a JSON document.
    ///
    /// Missing fields never satisfy a comparison, including `Ne`.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::Compare { path, op, value } => match resolve_path(document, path) {
                Some(actual) => compare(actual, *op, value),
                None => false,
            },
            Filter::Contains {
                path,
                needle,
                ignore_case,
            } => string_at(document, path)
                .map(|haystack| {
                    if *ignore_case {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    } else {
                        haystack.contains(needle.as_str())
                    }
                })
                .unwrap_or(false),
            Filter::StartsWith {
                path,
                prefix,
                ignore_case,
            } => string_at(document, path)
                .map(|haystack| {
                    if *ignore_case {
                        haystack.to_lowercase().starts_with(&prefix.to_lowercase())
                    } else {
                        haystack.starts_with(prefix.as_str())
                    }
                })
                .unwrap_or(false),
            Filter::Any { path, filter } => match resolve_path(document, path) {
                Some(Value::Array(items)) => items.iter().any(|item| filter.matches(item)),
                _ => false,
            },
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(document)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(document)),
            Filter::Not(filter) => !filter.matches(document),
        }
    }
}

/// Walk a dotted path through nested JSON objects.
///
/// An empty path addresses the value itself.
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

fn string_at<'a>(document: &'a Value, path: &str) -> Option<&'a str> {
    resolve_path(document, path).and_then(Value::as_str)
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    // Values of different kinds are never equal and never ordered.
    if !same_kind(actual, expected) {
        return op == CompareOp::Ne;
    }
    let ordering = compare_values(Some(actual), Some(expected));
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn same_kind(left: &Value, right: &Value) -> bool {
    matches!(
        (left, right),
        (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
    )
}
