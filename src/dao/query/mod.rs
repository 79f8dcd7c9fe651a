//! Backend-neutral query model: filter expressions, sort order and the SQL-like dialect.

mod filter;
mod sort;
mod sql;

pub use filter::{CompareOp, Filter, resolve_path};
pub use sort::{Sort, SortDirection, SortableField, compare_values};
pub use sql::ParsedQuery;
