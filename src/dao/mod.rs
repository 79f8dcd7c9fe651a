//! Document models, query model and repositories.

/// Games and video game document models.
pub mod models;
/// Filter, sort and SQL-like query model shared by every backend.
pub mod query;
/// Repository contract and its backends.
pub mod repository;
/// Storage error type shared by every backend.
pub mod storage;
