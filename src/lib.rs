//! Console front end and repository layer for a `Games` document collection.

pub mod config;
pub mod console;
pub mod dao;
/// Console error type.
pub mod error;
