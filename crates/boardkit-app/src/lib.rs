//! BoardKit application shell
//!
//! Command-line front end over the engine: a built-in component catalog, an offline
//! fetch capability backed by fixture files, and commands that edit boards kept in
//! file storage.

pub mod catalog;
pub mod cli;
pub mod commands;
pub mod fixtures;
