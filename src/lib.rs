//! ppp library
//!
//! A hierarchical backlog kept as YAML metadata in `.ppp/database.yaml` and
//! mirrored into a folder tree of markdown spec files. The binary is a thin
//! CLI over [`manager::HybridManager`].

pub mod action_generator;
pub mod config;
pub mod database;
pub mod error;
pub mod folders;
pub mod format;
pub mod id;
pub mod keywords;
pub mod manager;
pub mod release;
pub mod types;

pub use error::{Error, Result};
