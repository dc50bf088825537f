//! Filesystem layer for compendium-sync
//!
//! Provides normalized path handling, atomic locked writes for collection
//! files, and format-agnostic loading of configuration and content documents.

pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use path::NormalizedPath;
