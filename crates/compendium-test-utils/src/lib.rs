//! Shared test utilities for the compendium-sync workspace.
//!
//! Dev-dependency only, never published. Depends on no workspace crate so
//! every crate's test suite can use it.
//!
//! # Modules
//!
//! - [`compendium`] — [`TestCompendium`](compendium::TestCompendium) temp
//!   workspace with a config file and content documents
//! - [`records`] — builders for content records and embedded sub-records

pub mod compendium;
pub mod records;

pub use compendium::{TestCompendium, TestModule};
pub use records::{RecordBuilder, effect, pet, spell};
