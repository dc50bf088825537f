//! Command implementations for compendium-cli

pub mod check;
pub mod modules;
pub mod normalize;
pub mod plan;
pub mod sync;

pub use check::run_check;
pub use modules::run_modules;
pub use normalize::run_normalize;
pub use plan::run_plan;
pub use sync::run_sync;
