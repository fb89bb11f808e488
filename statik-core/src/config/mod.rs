//! Configuration types and loading

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
