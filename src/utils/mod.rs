//! Utility modules

pub mod collaborators;
pub mod memory_storage;
pub mod validation;

pub use collaborators::*;
pub use memory_storage::*;
pub use validation::*;
