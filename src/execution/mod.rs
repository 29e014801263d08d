//! Query execution resources

mod context;
mod memory;

pub use context::*;
pub use memory::*;
