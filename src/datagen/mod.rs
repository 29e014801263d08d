//! Synthetic data for exercising aggregation from the command line and benches

mod generator;
mod schema;

pub use generator::*;
pub use schema::*;
