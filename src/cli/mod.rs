//! Output formatting for the command line tool

mod output;

pub use output::{OutputFormat, OutputFormatter};
