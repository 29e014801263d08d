//! Physical plan types

use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::storage::Table;
use arrow::datatypes::SchemaRef;
use std::fmt::Debug;
use std::sync::Arc;

/// Physical operator trait
///
/// Operators consume the tables produced by their children and produce a new
/// chunked table. Outputs may hold reference segments pointing back into their
/// inputs; those keep the inputs alive through shared ownership.
pub trait PhysicalOperator: Debug + Send + Sync {
    /// Get the output schema
    fn schema(&self) -> SchemaRef;

    /// Get child operators
    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>>;

    /// Run this operator and its inputs
    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>>;

    /// Name of this operator for display
    fn name(&self) -> &str;
}

/// Display helper for physical plans
pub fn display_plan(plan: &dyn PhysicalOperator, indent: usize) -> String {
    let mut result = format!("{}{}\n", "  ".repeat(indent), plan.name());
    for child in plan.children() {
        result.push_str(&display_plan(child.as_ref(), indent + 1));
    }
    result
}
