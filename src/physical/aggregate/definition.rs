//! What an aggregation computes

use crate::error::{QueryError, Result};
use crate::storage::ColumnId;
use arrow::datatypes::{DataType, Schema};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    CountDistinct,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountDistinct => "COUNT DISTINCT",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AggregateFunction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "count" => Ok(AggregateFunction::Count),
            "count_distinct" | "countdistinct" | "count distinct" => {
                Ok(AggregateFunction::CountDistinct)
            }
            other => Err(QueryError::Config(format!(
                "Unknown aggregate function: {}",
                other
            ))),
        }
    }
}

impl AggregateFunction {
    /// Result type for an input column of type `input`
    pub fn output_type(&self, input: Option<&DataType>) -> DataType {
        match (self, input) {
            (AggregateFunction::Count | AggregateFunction::CountDistinct, _) => DataType::Int64,
            (AggregateFunction::Avg, _) => DataType::Float64,
            (AggregateFunction::Sum, Some(DataType::Float32 | DataType::Float64)) => {
                DataType::Float64
            }
            (AggregateFunction::Sum, _) => DataType::Int64,
            (AggregateFunction::Min | AggregateFunction::Max, Some(data_type)) => {
                data_type.clone()
            }
            (AggregateFunction::Min | AggregateFunction::Max, None) => DataType::Null,
        }
    }
}

/// One output aggregate: a function over an optional input column.
///
/// `column == None` is only meaningful for COUNT and means COUNT(*).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateColumnDefinition {
    pub column: Option<ColumnId>,
    pub function: AggregateFunction,
    pub alias: Option<String>,
}

impl AggregateColumnDefinition {
    pub fn new(column: ColumnId, function: AggregateFunction) -> Self {
        Self {
            column: Some(column),
            function,
            alias: None,
        }
    }

    pub fn count_star() -> Self {
        Self {
            column: None,
            function: AggregateFunction::Count,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Alias, or `FUNCTION(column)` over the input schema
    pub fn output_name(&self, input_schema: &Schema) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        let column = match self.column {
            Some(column_id) => input_schema
                .fields()
                .get(column_id as usize)
                .map(|f| f.name().clone())
                .unwrap_or_else(|| format!("#{}", column_id)),
            None => "*".to_string(),
        };
        match self.function {
            AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {})", column),
            function => format!("{}({})", function, column),
        }
    }

    /// Parse `func:column[=alias]`, with `*` standing for COUNT(*)
    pub fn parse(text: &str, input_schema: &Schema) -> Result<Self> {
        let (call, alias) = match text.split_once('=') {
            Some((call, alias)) => (call, Some(alias.trim())),
            None => (text, None),
        };
        let (function, column) = call.split_once(':').ok_or_else(|| {
            QueryError::Config(format!(
                "Aggregate '{}' must look like FUNC:COLUMN[=ALIAS]",
                text
            ))
        })?;
        let function: AggregateFunction = function.trim().parse()?;
        let column = match column.trim() {
            "*" => None,
            name => Some(
                input_schema
                    .index_of(name)
                    .map_err(|_| QueryError::ColumnNotFound(name.to_string()))?
                    as ColumnId,
            ),
        };

        let definition = Self {
            column,
            function,
            alias: alias.filter(|a| !a.is_empty()).map(str::to_string),
        };
        Ok(definition)
    }
}
