//! Dynamically typed single values

use crate::error::{QueryError, Result};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use ordered_float::OrderedFloat;
use std::fmt;

/// A single value of any supported column type.
///
/// The derived ordering sorts `Null` first, then by type, then by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarValue {
    Null,
    Int32(i32),
    Int64(i64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    Utf8(String),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float32(_) => DataType::Float32,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Read the value at `index` of an Arrow array
    pub fn try_from_array(array: &dyn Array, index: usize) -> Result<Self> {
        if array.is_null(index) {
            return Ok(ScalarValue::Null);
        }

        let any = array.as_any();
        let value = match array.data_type() {
            DataType::Int32 => any
                .downcast_ref::<Int32Array>()
                .map(|a| ScalarValue::Int32(a.value(index))),
            DataType::Int64 => any
                .downcast_ref::<Int64Array>()
                .map(|a| ScalarValue::Int64(a.value(index))),
            DataType::Float32 => any
                .downcast_ref::<Float32Array>()
                .map(|a| ScalarValue::Float32(OrderedFloat(a.value(index)))),
            DataType::Float64 => any
                .downcast_ref::<Float64Array>()
                .map(|a| ScalarValue::Float64(OrderedFloat(a.value(index)))),
            DataType::Utf8 => any
                .downcast_ref::<StringArray>()
                .map(|a| ScalarValue::Utf8(a.value(index).to_string())),
            other => {
                return Err(QueryError::Execution(format!(
                    "Unsupported column type: {:?}",
                    other
                )))
            }
        };

        value.ok_or_else(|| {
            QueryError::Internal(format!(
                "Array does not match its data type {:?}",
                array.data_type()
            ))
        })
    }

    /// Parse a textual literal as a value of the given type
    pub fn parse_as(text: &str, data_type: &DataType) -> Result<Self> {
        let invalid = |e: &dyn fmt::Display| {
            QueryError::Config(format!(
                "Cannot parse '{}' as {:?}: {}",
                text, data_type, e
            ))
        };
        match data_type {
            DataType::Int32 => text
                .parse::<i32>()
                .map(ScalarValue::Int32)
                .map_err(|e| invalid(&e)),
            DataType::Int64 => text
                .parse::<i64>()
                .map(ScalarValue::Int64)
                .map_err(|e| invalid(&e)),
            DataType::Float32 => text
                .parse::<f32>()
                .map(|v| ScalarValue::Float32(OrderedFloat(v)))
                .map_err(|e| invalid(&e)),
            DataType::Float64 => text
                .parse::<f64>()
                .map(|v| ScalarValue::Float64(OrderedFloat(v)))
                .map_err(|e| invalid(&e)),
            DataType::Utf8 => Ok(ScalarValue::Utf8(text.to_string())),
            other => Err(QueryError::Config(format!(
                "Unsupported literal type: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float32(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int32(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::Float32(OrderedFloat(v))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(OrderedFloat(v))
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}
