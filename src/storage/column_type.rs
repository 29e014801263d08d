//! Statically typed access to column values
//!
//! Operators that need per-row work (key encoding, aggregation, indexing) are
//! written once as generic code over [`ColumnType`] and instantiated per
//! concrete Arrow type through [`with_column_type!`] / [`with_numeric_type!`]
//! at the point where the column's `DataType` becomes known.

use crate::storage::ScalarValue;
use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use ordered_float::OrderedFloat;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// FNV-1a offset basis
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime
const FNV_PRIME: u64 = 0x100000001b3;

/// A value type a column can hold.
///
/// Values are totally ordered and hashable so they can live in ordered
/// distinct sets and index structures.
pub trait ColumnType: Clone + Ord + Hash + fmt::Debug + Send + Sync + 'static {
    /// Arrow array holding values of this type
    type Array: Array + 'static;

    fn data_type() -> DataType;

    fn downcast(array: &dyn Array) -> Option<&Self::Array> {
        array.as_any().downcast_ref::<Self::Array>()
    }

    /// Read a non-null value
    fn value(array: &Self::Array, index: usize) -> Self;

    /// 64-bit grouping key entry for this value.
    ///
    /// Equal values always produce equal entries. Distinct values may collide
    /// for variable-width types.
    fn key_entry(&self) -> u64;

    /// Key entry of the non-null value at `index`, read in place
    #[inline]
    fn key_entry_at(array: &Self::Array, index: usize) -> u64 {
        Self::value(array, index).key_entry()
    }

    fn into_scalar(self) -> ScalarValue;

    fn from_scalar(value: &ScalarValue) -> Option<Self>;

    fn build_array(values: Vec<Option<Self>>) -> ArrayRef;
}

/// Column types that SUM and AVG accept
pub trait NumericType: ColumnType + Copy {
    /// Type sums are accumulated and reported in
    type Sum: ColumnType + Copy + Default;

    fn widen(self) -> Self::Sum;

    /// Add two partial sums; integer sums saturate at the type bounds
    fn add_sums(a: Self::Sum, b: Self::Sum) -> Self::Sum;

    fn sum_to_f64(sum: Self::Sum) -> f64;
}

fn hash_bytes(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl ColumnType for i32 {
    type Array = Int32Array;

    fn data_type() -> DataType {
        DataType::Int32
    }

    #[inline]
    fn value(array: &Int32Array, index: usize) -> Self {
        array.value(index)
    }

    #[inline]
    fn key_entry(&self) -> u64 {
        *self as u32 as u64
    }

    fn into_scalar(self) -> ScalarValue {
        ScalarValue::Int32(self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    fn build_array(values: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(Int32Array::from(values))
    }
}

impl ColumnType for i64 {
    type Array = Int64Array;

    fn data_type() -> DataType {
        DataType::Int64
    }

    #[inline]
    fn value(array: &Int64Array, index: usize) -> Self {
        array.value(index)
    }

    #[inline]
    fn key_entry(&self) -> u64 {
        *self as u64
    }

    fn into_scalar(self) -> ScalarValue {
        ScalarValue::Int64(self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    fn build_array(values: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(Int64Array::from(values))
    }
}

impl ColumnType for OrderedFloat<f32> {
    type Array = Float32Array;

    fn data_type() -> DataType {
        DataType::Float32
    }

    #[inline]
    fn value(array: &Float32Array, index: usize) -> Self {
        OrderedFloat(array.value(index))
    }

    #[inline]
    fn key_entry(&self) -> u64 {
        // OrderedFloat treats -0.0 == 0.0 and all NaNs as equal
        let normalized = if self.0 == 0.0 {
            0.0f32
        } else if self.0.is_nan() {
            f32::NAN
        } else {
            self.0
        };
        normalized.to_bits() as u64
    }

    fn into_scalar(self) -> ScalarValue {
        ScalarValue::Float32(self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Float32(v) => Some(*v),
            _ => None,
        }
    }

    fn build_array(values: Vec<Option<Self>>) -> ArrayRef {
        let values: Vec<Option<f32>> = values.into_iter().map(|v| v.map(|f| f.0)).collect();
        Arc::new(Float32Array::from(values))
    }
}

impl ColumnType for OrderedFloat<f64> {
    type Array = Float64Array;

    fn data_type() -> DataType {
        DataType::Float64
    }

    #[inline]
    fn value(array: &Float64Array, index: usize) -> Self {
        OrderedFloat(array.value(index))
    }

    #[inline]
    fn key_entry(&self) -> u64 {
        let normalized = if self.0 == 0.0 {
            0.0f64
        } else if self.0.is_nan() {
            f64::NAN
        } else {
            self.0
        };
        normalized.to_bits()
    }

    fn into_scalar(self) -> ScalarValue {
        ScalarValue::Float64(self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    fn build_array(values: Vec<Option<Self>>) -> ArrayRef {
        let values: Vec<Option<f64>> = values.into_iter().map(|v| v.map(|f| f.0)).collect();
        Arc::new(Float64Array::from(values))
    }
}

impl ColumnType for String {
    type Array = StringArray;

    fn data_type() -> DataType {
        DataType::Utf8
    }

    #[inline]
    fn value(array: &StringArray, index: usize) -> Self {
        array.value(index).to_string()
    }

    #[inline]
    fn key_entry(&self) -> u64 {
        hash_bytes(self.as_bytes())
    }

    #[inline]
    fn key_entry_at(array: &StringArray, index: usize) -> u64 {
        hash_bytes(array.value(index).as_bytes())
    }

    fn into_scalar(self) -> ScalarValue {
        ScalarValue::Utf8(self)
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Utf8(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn build_array(values: Vec<Option<Self>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }
}

impl NumericType for i32 {
    type Sum = i64;

    #[inline]
    fn widen(self) -> i64 {
        self as i64
    }

    fn sum_to_f64(sum: i64) -> f64 {
        sum as f64
    }

    #[inline]
    fn add_sums(a: i64, b: i64) -> i64 {
        a.saturating_add(b)
    }
}

impl NumericType for i64 {
    type Sum = i64;

    #[inline]
    fn widen(self) -> i64 {
        self
    }

    fn sum_to_f64(sum: i64) -> f64 {
        sum as f64
    }

    #[inline]
    fn add_sums(a: i64, b: i64) -> i64 {
        a.saturating_add(b)
    }
}

impl NumericType for OrderedFloat<f32> {
    type Sum = OrderedFloat<f64>;

    #[inline]
    fn widen(self) -> OrderedFloat<f64> {
        OrderedFloat(self.0 as f64)
    }

    fn sum_to_f64(sum: OrderedFloat<f64>) -> f64 {
        sum.0
    }

    #[inline]
    fn add_sums(a: OrderedFloat<f64>, b: OrderedFloat<f64>) -> OrderedFloat<f64> {
        a + b
    }
}

impl NumericType for OrderedFloat<f64> {
    type Sum = OrderedFloat<f64>;

    #[inline]
    fn widen(self) -> OrderedFloat<f64> {
        self
    }

    fn sum_to_f64(sum: OrderedFloat<f64>) -> f64 {
        sum.0
    }

    #[inline]
    fn add_sums(a: OrderedFloat<f64>, b: OrderedFloat<f64>) -> OrderedFloat<f64> {
        a + b
    }
}

/// Whether grouping, MIN/MAX/COUNT and COUNT DISTINCT accept this type
pub fn is_supported_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 | DataType::Utf8
    )
}

/// Whether SUM and AVG accept this type
pub fn is_numeric_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64
    )
}

/// Bind `$T` to the [`ColumnType`] matching `$data_type` and evaluate `$body`.
///
/// Evaluates `$fallback` for types without a `ColumnType` implementation.
macro_rules! with_column_type {
    ($data_type:expr, $T:ident => $body:expr, _ => $fallback:expr) => {
        match $data_type {
            ::arrow::datatypes::DataType::Int32 => {
                type $T = i32;
                $body
            }
            ::arrow::datatypes::DataType::Int64 => {
                type $T = i64;
                $body
            }
            ::arrow::datatypes::DataType::Float32 => {
                type $T = ::ordered_float::OrderedFloat<f32>;
                $body
            }
            ::arrow::datatypes::DataType::Float64 => {
                type $T = ::ordered_float::OrderedFloat<f64>;
                $body
            }
            ::arrow::datatypes::DataType::Utf8 => {
                type $T = String;
                $body
            }
            _ => $fallback,
        }
    };
}

/// Like [`with_column_type!`] but only for [`NumericType`]s
macro_rules! with_numeric_type {
    ($data_type:expr, $T:ident => $body:expr, _ => $fallback:expr) => {
        match $data_type {
            ::arrow::datatypes::DataType::Int32 => {
                type $T = i32;
                $body
            }
            ::arrow::datatypes::DataType::Int64 => {
                type $T = i64;
                $body
            }
            ::arrow::datatypes::DataType::Float32 => {
                type $T = ::ordered_float::OrderedFloat<f32>;
                $body
            }
            ::arrow::datatypes::DataType::Float64 => {
                type $T = ::ordered_float::OrderedFloat<f64>;
                $body
            }
            _ => $fallback,
        }
    };
}

pub(crate) use with_column_type;
pub(crate) use with_numeric_type;
