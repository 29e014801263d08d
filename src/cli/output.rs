//! Output formatting for aggregation results
//!
//! Supports:
//! - Table: Pretty-printed ASCII table (default)
//! - CSV: Comma-separated values
//! - Vertical: One column per line (useful for wide results)

use crate::error::{QueryError, Result};
use arrow::array::{Array, ArrayRef};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use std::io::Write;
use std::str::FromStr;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty-printed ASCII table
    #[default]
    Table,
    /// Comma-separated values
    Csv,
    /// Vertical format (one column per line)
    Vertical,
}

impl FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" | "t" => Ok(Self::Table),
            "csv" | "c" => Ok(Self::Csv),
            "vertical" | "v" => Ok(Self::Vertical),
            other => Err(QueryError::Config(format!(
                "Unknown output format '{}', expected one of {}",
                other,
                Self::all_names().join(", ")
            ))),
        }
    }
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Csv => "csv",
            Self::Vertical => "vertical",
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["table", "csv", "vertical"]
    }
}

/// Writes record batches in one of the [`OutputFormat`]s
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    format: OutputFormat,
    max_rows: Option<usize>,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            max_rows: None,
        }
    }

    /// Set maximum rows to display
    pub fn with_max_rows(mut self, max: usize) -> Self {
        self.max_rows = Some(max);
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format record batches and write to stdout
    pub fn print(&self, batches: &[RecordBatch]) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        self.write(&mut stdout, batches)
    }

    /// Format record batches and write to the given writer
    pub fn write<W: Write>(&self, writer: &mut W, batches: &[RecordBatch]) -> Result<()> {
        let batches = self.limit(batches);
        match self.format {
            OutputFormat::Table => self.write_table(writer, &batches),
            OutputFormat::Csv => self.write_csv(writer, &batches),
            OutputFormat::Vertical => self.write_vertical(writer, &batches),
        }
    }

    /// Format as string
    pub fn format_to_string(&self, batches: &[RecordBatch]) -> Result<String> {
        let mut buffer = Vec::new();
        self.write(&mut buffer, batches)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Batches cut down to `max_rows` rows in total
    fn limit(&self, batches: &[RecordBatch]) -> Vec<RecordBatch> {
        let Some(max) = self.max_rows else {
            return batches.to_vec();
        };
        let mut remaining = max;
        let mut limited = Vec::new();
        for batch in batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            limited.push(batch.slice(0, take));
            remaining -= take;
        }
        limited
    }

    fn write_table<W: Write>(&self, writer: &mut W, batches: &[RecordBatch]) -> Result<()> {
        if batches.is_empty() {
            return Ok(());
        }
        let display = arrow::util::pretty::pretty_format_batches(batches)?;
        writeln!(writer, "{}", display)?;
        Ok(())
    }

    fn write_csv<W: Write>(&self, writer: &mut W, batches: &[RecordBatch]) -> Result<()> {
        let Some(first) = batches.first() else {
            return Ok(());
        };

        let schema = first.schema();
        let headers: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        writeln!(writer, "{}", headers.join(","))?;

        for batch in batches {
            for row in 0..batch.num_rows() {
                let values = batch
                    .columns()
                    .iter()
                    .map(|column| format_csv_value(column, row))
                    .collect::<Result<Vec<_>>>()?;
                writeln!(writer, "{}", values.join(","))?;
            }
        }
        Ok(())
    }

    fn write_vertical<W: Write>(&self, writer: &mut W, batches: &[RecordBatch]) -> Result<()> {
        let Some(first) = batches.first() else {
            return Ok(());
        };

        let schema = first.schema();
        let field_names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let width = field_names.iter().map(|n| n.len()).max().unwrap_or(0);

        let mut row_count = 0;
        for batch in batches {
            for row in 0..batch.num_rows() {
                row_count += 1;
                writeln!(writer, "*************************** {} ***************************", row_count)?;
                for (column, name) in batch.columns().iter().zip(&field_names) {
                    let value = format_display_value(column, row)?;
                    writeln!(writer, "{:>width$}: {}", name, value, width = width)?;
                }
            }
        }
        Ok(())
    }
}

fn format_display_value(array: &ArrayRef, row: usize) -> Result<String> {
    let options = FormatOptions::default().with_null("NULL");
    let formatter = ArrayFormatter::try_new(array.as_ref(), &options)?;
    Ok(formatter.value(row).to_string())
}

/// Quote if the value contains a comma, quote or newline
fn format_csv_value(array: &ArrayRef, row: usize) -> Result<String> {
    if array.is_null(row) {
        return Ok(String::new());
    }
    let value = format_display_value(array, row)?;
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        Ok(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Ok(value)
    }
}
