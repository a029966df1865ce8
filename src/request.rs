//! Per-row write requests
//!
//! A [`Request`] is one row in transit: a reference to its target [`Schema`]
//! and a column-to-value map. Requests are built with chainable typed setters
//! and move into the engine on submit; they are never shared across
//! submitters.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::{RowData, Value};

/// One row bound for a [`Schema`] target
#[derive(Debug, Clone)]
pub struct Request {
    schema: Arc<Schema>,
    values: HashMap<String, Value>,
}

impl Request {
    /// Create an empty request for the given schema
    pub fn new(schema: Arc<Schema>) -> Self {
        let capacity = schema.columns().len();
        Self {
            schema,
            values: HashMap::with_capacity(capacity),
        }
    }

    /// The target schema
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Set a column to any convertible value
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Set a column to NULL
    pub fn set_null(self, column: impl Into<String>) -> Self {
        self.set(column, Value::Null)
    }

    /// Set a boolean column
    pub fn set_bool(self, column: impl Into<String>, value: bool) -> Self {
        self.set(column, value)
    }

    /// Set a 32-bit integer column
    pub fn set_int32(self, column: impl Into<String>, value: i32) -> Self {
        self.set(column, value)
    }

    /// Set a 64-bit integer column
    pub fn set_int64(self, column: impl Into<String>, value: i64) -> Self {
        self.set(column, value)
    }

    /// Set a 32-bit float column
    pub fn set_float32(self, column: impl Into<String>, value: f32) -> Self {
        self.set(column, value)
    }

    /// Set a 64-bit float column
    pub fn set_float64(self, column: impl Into<String>, value: f64) -> Self {
        self.set(column, value)
    }

    /// Set a string column
    pub fn set_string(self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value.into())
    }

    /// Set a binary column
    pub fn set_bytes(self, column: impl Into<String>, value: Vec<u8>) -> Self {
        self.set(column, value)
    }

    /// Set a timestamp column
    pub fn set_timestamp(self, column: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.set(column, value)
    }

    /// Get the raw value of a column, if set
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.values.get(column).ok_or_else(|| Error::ColumnNotFound {
            column: column.to_owned(),
        })
    }

    fn conversion(column: &str, want: &str, got: &Value) -> Error {
        Error::TypeConversion {
            message: format!("column {column}: wanted {want}, found {got:?}"),
        }
    }

    /// Get a boolean column
    pub fn get_bool(&self, column: &str) -> Result<bool> {
        let value = self.require(column)?;
        value
            .as_bool()
            .ok_or_else(|| Self::conversion(column, "bool", value))
    }

    /// Get a 32-bit integer column
    pub fn get_int32(&self, column: &str) -> Result<i32> {
        let value = self.require(column)?;
        value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| Self::conversion(column, "i32", value))
    }

    /// Get a 64-bit integer column
    pub fn get_int64(&self, column: &str) -> Result<i64> {
        let value = self.require(column)?;
        value
            .as_i64()
            .ok_or_else(|| Self::conversion(column, "i64", value))
    }

    /// Get a 64-bit float column
    pub fn get_float64(&self, column: &str) -> Result<f64> {
        let value = self.require(column)?;
        value
            .as_f64()
            .ok_or_else(|| Self::conversion(column, "f64", value))
    }

    /// Get a string column
    pub fn get_string(&self, column: &str) -> Result<String> {
        let value = self.require(column)?;
        value
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| Self::conversion(column, "string", value))
    }

    /// Get a timestamp column
    pub fn get_timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        let value = self.require(column)?;
        value
            .as_timestamp()
            .ok_or_else(|| Self::conversion(column, "timestamp", value))
    }

    /// Columns that currently carry a value
    pub fn columns(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Values aligned to the schema's column order.
    ///
    /// Columns without a value yield [`Value::Null`] in their position, so
    /// the result always has exactly one entry per declared column.
    pub fn ordered_values(&self) -> Vec<Value> {
        self.schema
            .columns()
            .iter()
            .map(|column| self.values.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Check the target schema's invariants
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()
    }

    /// Consume the request into a row map keyed by the schema's columns.
    ///
    /// Values set under names the schema does not declare are discarded.
    pub(crate) fn into_row(mut self) -> RowData {
        let mut row = RowData::with_capacity(self.schema.columns().len());
        for column in self.schema.columns() {
            if let Some(value) = self.values.remove(column) {
                row.insert(column.clone(), value);
            }
        }
        row
    }
}
