//! Handles exchanged between the engine-facing connector and the client hooks.

use std::fmt;

use arrow::datatypes::Field;

use crate::filter::FilterCondition;
use crate::types::EngineType;

/// Engine-side qualified table name, always in the engine's lower-case convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaTableName {
    pub schema_name: String,
    pub table_name: String,
}

impl SchemaTableName {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for SchemaTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema_name, self.table_name)
    }
}

/// A resolved external table, view or synonym.
///
/// `catalog_name`, `schema_name` and `table_name` are the strings the external
/// catalog reported, in its own case. `schema_table_name` is what the engine
/// asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JdbcTableHandle {
    pub connector_id: String,
    pub schema_table_name: SchemaTableName,
    pub catalog_name: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: String,
}

/// One supported column of a resolved table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JdbcColumnHandle {
    /// Column name as reported by the external catalog. Used verbatim in SQL.
    pub column_name: String,
    pub engine_type: EngineType,
}

impl JdbcColumnHandle {
    pub fn new(column_name: impl Into<String>, engine_type: EngineType) -> Self {
        Self {
            column_name: column_name.into(),
            engine_type,
        }
    }

    /// Name under which the column is exposed to the engine.
    pub fn engine_name(&self) -> String {
        self.column_name.to_lowercase()
    }

    pub fn arrow_field(&self) -> Field {
        Field::new(self.engine_name(), self.engine_type.arrow_type(), true)
    }
}

/// One physical partition of a table scan.
///
/// Only the SQL builder looks inside; every other component passes it along.
#[derive(Debug, Clone)]
pub struct JdbcSplit {
    pub table: JdbcTableHandle,
    pub conditions: Vec<FilterCondition>,
}

impl JdbcSplit {
    pub fn new(table: JdbcTableHandle, conditions: Vec<FilterCondition>) -> Self {
        Self { table, conditions }
    }
}

impl fmt::Display for JdbcSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.table.schema_name.as_deref().unwrap_or("<none>"),
            self.table.table_name
        )?;
        if !self.conditions.is_empty() {
            write!(f, ", conditions={}", self.conditions.len())?;
        }
        Ok(())
    }
}
