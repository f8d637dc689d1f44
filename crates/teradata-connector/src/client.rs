//! Contract of the external database client.
//!
//! A [`Driver`] opens [`Connection`]s from a [`ConnectionConfig`]. A connection
//! answers catalog questions as row streams, runs queries into Arrow batches
//! and executes statements. Connections are released explicitly with
//! [`Connection::close`]; the adapter calls it on every exit path.

use std::fmt;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::ConnectionConfig;
use crate::error::ClientError;

/// A stream of catalog rows. An `Err` item ends the iteration.
pub type RowStream<'a, T> = BoxStream<'a, Result<T, ClientError>>;

/// Catalog object kinds a table lookup can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableType {
    Table,
    View,
    Synonym,
}

impl TableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Table => "TABLE",
            TableType::View => "VIEW",
            TableType::Synonym => "SYNONYM",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of table catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub table_type: TableType,
}

/// One row of column catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub name: String,
    /// JDBC `java.sql.Types` code, see [`crate::types::jdbc`].
    pub data_type: i32,
    pub column_size: i32,
    pub decimal_digits: Option<i32>,
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>, ClientError>;
}

#[async_trait]
pub trait Connection: Send {
    /// Whether unquoted identifiers are stored upper-case by the database.
    async fn stores_upper_case_identifiers(&mut self) -> Result<bool, ClientError>;

    /// All schema names, in the database's own case.
    fn schemas(&mut self) -> RowStream<'_, String>;

    /// Tables matching the optional exact schema and table names, restricted
    /// to `types`.
    fn tables<'a>(
        &'a mut self,
        schema: Option<&'a str>,
        table: Option<&'a str>,
        types: &'a [TableType],
    ) -> RowStream<'a, TableRow>;

    /// Columns of one table in ordinal order.
    fn columns<'a>(&'a mut self, schema: &'a str, table: &'a str) -> RowStream<'a, ColumnRow>;

    /// Run a query whose result columns line up positionally with `schema`.
    async fn query(&mut self, sql: &str, schema: SchemaRef) -> Result<Vec<RecordBatch>, ClientError>;

    /// Execute a statement, returning the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64, ClientError>;

    async fn close(self: Box<Self>) -> Result<(), ClientError>;
}
