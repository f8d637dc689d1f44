//! The hook interface a database-specific client implements, plus the
//! generic pieces every client shares: the SQL builder, lookup
//! classification and scoped connection release.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use tracing::warn;

use crate::client::{Connection, TableRow};
use crate::error::Result;
use crate::filter::{build_where_clause, quote_identifier};
use crate::handle::{JdbcColumnHandle, JdbcSplit, JdbcTableHandle, SchemaTableName};

/// Hooks the generic connector calls during metadata resolution and scans.
///
/// Implementations hold no mutable state, so one instance serves concurrent
/// engine tasks.
#[async_trait]
pub trait JdbcClient: Send + Sync + fmt::Debug {
    fn connector_id(&self) -> &str;

    /// Open a connection for a scan. The caller must pass it to
    /// [`close_quietly`] when done.
    async fn open_connection(&self) -> Result<Box<dyn Connection>>;

    /// All schema names, lower-cased for the engine.
    async fn schema_names(&self) -> Result<BTreeSet<String>>;

    /// Resolve one table. `Ok(None)` when the catalog has no match.
    async fn table_handle(&self, name: &SchemaTableName) -> Result<Option<JdbcTableHandle>>;

    /// Supported columns of a resolved table, in catalog order.
    async fn columns(&self, handle: &JdbcTableHandle) -> Result<Vec<JdbcColumnHandle>>;

    /// Tables of one schema, or of every schema when `schema` is `None`.
    async fn table_names(&self, schema: Option<&str>) -> Result<Vec<SchemaTableName>>;

    /// Engine-side name for a table catalog row, or `None` when the row
    /// carries no schema.
    fn schema_table_name(&self, row: &TableRow) -> Option<SchemaTableName>;

    /// Build the statement that reads `split`. The connection is available
    /// for dialects that need session state to build SQL.
    async fn build_sql(
        &self,
        connection: &mut dyn Connection,
        split: &JdbcSplit,
        columns: &[JdbcColumnHandle],
    ) -> Result<Statement>;

    /// Execute a statement on `connection`, returning the affected row count.
    async fn execute(&self, connection: &mut dyn Connection, sql: &str) -> Result<u64>;
}

/// SQL ready to be sent to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

/// Outcome of matching catalog rows against one qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableMatch {
    Found(JdbcTableHandle),
    NotFound,
    Ambiguous(usize),
}

impl TableMatch {
    pub fn from_handles(mut handles: Vec<JdbcTableHandle>) -> Self {
        match handles.len() {
            0 => TableMatch::NotFound,
            1 => TableMatch::Found(handles.remove(0)),
            n => TableMatch::Ambiguous(n),
        }
    }
}

/// Builds `SELECT` statements for a split.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    quote: String,
}

impl QueryBuilder {
    pub fn new(quote: impl Into<String>) -> Self {
        Self {
            quote: quote.into(),
        }
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// `SELECT <columns> FROM [catalog.][schema.]table [WHERE ...]`.
    ///
    /// Split conditions must already name remote columns.
    pub fn build_sql(&self, split: &JdbcSplit, columns: &[JdbcColumnHandle]) -> String {
        let projection = if columns.is_empty() {
            "NULL".to_string()
        } else {
            columns
                .iter()
                .map(|c| quote_identifier(&c.column_name, &self.quote))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let table = &split.table;
        let from = [
            table.catalog_name.as_deref(),
            table.schema_name.as_deref(),
            Some(table.table_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .map(|part| quote_identifier(part, &self.quote))
        .collect::<Vec<_>>()
        .join(".");

        format!(
            "SELECT {} FROM {}{}",
            projection,
            from,
            build_where_clause(&split.conditions, &self.quote)
        )
    }
}

/// Close a connection, logging instead of failing when the close itself errors.
pub async fn close_quietly(connection: Box<dyn Connection>, connector_id: &str) {
    if let Err(e) = connection.close().await {
        warn!("[{}] Failed closing connection: {}", connector_id, e);
    }
}

/// Open a connection, execute one statement through the client's
/// [`JdbcClient::execute`] hook and release the connection.
pub async fn execute_statement(client: &dyn JdbcClient, sql: &str) -> Result<u64> {
    let mut connection = client.open_connection().await?;
    let result = client.execute(connection.as_mut(), sql).await;
    close_quietly(connection, client.connector_id()).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCondition, FilterOp, FilterValue};
    use crate::types::EngineType;

    fn handle(catalog: Option<&str>, schema: Option<&str>, table: &str) -> JdbcTableHandle {
        JdbcTableHandle {
            connector_id: "td".to_string(),
            schema_table_name: SchemaTableName::new("sales", "orders"),
            catalog_name: catalog.map(str::to_string),
            schema_name: schema.map(str::to_string),
            table_name: table.to_string(),
        }
    }

    fn columns() -> Vec<JdbcColumnHandle> {
        vec![
            JdbcColumnHandle::new("ORDER_ID", EngineType::Integer),
            JdbcColumnHandle::new("STATUS", EngineType::Varchar(Some(20))),
        ]
    }

    #[test]
    fn test_build_sql_unquoted() {
        let split = JdbcSplit::new(handle(None, Some("SALES"), "ORDERS"), vec![]);
        let sql = QueryBuilder::new("").build_sql(&split, &columns());
        assert_eq!(sql, "SELECT ORDER_ID, STATUS FROM SALES.ORDERS");
    }

    #[test]
    fn test_build_sql_quoted_with_catalog_and_filter() {
        let split = JdbcSplit::new(
            handle(Some("CAT"), Some("SALES"), "ORDERS"),
            vec![FilterCondition::new(
                "STATUS",
                FilterOp::Eq,
                FilterValue::String("open".to_string()),
            )],
        );
        let sql = QueryBuilder::new("\"").build_sql(&split, &columns());
        assert_eq!(
            sql,
            "SELECT \"ORDER_ID\", \"STATUS\" FROM \"CAT\".\"SALES\".\"ORDERS\" WHERE \"STATUS\" = 'open'"
        );
    }

    #[test]
    fn test_build_sql_without_columns_or_schema() {
        let split = JdbcSplit::new(handle(None, None, "ORDERS"), vec![]);
        let sql = QueryBuilder::default().build_sql(&split, &[]);
        assert_eq!(sql, "SELECT NULL FROM ORDERS");
    }

    #[test]
    fn test_table_match_classification() {
        assert_eq!(TableMatch::from_handles(vec![]), TableMatch::NotFound);

        let one = handle(None, Some("SALES"), "ORDERS");
        assert_eq!(
            TableMatch::from_handles(vec![one.clone()]),
            TableMatch::Found(one.clone())
        );
        assert_eq!(
            TableMatch::from_handles(vec![one.clone(), one.clone(), one]),
            TableMatch::Ambiguous(3)
        );
    }
}
