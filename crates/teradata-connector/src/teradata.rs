//! Teradata implementation of the [`JdbcClient`] hooks.
//!
//! Every public operation opens one connection through the driver and
//! releases it before returning, whatever the outcome.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::client::{Connection, Driver, TableRow, TableType};
use crate::config::{ConnectionConfig, IDENTIFIER_QUOTE_OPTION, REWRITE_LIMIT_OPTION};
use crate::error::{ConfigError, ConnectorError, Result};
use crate::handle::{JdbcColumnHandle, JdbcSplit, JdbcTableHandle, SchemaTableName};
use crate::jdbc::{close_quietly, JdbcClient, QueryBuilder, Statement, TableMatch};
use crate::rewrite::{IdentityRewriter, QueryRewriter, TopNRewriter};
use crate::types::{map_type, DeclaredSize};

/// Catalog object kinds that can back an engine table.
const TABLE_TYPES: &[TableType] = &[TableType::View, TableType::Table, TableType::Synonym];

pub struct TeradataClient {
    connector_id: String,
    config: ConnectionConfig,
    driver: Arc<dyn Driver>,
    rewriter: Arc<dyn QueryRewriter>,
    query_builder: QueryBuilder,
}

impl fmt::Debug for TeradataClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeradataClient")
            .field("connector_id", &self.connector_id)
            .field("config", &self.config)
            .field("rewriter", &self.rewriter)
            .field("query_builder", &self.query_builder)
            .finish()
    }
}

impl TeradataClient {
    /// Create a client. Dialect options in `config` pick the rewriter and
    /// the identifier quote.
    pub fn new(
        connector_id: impl Into<String>,
        config: ConnectionConfig,
        driver: Arc<dyn Driver>,
    ) -> std::result::Result<Self, ConfigError> {
        let connector_id = connector_id.into();
        let rewriter: Arc<dyn QueryRewriter> = if config.dialect_flag(REWRITE_LIMIT_OPTION, false)? {
            Arc::new(TopNRewriter)
        } else {
            Arc::new(IdentityRewriter)
        };
        let query_builder = QueryBuilder::new(config.dialect_option(IDENTIFIER_QUOTE_OPTION).unwrap_or(""));

        info!(
            "[{}] Teradata client for {} (rewriter={:?})",
            connector_id,
            config.endpoint_url(),
            rewriter
        );

        Ok(Self {
            connector_id,
            config,
            driver,
            rewriter,
            query_builder,
        })
    }

    /// Replace the SQL rewriter.
    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn rewrite_query(&self, sql: &str) -> String {
        self.rewriter.rewrite(sql)
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.driver
            .connect(&self.config)
            .await
            .map_err(ConnectorError::Connectivity)
    }

    async fn schema_names_on(&self, conn: &mut dyn Connection) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut rows = conn.schemas();
        while let Some(schema) = rows.try_next().await.map_err(ConnectorError::Connectivity)? {
            let schema = schema.to_lowercase();
            debug!("[{}] Schema: {}", self.connector_id, schema);
            names.insert(schema);
        }
        Ok(names)
    }

    async fn table_handle_on(
        &self,
        conn: &mut dyn Connection,
        name: &SchemaTableName,
    ) -> Result<Option<JdbcTableHandle>> {
        let (schema, table) = if conn
            .stores_upper_case_identifiers()
            .await
            .map_err(ConnectorError::Connectivity)?
        {
            (name.schema_name.to_uppercase(), name.table_name.to_uppercase())
        } else {
            (name.schema_name.clone(), name.table_name.clone())
        };

        debug!("[{}] Resolving table {}.{}", self.connector_id, schema, table);
        let rows: Vec<TableRow> = conn
            .tables(Some(&schema), Some(&table), TABLE_TYPES)
            .try_collect()
            .await
            .map_err(ConnectorError::Connectivity)?;

        let handles = rows
            .into_iter()
            .map(|row| JdbcTableHandle {
                connector_id: self.connector_id.clone(),
                schema_table_name: name.clone(),
                catalog_name: row.catalog,
                schema_name: row.schema,
                table_name: row.name,
            })
            .collect();

        match TableMatch::from_handles(handles) {
            TableMatch::Found(handle) => Ok(Some(handle)),
            TableMatch::NotFound => Ok(None),
            TableMatch::Ambiguous(count) => {
                debug!("[{}] {} tables matched {}", self.connector_id, count, name);
                Err(ConnectorError::AmbiguousTable(name.clone()))
            }
        }
    }

    async fn columns_on(
        &self,
        conn: &mut dyn Connection,
        handle: &JdbcTableHandle,
        schema: &str,
    ) -> Result<Vec<JdbcColumnHandle>> {
        let schema = schema.to_uppercase();
        let table = handle.table_name.to_uppercase();

        let mut found = false;
        let mut columns = Vec::new();
        let mut rows = conn.columns(&schema, &table);
        while let Some(row) = rows.try_next().await.map_err(ConnectorError::Connectivity)? {
            found = true;
            let declared = DeclaredSize {
                size: row.column_size,
                decimal_digits: row.decimal_digits,
            };
            match map_type(row.data_type, declared) {
                Some(engine_type) => columns.push(JdbcColumnHandle::new(row.name, engine_type)),
                None => debug!(
                    "[{}] Skipping column {} of {}.{}: unsupported type code {}",
                    self.connector_id, row.name, schema, table, row.data_type
                ),
            }
        }

        if !found {
            return Err(ConnectorError::TableNotFound(handle.schema_table_name.clone()));
        }
        if columns.is_empty() {
            return Err(ConnectorError::UnsupportedTable(handle.schema_table_name.clone()));
        }
        Ok(columns)
    }

    async fn table_names_on(
        &self,
        conn: &mut dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<SchemaTableName>> {
        let schema = match schema {
            Some(s) => {
                let upper = conn
                    .stores_upper_case_identifiers()
                    .await
                    .map_err(ConnectorError::Connectivity)?;
                Some(if upper { s.to_uppercase() } else { s.to_string() })
            }
            None => None,
        };

        let mut names = Vec::new();
        let mut rows = conn.tables(schema.as_deref(), None, TABLE_TYPES);
        while let Some(row) = rows.try_next().await.map_err(ConnectorError::Connectivity)? {
            match self.schema_table_name(&row) {
                Some(name) => names.push(name),
                None => warn!(
                    "[{}] Skipping table {} reported without a schema",
                    self.connector_id, row.name
                ),
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl JdbcClient for TeradataClient {
    fn connector_id(&self) -> &str {
        &self.connector_id
    }

    async fn open_connection(&self) -> Result<Box<dyn Connection>> {
        self.connect().await
    }

    async fn schema_names(&self) -> Result<BTreeSet<String>> {
        let mut conn = self.connect().await?;
        let result = self.schema_names_on(conn.as_mut()).await;
        close_quietly(conn, &self.connector_id).await;
        result
    }

    async fn table_handle(&self, name: &SchemaTableName) -> Result<Option<JdbcTableHandle>> {
        let mut conn = self.connect().await?;
        let result = self.table_handle_on(conn.as_mut(), name).await;
        close_quietly(conn, &self.connector_id).await;
        result
    }

    async fn columns(&self, handle: &JdbcTableHandle) -> Result<Vec<JdbcColumnHandle>> {
        let schema = handle
            .schema_name
            .as_deref()
            .ok_or_else(|| ConnectorError::MissingSchema(handle.table_name.clone()))?;

        let mut conn = self.connect().await?;
        let result = self.columns_on(conn.as_mut(), handle, schema).await;
        close_quietly(conn, &self.connector_id).await;
        result
    }

    async fn table_names(&self, schema: Option<&str>) -> Result<Vec<SchemaTableName>> {
        let mut conn = self.connect().await?;
        let result = self.table_names_on(conn.as_mut(), schema).await;
        close_quietly(conn, &self.connector_id).await;
        result
    }

    fn schema_table_name(&self, row: &TableRow) -> Option<SchemaTableName> {
        let schema = row.schema.as_deref()?;
        Some(SchemaTableName::new(
            schema.to_lowercase(),
            row.name.to_lowercase(),
        ))
    }

    async fn build_sql(
        &self,
        _connection: &mut dyn Connection,
        split: &JdbcSplit,
        columns: &[JdbcColumnHandle],
    ) -> Result<Statement> {
        debug!("[{}] Building SQL for split {}", self.connector_id, split);
        let sql = self.rewrite_query(&self.query_builder.build_sql(split, columns));
        debug!("[{}] Scan SQL: {}", self.connector_id, sql);
        Ok(Statement::new(sql))
    }

    async fn execute(&self, connection: &mut dyn Connection, sql: &str) -> Result<u64> {
        debug!("[{}] Received statement: {}", self.connector_id, sql);
        let sql = self.rewrite_query(sql);
        connection
            .execute(&sql)
            .await
            .map_err(ConnectorError::Execution)
    }
}
