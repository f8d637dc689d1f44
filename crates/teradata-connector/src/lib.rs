//! Teradata connector for DataFusion
//!
//! Maps the Teradata catalog (databases, tables, views, columns) into
//! DataFusion's catalog model and pushes scans down as SQL:
//! - [`TeradataClient`]: the metadata adapter and query dispatcher
//! - [`JdbcCatalog`] / [`JdbcTable`]: DataFusion providers over any [`JdbcClient`]
//! - [`QueryServiceDriver`]: the Teradata Query Service REST driver

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod filter;
pub mod handle;
pub mod jdbc;
pub mod rest;
pub mod rewrite;
pub mod scan;
pub mod teradata;
pub mod types;

use std::sync::Arc;

pub use client::{ColumnRow, Connection, Driver, RowStream, TableRow, TableType};
pub use config::ConnectionConfig;
pub use connector::{register_catalog, JdbcCatalog, JdbcSchema};
pub use error::{ClientError, ConfigError, ConnectorError, Result};
pub use filter::{build_where_clause, FilterCondition, FilterOp, FilterValue};
pub use handle::{JdbcColumnHandle, JdbcSplit, JdbcTableHandle, SchemaTableName};
pub use jdbc::{close_quietly, execute_statement, JdbcClient, QueryBuilder, Statement, TableMatch};
pub use rest::QueryServiceDriver;
pub use rewrite::{IdentityRewriter, QueryRewriter, TopNRewriter};
pub use scan::{JdbcScanExec, JdbcTable};
pub use teradata::TeradataClient;
pub use types::{map_type, DeclaredSize, EngineType};

/// Build a [`TeradataClient`] talking to the Query Service named in `config`.
pub fn create_client(
    connector_id: impl Into<String>,
    config: ConnectionConfig,
) -> std::result::Result<TeradataClient, ConfigError> {
    TeradataClient::new(connector_id, config, Arc::new(QueryServiceDriver::new()))
}
