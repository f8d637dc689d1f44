//! Typed errors for the connector crate.

use datafusion::error::DataFusionError;
use thiserror::Error;

use crate::handle::SchemaTableName;

/// Faults raised by a database client driver.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure talking to the database endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The endpoint answered with something the driver cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Building Arrow arrays from a result set failed.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Any other driver-specific fault.
    #[error("driver error: {0}")]
    Driver(String),
}

/// Invalid or missing catalog configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required property: {0}")]
    MissingProperty(String),

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read properties file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the metadata adapter and query dispatcher.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A connection could not be opened, or a catalog query on it failed.
    #[error("connection failed: {0}")]
    Connectivity(#[source] ClientError),

    /// The catalog returned more than one object for a single qualified name.
    #[error("multiple tables matched: {0}")]
    AmbiguousTable(SchemaTableName),

    /// A table handle reached column lookup without a schema name.
    #[error("no schema name for table: {0}")]
    MissingSchema(String),

    /// The catalog reported no columns at all for the table.
    #[error("table not found: {0}")]
    TableNotFound(SchemaTableName),

    /// Every column of the table has a native type with no engine mapping.
    #[error("table has no supported column types: {0}")]
    UnsupportedTable(SchemaTableName),

    /// Executing a statement on the database failed.
    #[error("execution failed: {0}")]
    Execution(#[source] ClientError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ConnectorError> for DataFusionError {
    fn from(e: ConnectorError) -> Self {
        DataFusionError::External(Box::new(e))
    }
}

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;
