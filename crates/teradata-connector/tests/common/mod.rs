//! In-memory scripted driver for integration tests.
//!
//! Serves a fixed catalog, records every catalog request and statement, and
//! counts opened and closed connections so tests can check release on every
//! exit path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arrow::array::{RecordBatch, RecordBatchOptions};
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use teradata_connector::types::jdbc;
use teradata_connector::{
    ClientError, ColumnRow, Connection, ConnectionConfig, Driver, RowStream, TableRow, TableType,
    TeradataClient,
};

/// What the fake saw, shared between the driver and every connection.
#[derive(Debug, Default)]
pub struct Recorder {
    opened: AtomicUsize,
    closed: AtomicUsize,
    table_requests: Mutex<Vec<(Option<String>, Option<String>, Vec<TableType>)>>,
    column_requests: Mutex<Vec<(String, String)>>,
    queries: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn table_requests(&self) -> Vec<(Option<String>, Option<String>, Vec<TableType>)> {
        self.table_requests.lock().unwrap().clone()
    }

    pub fn column_requests(&self) -> Vec<(String, String)> {
        self.column_requests.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

/// Scripted catalog contents and fault injection switches.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub upper_case: bool,
    pub schemas: Vec<String>,
    pub tables: Vec<TableRow>,
    pub columns: HashMap<(String, String), Vec<ColumnRow>>,
    /// Rows served for scans, keyed by upper-case table name.
    pub data: HashMap<String, RecordBatch>,
    pub fail_connect: bool,
    /// Catalog streams yield this many rows, then an error.
    pub fail_after: Option<usize>,
    pub fail_execute: bool,
    pub fail_close: bool,
}

impl Script {
    pub fn upper_case() -> Self {
        Self {
            upper_case: true,
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schemas.push(schema.to_string());
        self
    }

    pub fn with_table(mut self, schema: &str, table: &str, table_type: TableType) -> Self {
        self.tables.push(TableRow {
            catalog: None,
            schema: Some(schema.to_string()),
            name: table.to_string(),
            table_type,
        });
        self
    }

    pub fn with_columns(mut self, schema: &str, table: &str, columns: Vec<ColumnRow>) -> Self {
        self.columns
            .insert((schema.to_string(), table.to_string()), columns);
        self
    }

    pub fn with_data(mut self, table: &str, batch: RecordBatch) -> Self {
        self.data.insert(table.to_uppercase(), batch);
        self
    }
}

pub fn column(name: &str, data_type: i32, size: i32) -> ColumnRow {
    ColumnRow {
        name: name.to_string(),
        data_type,
        column_size: size,
        decimal_digits: None,
    }
}

pub fn varchar(name: &str, size: i32) -> ColumnRow {
    column(name, jdbc::VARCHAR, size)
}

#[derive(Debug, Clone)]
pub struct FakeDriver {
    script: Arc<Script>,
    recorder: Arc<Recorder>,
}

impl FakeDriver {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.recorder)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>, ClientError> {
        if self.script.fail_connect {
            return Err(ClientError::Driver("connection refused".to_string()));
        }
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            script: Arc::clone(&self.script),
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct FakeConnection {
    script: Arc<Script>,
    recorder: Arc<Recorder>,
}

impl FakeConnection {
    fn scripted<'a, T: Send + 'a>(&self, rows: Vec<T>) -> RowStream<'a, T> {
        match self.script.fail_after {
            Some(n) => stream::iter(
                rows.into_iter()
                    .take(n)
                    .map(Ok)
                    .chain(std::iter::once(Err(ClientError::Driver(
                        "catalog stream interrupted".to_string(),
                    )))),
            )
            .boxed(),
            None => stream::iter(rows.into_iter().map(Ok)).boxed(),
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn stores_upper_case_identifiers(&mut self) -> Result<bool, ClientError> {
        Ok(self.script.upper_case)
    }

    fn schemas(&mut self) -> RowStream<'_, String> {
        self.scripted(self.script.schemas.clone())
    }

    fn tables<'a>(
        &'a mut self,
        schema: Option<&'a str>,
        table: Option<&'a str>,
        types: &'a [TableType],
    ) -> RowStream<'a, TableRow> {
        self.recorder.table_requests.lock().unwrap().push((
            schema.map(str::to_string),
            table.map(str::to_string),
            types.to_vec(),
        ));
        let rows = self
            .script
            .tables
            .iter()
            .filter(|row| schema.is_none() || row.schema.as_deref() == schema)
            .filter(|row| table.map_or(true, |t| t == row.name))
            .filter(|row| types.contains(&row.table_type))
            .cloned()
            .collect();
        self.scripted(rows)
    }

    fn columns<'a>(&'a mut self, schema: &'a str, table: &'a str) -> RowStream<'a, ColumnRow> {
        self.recorder
            .column_requests
            .lock()
            .unwrap()
            .push((schema.to_string(), table.to_string()));
        let rows = self
            .script
            .columns
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default();
        self.scripted(rows)
    }

    async fn query(&mut self, sql: &str, schema: SchemaRef) -> Result<Vec<RecordBatch>, ClientError> {
        self.recorder.queries.lock().unwrap().push(sql.to_string());

        let table = self
            .script
            .data
            .iter()
            .find(|(name, _)| sql.contains(&format!(".{}", name)))
            .map(|(_, batch)| batch.clone())
            .ok_or_else(|| ClientError::Driver(format!("no data scripted for: {}", sql)))?;

        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                table
                    .schema()
                    .fields()
                    .iter()
                    .position(|f| f.name().eq_ignore_ascii_case(field.name()))
                    .map(|i| Arc::clone(table.column(i)))
                    .ok_or_else(|| ClientError::Driver(format!("unknown column {}", field.name())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
        Ok(vec![RecordBatch::try_new_with_options(schema, columns, &options)?])
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, ClientError> {
        self.recorder.executed.lock().unwrap().push(sql.to_string());
        if self.script.fail_execute {
            return Err(ClientError::Status {
                status: 400,
                message: "syntax error".to_string(),
            });
        }
        Ok(1)
    }

    async fn close(self: Box<Self>) -> Result<(), ClientError> {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close {
            return Err(ClientError::Driver("close failed".to_string()));
        }
        Ok(())
    }
}

/// Build a client over `driver` with the given dialect options.
pub fn client_with(driver: &FakeDriver, options: &[(&str, &str)]) -> TeradataClient {
    let options = options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = ConnectionConfig::new("https://td.example.com:1443/systems/prod", "dbc", "dbc", options);
    TeradataClient::new("teradata", config, Arc::new(driver.clone())).unwrap()
}

pub fn client(driver: &FakeDriver) -> TeradataClient {
    client_with(driver, &[])
}
